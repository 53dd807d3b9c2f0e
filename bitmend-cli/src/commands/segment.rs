//! Segment Command
//!
//! Splits every JPEG of a directory into header, chunked body and trailer,
//! or into an unchunked header / body / trailer triple with `whole_body`.

use super::{ensure_success, print_summary, progress_bar};
use anyhow::{Context, Result};
use bitmend_core::dataset::discover_jpegs;
use bitmend_core::pipeline::{segment_corpus, BodyLayout, ImageNaming, SegmentOptions};
use bitmend_core::SegmentPolicy;
use console::style;
use std::path::PathBuf;

/// Segment configuration
pub struct SegmentConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub chunk_size: u32,
    pub policy: SegmentPolicy,
    pub keep_names: bool,
    pub whole_body: bool,
}

/// Run segment command
pub fn run(config: SegmentConfig) -> Result<()> {
    if !config.input.is_dir() {
        anyhow::bail!("Input is not a directory: {}", config.input.display());
    }

    let files = discover_jpegs(&config.input)
        .with_context(|| format!("Failed to list {}", config.input.display()))?;
    if files.is_empty() {
        println!("{}", style("No JPEG files found").yellow());
        return Ok(());
    }

    if config.whole_body {
        println!(
            "{} {} images (whole body, policy {})",
            style("Segmenting").cyan(),
            files.len(),
            config.policy
        );
    } else {
        println!(
            "{} {} images (chunk size {}, policy {})",
            style("Segmenting").cyan(),
            files.len(),
            config.chunk_size,
            config.policy
        );
    }

    let opts = SegmentOptions {
        chunk_size: config.chunk_size,
        policy: config.policy,
        naming: if config.keep_names {
            ImageNaming::Stem
        } else {
            ImageNaming::Sequential
        },
        layout: if config.whole_body {
            BodyLayout::WholeBody
        } else {
            BodyLayout::Chunked
        },
    };

    let pb = progress_bar(files.len() as u64, "images");
    let report = segment_corpus(&config.input, &config.output, &opts, |_| pb.inc(1))
        .context("Segmentation failed")?;
    pb.finish_and_clear();

    print_summary("Segment Summary:", "images", &report);
    println!("  output: {}", config.output.display());
    ensure_success(&report, "images")
}
