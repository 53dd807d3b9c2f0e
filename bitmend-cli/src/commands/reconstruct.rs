//! Reconstruct Command
//!
//! Reassembles JPEG files from header, trailer and (optionally repaired)
//! chunks, or from an unchunked body file.

use super::{ensure_success, format_bytes, print_summary, progress_bar};
use crate::symbols;
use anyhow::{Context, Result};
use bitmend_core::dataset::{list_image_dirs, list_whole_body_dirs, ImageDir};
use bitmend_core::pipeline::{reconstruct_corpus, reconstruct_image, reconstruct_with_body};
use console::style;
use std::path::PathBuf;

/// Reconstruct configuration
pub struct ReconstructConfig {
    /// Image directory, or dataset root with `all`
    pub input: PathBuf,
    /// Output file, or output directory with `all`
    pub output: PathBuf,
    /// Body directory with repaired chunks
    pub repaired: Option<PathBuf>,
    /// Unchunked body file
    pub body: Option<PathBuf>,
    pub all: bool,
}

/// Run reconstruct command
pub fn run(config: ReconstructConfig) -> Result<()> {
    if config.all {
        if config.repaired.is_some() || config.body.is_some() {
            anyhow::bail!("--repaired and --body apply to a single image, not to --all");
        }
        return reconstruct_all(&config);
    }

    let image = ImageDir::from_path(&config.input)
        .with_context(|| format!("Not an image directory: {}", config.input.display()))?;
    let written = match &config.body {
        Some(body) => reconstruct_with_body(&image, body, &config.output),
        None => reconstruct_image(&image, config.repaired.as_deref(), &config.output),
    }
    .with_context(|| format!("Failed to reconstruct {}", image.id))?;

    println!(
        "{} Reconstructed {} ({})",
        style(symbols::CHECK).green(),
        config.output.display(),
        format_bytes(written)
    );
    Ok(())
}

fn reconstruct_all(config: &ReconstructConfig) -> Result<()> {
    let images = list_image_dirs(&config.input)
        .and_then(|mut dirs| {
            dirs.extend(list_whole_body_dirs(&config.input)?);
            Ok(dirs)
        })
        .with_context(|| format!("Failed to read dataset {}", config.input.display()))?;

    let pb = progress_bar(images.len() as u64, "images");
    let report = reconstruct_corpus(&config.input, &config.output, |_| pb.inc(1))
        .context("Reconstruction failed")?;
    pb.finish_and_clear();

    print_summary("Reconstruct Summary:", "images", &report);
    println!("  output: {}", config.output.display());
    ensure_success(&report, "images")
}
