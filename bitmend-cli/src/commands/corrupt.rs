//! Corrupt Command
//!
//! Corrupts the chunks of a segmented dataset and writes the corruption log.

use super::{ensure_success, print_summary, progress_bar};
use crate::config::FlipperMode;
use crate::symbols;
use anyhow::{Context, Result};
use bitmend_core::corruption::{CorruptionConfig, CorruptionEngine};
use bitmend_core::dataset::{list_image_dirs, BodyMeta};
use bitmend_core::flipper::{BitFlipper, ExternalFlipper, InProcessFlipper};
use bitmend_core::pipeline::{corrupt_corpus, OutputLayout};
use console::style;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub const LOG_FILE_NAME: &str = "corruption_log.json";

/// Corrupt configuration
pub struct CorruptConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub layout: OutputLayout,
    pub corruption: CorruptionConfig,
    pub mode: FlipperMode,
    pub bitflip_cmd: String,
    pub timeout: Duration,
    /// Defaults to `<output>/corruption_log.json`
    pub log_path: Option<PathBuf>,
}

fn build_flipper(config: &CorruptConfig, seed: u64) -> Box<dyn BitFlipper> {
    match config.mode {
        FlipperMode::InProcess => Box::new(InProcessFlipper::new(seed)),
        FlipperMode::External => {
            Box::new(ExternalFlipper::new(&config.bitflip_cmd, config.timeout))
        }
    }
}

/// Run corrupt command
pub fn run(config: CorruptConfig) -> Result<()> {
    let images = list_image_dirs(&config.input)
        .with_context(|| format!("Failed to read dataset {}", config.input.display()))?;
    if images.is_empty() {
        println!("{}", style("No image directories found").yellow());
        return Ok(());
    }

    // Resolve the seed up front so the flipper and the engine share it
    let seed = config.corruption.seed.unwrap_or_else(rand::random);
    let engine = CorruptionEngine::new(
        config.corruption.clone().with_seed(seed),
        build_flipper(&config, seed),
    )
    .context("Invalid corruption configuration")?;

    let total_chunks: u64 = images
        .iter()
        .filter_map(|img| BodyMeta::load(&img.body_dir()).ok())
        .map(|meta| meta.chunks.chunk_count as u64)
        .sum();

    println!(
        "{} {} chunks in {} images (seed {}, {:?} layout, one severity per {})",
        style("Corrupting").cyan(),
        total_chunks,
        images.len(),
        seed,
        config.layout,
        config.corruption.granularity
    );
    info!(seed, chunks = total_chunks, "corruption run started");

    let pb = progress_bar(total_chunks, "chunks");
    let outcome = corrupt_corpus(&engine, &config.input, &config.output, config.layout, |_| {
        pb.inc(1)
    })
    .context("Corruption failed")?;
    pb.finish_and_clear();

    // The log is written even when some chunks failed
    let log_path = config
        .log_path
        .clone()
        .unwrap_or_else(|| config.output.join(LOG_FILE_NAME));
    let saved = outcome.log.save(&log_path);

    print_summary("Corrupt Summary:", "chunks", &outcome.report);
    println!(
        "  {} of {} log entries clean",
        outcome.log.clean_count(),
        outcome.log.len()
    );
    println!("  seed: {}", seed);

    saved.with_context(|| format!("Failed to write corruption log {}", log_path.display()))?;
    println!(
        "{} Corruption log written to {}",
        style(symbols::CHECK).green(),
        log_path.display()
    );
    ensure_success(&outcome.report, "chunks")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitmend_core::pipeline::{segment_corpus, SegmentOptions};
    use std::fs;
    use tempfile::TempDir;

    fn segmented_dataset(dir: &TempDir) -> PathBuf {
        let input = dir.path().join("raw");
        fs::create_dir_all(&input).unwrap();
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x03, 0x01];
        jpeg.extend(std::iter::repeat(0x42).take(3000));
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        fs::write(input.join("a.jpg"), jpeg).unwrap();

        let dataset = dir.path().join("dataset");
        let opts = SegmentOptions {
            chunk_size: 1024,
            ..Default::default()
        };
        segment_corpus(&input, &dataset, &opts, |_| {}).unwrap();
        dataset
    }

    fn in_process(dir: &TempDir, log_path: Option<PathBuf>) -> CorruptConfig {
        CorruptConfig {
            input: segmented_dataset(dir),
            output: dir.path().join("corrupted"),
            layout: OutputLayout::Mirror,
            corruption: CorruptionConfig::default().with_seed(5),
            mode: FlipperMode::InProcess,
            bitflip_cmd: String::new(),
            timeout: Duration::from_secs(1),
            log_path,
        }
    }

    #[test]
    fn test_run_writes_default_log() {
        let dir = TempDir::new().unwrap();
        let config = in_process(&dir, None);
        let output = config.output.clone();
        run(config).unwrap();
        assert!(output.join(LOG_FILE_NAME).is_file());
        assert!(output.join("image_0001/body/meta.json").is_file());
    }

    #[test]
    fn test_log_write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        // a directory cannot be replaced by the log file
        let blocked = dir.path().join("blocked");
        fs::create_dir_all(blocked.join("inner")).unwrap();
        let config = in_process(&dir, Some(blocked));
        let output = config.output.clone();

        let err = run(config).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to write corruption log"));
        // chunk output is complete even though the log could not be saved
        assert!(output.join("image_0001/body/meta.json").is_file());
    }
}
