//! Analyze Command
//!
//! Bit-level comparison of an original file with a corrupted and/or repaired version.

use crate::symbols;
use anyhow::{Context, Result};
use bitmend_core::pipeline::{analyze_files, AnalysisReport};
use bitmend_core::recovery::Truncation;
use console::style;
use std::path::PathBuf;

/// Analyze configuration
pub struct AnalyzeConfig {
    pub original: PathBuf,
    /// Corrupted file when `repaired` is given
    pub test: PathBuf,
    pub repaired: Option<PathBuf>,
    pub json: bool,
}

/// Run analyze command
pub fn run(config: AnalyzeConfig) -> Result<()> {
    let report = analyze_files(&config.original, &config.test, config.repaired.as_deref())
        .context("Failed to analyze files")?;

    if config.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{}", json);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.6}%", v),
        None => "n/a".to_string(),
    }
}

fn print_truncation(truncation: Option<&Truncation>) {
    if let Some(t) = truncation {
        eprintln!(
            "{} Input lengths differ {:?}; compared the first {} bytes",
            style(symbols::WARN).yellow(),
            t.input_lengths,
            t.compared_len
        );
    }
}

fn print_report(report: &AnalysisReport) {
    let diff = &report.diff;
    println!();
    println!("{}", style("Bit Comparison").bold().underlined());
    println!("  original: {}", report.original.display());
    println!("  test:     {}", report.test.display());
    println!("{}", symbols::HLINE);
    println!("  total bits:     {}", diff.total_bits);
    println!("  matching bits:  {}", style(diff.matching_bits).green());
    println!("  differing bits: {}", style(diff.differing_bits).red());
    println!("  match:          {}", percent(report.match_percent));
    println!("  differ:         {}", percent(report.differ_percent));
    print_truncation(diff.truncation.as_ref());

    let Some(recovery) = &report.recovery else {
        return;
    };

    println!();
    println!("{}", style("Recovery").bold().underlined());
    if let Some(repaired) = &report.repaired {
        println!("  repaired: {}", repaired.display());
    }
    println!("{}", symbols::HLINE);
    println!("  flipped by corruption: {}", recovery.flipped_by_corruption);
    println!(
        "  recovered:             {} ({})",
        style(recovery.recovered_bits).green(),
        percent(report.recovery_rate)
    );
    println!("  still wrong:           {}", recovery.unrecovered_bits());
    println!(
        "  falsely altered:       {}",
        style(recovery.falsely_altered_bits).yellow()
    );
    println!(
        "  repaired vs original:  {} of {} bits differ",
        recovery.differing_bits, recovery.total_bits
    );
    print_truncation(recovery.truncation.as_ref());
}
