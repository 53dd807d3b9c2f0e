//! CLI Commands

pub mod analyze;
pub mod corrupt;
pub mod reconstruct;
pub mod segment;

use crate::symbols;
use bitmend_core::BatchReport;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over `len` items of the given unit
pub(crate) fn progress_bar(len: u64, unit: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let template = format!(
        "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.green/white}}] {{pos}}/{{len}} {unit}"
    );
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );
    pb
}

/// Print an end-of-run summary naming every failure
pub(crate) fn print_summary(title: &str, unit: &str, report: &BatchReport) {
    println!("\n{}", style(title).bold());
    println!(
        "  {} {} processed successfully",
        style(report.processed.len()).green(),
        unit
    );
    if !report.failures.is_empty() {
        println!("  {} {} failed", style(report.failures.len()).red(), unit);
        for failure in &report.failures {
            eprintln!(
                "  {} {}: {}",
                style(symbols::CROSS).red(),
                failure.id,
                failure.error
            );
        }
    }
}

/// Fail the command when a batch had failures
pub(crate) fn ensure_success(report: &BatchReport, unit: &str) -> anyhow::Result<()> {
    if !report.is_success() {
        anyhow::bail!(
            "{} of {} {} failed",
            report.failures.len(),
            report.total(),
            unit
        );
    }
    Ok(())
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitmend_core::BitmendError;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(12), "12 bytes");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024 / 2), "1.50 MB");
    }

    #[test]
    fn test_ensure_success() {
        let mut report = BatchReport::new();
        report.succeeded("image_0001");
        assert!(ensure_success(&report, "images").is_ok());

        report.failed("image_0002", &BitmendError::MissingChunk { index: 0 });
        let err = ensure_success(&report, "images").unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 images failed");
    }
}
