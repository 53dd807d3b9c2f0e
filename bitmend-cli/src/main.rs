//! Bitmend CLI
//!
//! Builds bit-level corruption and repair datasets from JPEG images.
//!
//! # Commands
//! - `segment` - Split JPEGs into header, (chunked) body and trailer
//! - `corrupt` - Flip bits in the chunks of a segmented dataset
//! - `reconstruct` - Reassemble JPEGs from (repaired) chunks or body files
//! - `analyze` - Bit-level comparison of original, corrupted and repaired files
//! - `config` - Show or initialize configuration
//!
//! # Configuration
//! Config file: ~/.bitmend/config.toml (or `--config <path>`)

use anyhow::{Context, Result};
use bitmend_core::pipeline::OutputLayout;
use bitmend_core::{Granularity, SegmentPolicy};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod commands;
mod config;
mod symbols;

use commands::{analyze, corrupt, reconstruct, segment};
use config::FlipperMode;

#[derive(Parser)]
#[command(name = "bitmend")]
#[command(about = "JPEG bit-corruption dataset tool")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (defaults to ~/.bitmend/config.toml)
    #[arg(long, global = true, env = "BITMEND_CONFIG")]
    config: Option<PathBuf>,

    /// Worker threads (defaults to the number of cores)
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment every JPEG in a directory into a chunked dataset
    Segment {
        /// Directory containing .jpg / .jpeg files
        input: PathBuf,

        /// Dataset output directory
        output: PathBuf,

        /// Chunk size in bytes (overrides config)
        #[arg(short, long)]
        chunk_size: Option<u32>,

        /// Segmentation policy: simple or scan-header (overrides config)
        #[arg(short, long)]
        policy: Option<SegmentPolicy>,

        /// Name image directories after the input file stem
        #[arg(long)]
        keep_names: bool,

        /// Write an unchunked header.bin / body.bin / trailer.bin split
        /// (implies the scan-header policy)
        #[arg(long, conflicts_with_all = ["policy", "chunk_size"])]
        whole_body: bool,
    },

    /// Corrupt the chunks of a segmented dataset
    Corrupt {
        /// Segmented dataset root
        input: PathBuf,

        /// Output directory
        output: PathBuf,

        /// Output layout: mirror or pairs
        #[arg(short, long, default_value = "mirror")]
        layout: OutputLayout,

        /// Severity levels in percent, comma separated (overrides config)
        #[arg(long, value_delimiter = ',')]
        levels: Option<Vec<f64>>,

        /// Relative weights, one per level (overrides config)
        #[arg(long, value_delimiter = ',')]
        weights: Option<Vec<f64>>,

        /// Share of chunks (or images) left clean, 0..=1 (overrides config)
        #[arg(long)]
        clean_ratio: Option<f64>,

        /// One severity per chunk or per image (overrides config)
        #[arg(short, long)]
        granularity: Option<Granularity>,

        /// Run seed for a reproducible dataset
        #[arg(long)]
        seed: Option<u64>,

        /// Bit-flip collaborator (overrides config)
        #[arg(long, value_enum)]
        flipper: Option<FlipperMode>,

        /// External bit-flip program (overrides config)
        #[arg(long)]
        bitflip_cmd: Option<String>,

        /// Per-chunk timeout for the external program, in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Corruption log path (defaults to <output>/corruption_log.json)
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Reassemble a JPEG from its image directory
    Reconstruct {
        /// Image directory (dataset root with --all)
        input: PathBuf,

        /// Output file (output directory with --all)
        #[arg(short, long)]
        output: PathBuf,

        /// Body directory holding repaired chunks
        #[arg(short, long)]
        repaired: Option<PathBuf>,

        /// Unchunked (repaired) body file to place between header and trailer
        #[arg(short, long, conflicts_with = "repaired")]
        body: Option<PathBuf>,

        /// Reconstruct every image of the dataset
        #[arg(long, conflicts_with_all = ["repaired", "body"])]
        all: bool,
    },

    /// Compare an original file against a corrupted or repaired version
    Analyze {
        /// Original file
        original: PathBuf,

        /// File to compare (the corrupted file when --repaired is given)
        test: PathBuf,

        /// Repaired file for the recovery report
        #[arg(short, long)]
        repaired: Option<PathBuf>,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    if let Some(jobs) = cli.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    // CLI args override the config file
    let load_config = || config::load_config(cli.config.as_deref());

    match cli.command {
        Commands::Segment {
            input,
            output,
            chunk_size,
            policy,
            keep_names,
            whole_body,
        } => {
            let cfg = load_config()?;
            let policy = if whole_body {
                SegmentPolicy::ScanHeader
            } else {
                policy.unwrap_or(cfg.chunking.policy)
            };
            let config = segment::SegmentConfig {
                input,
                output,
                chunk_size: chunk_size.unwrap_or(cfg.chunking.size),
                policy,
                keep_names,
                whole_body,
            };
            segment::run(config)?;
        }

        Commands::Corrupt {
            input,
            output,
            layout,
            levels,
            weights,
            clean_ratio,
            granularity,
            seed,
            flipper,
            bitflip_cmd,
            timeout_secs,
            log,
        } => {
            let cfg = load_config()?;
            let mut settings = cfg.corruption;
            if let Some(levels) = levels {
                settings.levels = levels;
            }
            if let Some(weights) = weights {
                settings.weights = weights;
            }
            if let Some(ratio) = clean_ratio {
                settings.clean_ratio = ratio;
            }
            if let Some(granularity) = granularity {
                settings.granularity = granularity;
            }
            if seed.is_some() {
                settings.seed = seed;
            }

            let config = corrupt::CorruptConfig {
                input,
                output,
                layout,
                corruption: settings.to_core()?,
                mode: flipper.unwrap_or(cfg.flipper.mode),
                bitflip_cmd: bitflip_cmd.unwrap_or(cfg.flipper.command),
                timeout: Duration::from_secs(timeout_secs.unwrap_or(cfg.flipper.timeout_secs)),
                log_path: log,
            };
            corrupt::run(config)?;
        }

        Commands::Reconstruct {
            input,
            output,
            repaired,
            body,
            all,
        } => {
            let config = reconstruct::ReconstructConfig {
                input,
                output,
                repaired,
                body,
                all,
            };
            reconstruct::run(config)?;
        }

        Commands::Analyze {
            original,
            test,
            repaired,
            json,
        } => {
            let config = analyze::AnalyzeConfig {
                original,
                test,
                repaired,
                json,
            };
            analyze::run(config)?;
        }

        Commands::Config { command } => {
            handle_config_command(command, cli.config.clone())?;
        }
    }

    Ok(())
}

/// Handle config subcommands
fn handle_config_command(command: Option<ConfigCommands>, explicit: Option<PathBuf>) -> Result<()> {
    use console::style;

    let path = match explicit {
        Some(path) => path,
        None => config::config_file_path()?,
    };

    match command {
        None | Some(ConfigCommands::Show) => {
            let cfg = if path.exists() {
                config::read_config(&path)?
            } else {
                config::BitmendConfig::default()
            };
            println!();
            println!("{}", style("Bitmend Configuration").bold().underlined());
            println!();
            println!("{}", style("[chunking]").cyan());
            println!("  size = {}", cfg.chunking.size);
            println!("  policy = \"{}\"", cfg.chunking.policy);
            println!();
            println!("{}", style("[corruption]").cyan());
            println!("  levels = {:?}", cfg.corruption.levels);
            println!("  weights = {:?}", cfg.corruption.weights);
            println!("  clean_ratio = {}", cfg.corruption.clean_ratio);
            println!("  granularity = \"{}\"", cfg.corruption.granularity);
            if let Some(seed) = cfg.corruption.seed {
                println!("  seed = {}", seed);
            }
            println!();
            println!("{}", style("[flipper]").cyan());
            println!(
                "  mode = \"{}\"",
                match cfg.flipper.mode {
                    FlipperMode::External => "external",
                    FlipperMode::InProcess => "in-process",
                }
            );
            println!("  command = \"{}\"", cfg.flipper.command);
            println!("  timeout_secs = {}", cfg.flipper.timeout_secs);
            println!();

            println!("{} {}", style("Config file:").dim(), path.display());
            if !path.exists() {
                println!(
                    "{} Run '{}' to create it",
                    style("(not created yet)").yellow(),
                    style("bitmend config init").green()
                );
            }
        }

        Some(ConfigCommands::Path) => {
            println!("{}", path.display());
        }

        Some(ConfigCommands::Init { force }) => {
            if path.exists() && !force {
                println!(
                    "{} Config file already exists at {}",
                    style(symbols::WARN).yellow(),
                    path.display()
                );
                println!("Use --force to overwrite");
                return Ok(());
            }

            config::save_config(&path, &config::BitmendConfig::default())?;
            println!(
                "{} Config file created at {}",
                style(symbols::CHECK).green(),
                path.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_corrupt_overrides() {
        let cli = Cli::try_parse_from([
            "bitmend",
            "-vv",
            "corrupt",
            "data",
            "out",
            "--layout",
            "pairs",
            "--levels",
            "0.1,0.5",
            "--weights",
            "1,3",
            "--seed",
            "7",
            "--flipper",
            "in-process",
            "--granularity",
            "image",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Corrupt {
                layout,
                levels,
                weights,
                seed,
                flipper,
                granularity,
                ..
            } => {
                assert_eq!(layout, OutputLayout::Pairs);
                assert_eq!(levels, Some(vec![0.1, 0.5]));
                assert_eq!(weights, Some(vec![1.0, 3.0]));
                assert_eq!(seed, Some(7));
                assert_eq!(flipper, Some(FlipperMode::InProcess));
                assert_eq!(granularity, Some(Granularity::Image));
            }
            _ => panic!("expected corrupt"),
        }
    }

    #[test]
    fn test_parse_segment_policy() {
        let cli = Cli::try_parse_from(["bitmend", "segment", "in", "out", "-p", "scan-header"])
            .unwrap();
        match cli.command {
            Commands::Segment { policy, .. } => assert_eq!(policy, Some(SegmentPolicy::ScanHeader)),
            _ => panic!("expected segment"),
        }
        assert!(Cli::try_parse_from(["bitmend", "segment", "in", "out", "-p", "nope"]).is_err());
    }

    #[test]
    fn test_parse_whole_body_and_body_file() {
        let cli = Cli::try_parse_from(["bitmend", "segment", "in", "out", "--whole-body"]).unwrap();
        match cli.command {
            Commands::Segment { whole_body, .. } => assert!(whole_body),
            _ => panic!("expected segment"),
        }
        assert!(Cli::try_parse_from([
            "bitmend", "segment", "in", "out", "--whole-body", "-p", "simple"
        ])
        .is_err());

        let cli = Cli::try_parse_from([
            "bitmend", "reconstruct", "split/cat", "-o", "cat.jpg", "--body", "fixed.bin",
        ])
        .unwrap();
        match cli.command {
            Commands::Reconstruct { body, .. } => assert_eq!(body, Some(PathBuf::from("fixed.bin"))),
            _ => panic!("expected reconstruct"),
        }
        assert!(Cli::try_parse_from([
            "bitmend", "reconstruct", "d", "-o", "o", "--body", "b", "--repaired", "r"
        ])
        .is_err());
    }
}
