//! Command-line interface for the retention pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::OrderingPolicy;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "retention-pipeline")]
#[command(about = "Accept, drop and truncate smoothed capacity-retention curves", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every cell in a retention table and write accepted/dropped tables
    Evaluate {
        /// Input CSV with entity id, cycle, raw and smoothed retention columns
        input: PathBuf,
        /// Output directory for the accepted and dropped tables
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        /// Minimum acceptable retention fraction
        #[arg(long)]
        floor: Option<f64>,
        /// Maximum plausible retention fraction
        #[arg(long)]
        ceiling: Option<f64>,
        /// Treat cells whose rows are out of cycle order as errors instead of sorting them
        #[arg(long)]
        strict: bool,
    },

    /// Write the default configuration to a YAML file
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 38 {
            let head: String = value.chars().take(35).collect();
            format!("{}...", head)
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<38} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let result = match cli.command {
        Commands::Evaluate {
            input,
            output_dir,
            floor,
            ceiling,
            strict,
        } => load_config(cli.config.as_deref()).and_then(|mut config| {
            apply_overrides(&mut config, floor, ceiling, strict);
            cmd_evaluate(&input, &output_dir, &config)
        }),
        Commands::InitConfig { path } => cmd_init_config(&path),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Load the config file if given. A config that cannot be read aborts the
/// run, since it may carry the thresholds.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let config = PipelineConfig::from_yaml(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            info!("Loaded config from: {}", path.display());
            Ok(config)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn apply_overrides(config: &mut PipelineConfig, floor: Option<f64>, ceiling: Option<f64>, strict: bool) {
    if let Some(floor) = floor {
        config.acceptance.floor_threshold = floor;
    }
    if let Some(ceiling) = ceiling {
        config.acceptance.ceiling_threshold = ceiling;
    }
    if strict {
        config.acceptance.ordering = OrderingPolicy::Strict;
    }
}

fn cmd_evaluate(input: &Path, output_dir: &Path, config: &PipelineConfig) -> Result<()> {
    use crate::core::{loaders, writers};
    use crate::processors::{batch, SeriesAcceptanceFilter};

    let start = Instant::now();

    // Nothing is read or written until the configuration is known to be valid.
    config.validate().context("Invalid configuration")?;
    let thresholds = config.acceptance.thresholds()?;
    let filter = SeriesAcceptanceFilter::new(thresholds);

    println!("Evaluating retention curves...");
    println!("Input: {}", input.display());
    println!("Output directory: {}", output_dir.display());
    println!("Floor threshold: {}", thresholds.floor());
    println!("Ceiling threshold: {}", thresholds.ceiling());
    println!(
        "Smoothing: span {}, {} iterations",
        config.smoothing.span, config.smoothing.iterations
    );

    let spinner = create_spinner("Loading retention table...");

    let records = match loaders::load_retention_csv(input, &config.columns) {
        Ok(records) => records,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e).with_context(|| format!("Failed to load {}", input.display()));
        }
    };
    info!("Loaded {} rows from {}", records.len(), input.display());

    spinner.set_message("Evaluating cells...");
    let groups = batch::group_records(records);
    info!("Grouped rows into {} cells", groups.len());

    let report = batch::run_batch(groups, &filter, config.acceptance.ordering);

    spinner.set_message("Writing output tables...");
    let accepted_path = output_dir.join(&config.output.accepted_file);
    let dropped_path = output_dir.join(&config.output.dropped_file);

    let written = writers::write_tables(
        &accepted_path,
        report.accepted_series(),
        &dropped_path,
        report.dropped_series(),
        &config.columns,
    );

    spinner.finish_and_clear();
    let (accepted_rows, dropped_rows) = written.context("Failed to write output tables")?;

    let summary = report.summary;
    let with_percent = |count: usize| format!("{} ({}%)", count, summary.percent(count));

    print_summary(
        "Evaluation Complete",
        &[
            ("Input file", input.display().to_string()),
            ("Total cases", summary.total.to_string()),
            ("Dropped cases", with_percent(summary.dropped)),
            ("Accepted cases", with_percent(summary.accepted)),
            ("Errored cases", with_percent(summary.errored)),
            ("Accepted rows", accepted_rows.to_string()),
            ("Dropped rows", dropped_rows.to_string()),
            ("Accepted table", accepted_path.display().to_string()),
            ("Dropped table", dropped_path.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_init_config(path: &Path) -> Result<()> {
    PipelineConfig::default()
        .to_yaml(path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const INPUT: &str = "battery_file_id,Cyc_,DischargeCapacityRetention,Smoothed\n\
                         1,1,0.90,0.90\n\
                         1,2,0.85,0.85\n\
                         1,3,0.60,0.60\n\
                         2,1,0.50,0.50\n\
                         2,2,0.90,0.90\n";

    #[test]
    fn test_cli_parses_evaluate() {
        let cli = Cli::try_parse_from([
            "retention-pipeline",
            "-vv",
            "evaluate",
            "data.csv",
            "--floor",
            "0.8",
            "--strict",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Evaluate {
                input,
                output_dir,
                floor,
                ceiling,
                strict,
            } => {
                assert_eq!(input, PathBuf::from("data.csv"));
                assert_eq!(output_dir, PathBuf::from("."));
                assert_eq!(floor, Some(0.8));
                assert_eq!(ceiling, None);
                assert!(strict);
            }
            _ => panic!("Expected Evaluate command"),
        }
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = PipelineConfig::default();
        apply_overrides(&mut config, Some(0.8), None, true);

        assert_eq!(config.acceptance.floor_threshold, 0.8);
        assert_eq!(config.acceptance.ceiling_threshold, 1.05);
        assert_eq!(config.acceptance.ordering, OrderingPolicy::Strict);
    }

    #[test]
    fn test_cmd_evaluate_writes_tables() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.csv");
        fs::write(&input, INPUT).unwrap();
        let output_dir = dir.path().join("out");

        cmd_evaluate(&input, &output_dir, &PipelineConfig::default()).unwrap();

        let accepted = fs::read_to_string(output_dir.join("denoise_accepted.csv")).unwrap();
        assert_eq!(accepted.lines().count(), 3);
        let dropped = fs::read_to_string(output_dir.join("denoise_dropped.csv")).unwrap();
        assert_eq!(dropped.lines().count(), 3);
    }

    #[test]
    fn test_cmd_evaluate_failed_write_leaves_no_partial_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.csv");
        fs::write(&input, INPUT).unwrap();
        let output_dir = dir.path().join("out");
        fs::create_dir(&output_dir).unwrap();
        fs::write(output_dir.join("blocker"), "").unwrap();

        let mut config = PipelineConfig::default();
        config.output.dropped_file = "blocker/dropped.csv".to_string();

        assert!(cmd_evaluate(&input, &output_dir, &config).is_err());
        let remaining: Vec<_> = fs::read_dir(&output_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(remaining, vec![std::ffi::OsString::from("blocker")]);
    }

    #[test]
    fn test_invalid_config_aborts_before_io() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.csv");
        fs::write(&input, INPUT).unwrap();
        let output_dir = dir.path().join("out");

        let mut config = PipelineConfig::default();
        apply_overrides(&mut config, Some(1.2), Some(1.05), false);

        assert!(cmd_evaluate(&input, &output_dir, &config).is_err());
        assert!(!output_dir.exists());
    }

    #[test]
    fn test_load_config_missing_file_is_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        assert!(load_config(Some(missing.as_path())).is_err());
        assert!(load_config(None).is_ok());
    }

    #[test]
    fn test_cmd_init_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");

        cmd_init_config(&path).unwrap();

        let config = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(config.acceptance.floor_threshold, 0.7);
    }
}
