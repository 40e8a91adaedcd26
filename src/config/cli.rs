//! CLI argument parsing using clap

use clap::Parser;
use std::path::PathBuf;

/// blockstress - overwrite a block device from many writers, then verify it
///
/// Every block written is remembered. When the device stops accepting writes
/// (pulled, failed over, power cut), blockstress waits for it to come back and
/// reads every remembered block to check that it survived.
#[derive(Parser, Debug, Default)]
#[command(name = "blockstress")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Device to test (its contents are destroyed)
    #[arg(value_name = "DEVICE", env = "BLOCKSTRESS_DEVICE")]
    pub device: Option<PathBuf>,

    /// TOML configuration file (command-line options take precedence)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of parallel writer threads [default: 4]
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Open writer handles without O_SYNC
    #[arg(long)]
    pub no_sync: bool,

    /// Stop each writer after this many writes instead of waiting for the device to fail
    #[arg(long, value_name = "N")]
    pub write_limit: Option<u64>,

    /// Seed for reproducible address and payload sequences
    #[arg(long)]
    pub seed: Option<u64>,

    /// Progress line interval, 0 disables it (e.g. 500ms, 2s) [default: 500ms]
    #[arg(long, value_name = "INTERVAL")]
    pub live_interval: Option<String>,

    /// Interval between probes while waiting for the device to return [default: 100ms]
    #[arg(long, value_name = "INTERVAL")]
    pub poll_interval: Option<String>,

    /// Pause after the write phase before probing for the device [default: 1s]
    #[arg(long, value_name = "INTERVAL")]
    pub settle: Option<String>,

    /// Write a JSON run report to this file
    #[arg(long, value_name = "FILE")]
    pub json_output: Option<PathBuf>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pub json_pretty: bool,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(long)]
    pub debug: bool,

    /// Validate and print the configuration without touching the device
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Parse arguments from the command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
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
    fn test_parse_basic() {
        let cli = Cli::try_parse_from(["blockstress", "/dev/sdb", "-t", "16", "--no-sync"]).unwrap();
        assert_eq!(cli.device, Some(PathBuf::from("/dev/sdb")));
        assert_eq!(cli.threads, Some(16));
        assert!(cli.no_sync);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_parse_intervals() {
        let cli = Cli::try_parse_from([
            "blockstress",
            "/dev/sdb",
            "--live-interval",
            "0",
            "--settle",
            "5s",
            "--json-output",
            "/tmp/report.json",
        ])
        .unwrap();
        assert_eq!(cli.live_interval.as_deref(), Some("0"));
        assert_eq!(cli.settle.as_deref(), Some("5s"));
        assert_eq!(cli.json_output, Some(PathBuf::from("/tmp/report.json")));
    }

    #[test]
    fn test_rejects_non_numeric_threads() {
        assert!(Cli::try_parse_from(["blockstress", "/dev/sdb", "-t", "many"]).is_err());
    }
}
