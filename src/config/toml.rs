//! TOML configuration file parsing
//!
//! ```toml
//! device = "/dev/zd0"
//! threads = 8
//!
//! [runtime]
//! settle = "5s"
//!
//! [output]
//! json_output = "/var/tmp/blockstress.json"
//! ```

use super::cli::Cli;
use super::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents).context("Failed to parse TOML configuration")?;
    Ok(config)
}

/// Build the run configuration from the command line and optional file
///
/// Values given on the command line override the file.
pub fn build_config(cli: &Cli) -> Result<Config> {
    let config = match (&cli.config, &cli.device) {
        (Some(path), _) => parse_toml_file(path)?,
        (None, Some(device)) => Config::new(device),
        (None, None) => anyhow::bail!("Specify the device to test (DEVICE argument or --config)"),
    };

    Ok(merge_cli_with_config(cli, config))
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Config {
    if let Some(ref device) = cli.device {
        config.device = device.clone();
    }
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    if cli.no_sync {
        config.sync = false;
    }
    if cli.write_limit.is_some() {
        config.write_limit = cli.write_limit;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if let Some(ref interval) = cli.live_interval {
        config.runtime.live_interval = interval.clone();
    }
    if let Some(ref interval) = cli.poll_interval {
        config.runtime.poll_interval = interval.clone();
    }
    if let Some(ref settle) = cli.settle {
        config.runtime.settle = settle.clone();
    }
    if cli.json_output.is_some() {
        config.output.json_output = cli.json_output.clone();
    }
    if cli.json_pretty {
        config.output.json_pretty = true;
    }

    config
}
