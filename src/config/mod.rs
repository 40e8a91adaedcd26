//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! Block size and pool size are fixed constants (see `pool`) and are not
//! configurable.

pub mod cli;
pub mod toml;
pub mod validator;

use crate::engine::{EngineConfig, DEFAULT_THREADS};
use crate::util::time::parse_duration;
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Device (or file) to destroy and verify
    pub device: PathBuf,
    /// Number of writer threads
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Open writer handles with O_SYNC
    #[serde(default = "default_sync")]
    pub sync: bool,
    /// Maximum writes per writer
    #[serde(default)]
    pub write_limit: Option<u64>,
    /// Seed for reproducible address and payload sequences
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_threads() -> usize {
    DEFAULT_THREADS
}

fn default_sync() -> bool {
    true
}

/// Timing of the run, as human-friendly intervals ("500ms", "1s")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Progress line interval during the write phase ("0" disables it)
    #[serde(default = "default_live_interval")]
    pub live_interval: String,
    /// Interval between presence probes while waiting for the device
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    /// Pause after the write phase before probing for the device
    #[serde(default = "default_settle")]
    pub settle: String,
}

fn default_live_interval() -> String {
    "500ms".to_string()
}

fn default_poll_interval() -> String {
    "100ms".to_string()
}

fn default_settle() -> String {
    "1s".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            live_interval: default_live_interval(),
            poll_interval: default_poll_interval(),
            settle: default_settle(),
        }
    }
}

/// Where results go besides the console
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write a JSON run report here
    #[serde(default)]
    pub json_output: Option<PathBuf>,
    /// Pretty-print the JSON report
    #[serde(default)]
    pub json_pretty: bool,
}

impl Config {
    /// Defaults for everything but the device
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            threads: DEFAULT_THREADS,
            sync: true,
            write_limit: None,
            seed: None,
            runtime: RuntimeConfig::default(),
            output: OutputConfig::default(),
        }
    }

    /// Engine settings derived from this configuration
    pub fn engine_config(&self) -> Result<EngineConfig> {
        Ok(EngineConfig {
            threads: self.threads,
            write_limit: self.write_limit,
            settle: parse_duration(&self.runtime.settle).context("Invalid settle delay")?,
            poll_interval: parse_duration(&self.runtime.poll_interval)
                .context("Invalid poll interval")?,
            seed: self.seed,
        })
    }

    /// Progress line interval, `None` when disabled
    pub fn live_interval(&self) -> Result<Option<Duration>> {
        let interval =
            parse_duration(&self.runtime.live_interval).context("Invalid live interval")?;
        Ok((!interval.is_zero()).then_some(interval))
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device:        {}", self.device.display())?;
        writeln!(f, "Threads:       {}", self.threads)?;
        writeln!(f, "O_SYNC:        {}", if self.sync { "yes" } else { "no" })?;
        match self.write_limit {
            Some(limit) => writeln!(f, "Write limit:   {} per writer", limit)?,
            None => writeln!(f, "Write limit:   until device fails")?,
        }
        if let Some(seed) = self.seed {
            writeln!(f, "Seed:          {}", seed)?;
        }
        writeln!(f, "Live interval: {}", self.runtime.live_interval)?;
        writeln!(f, "Poll interval: {}", self.runtime.poll_interval)?;
        write!(f, "Settle delay:  {}", self.runtime.settle)?;
        if let Some(ref path) = self.output.json_output {
            write!(f, "\nJSON output:   {}", path.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new("/dev/sdx");
        let engine = config.engine_config().unwrap();

        assert_eq!(engine.threads, 4);
        assert_eq!(engine.settle, Duration::from_secs(1));
        assert_eq!(engine.poll_interval, Duration::from_millis(100));
        assert_eq!(engine.write_limit, None);
        assert_eq!(config.live_interval().unwrap(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_live_interval_disabled() {
        let mut config = Config::new("/dev/sdx");
        config.runtime.live_interval = "0".to_string();
        assert_eq!(config.live_interval().unwrap(), None);
    }

    #[test]
    fn test_bad_interval() {
        let mut config = Config::new("/dev/sdx");
        config.runtime.settle = "later".to_string();
        assert!(config.engine_config().is_err());
    }

    #[test]
    fn test_display_mentions_device() {
        let text = Config::new("/dev/zd16").to_string();
        assert!(text.contains("/dev/zd16"));
        assert!(text.contains("until device fails"));
    }
}
