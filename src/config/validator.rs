//! Configuration validation

use super::*;
use anyhow::Result;

/// Upper bound on writer threads
pub const MAX_THREADS: usize = 1024;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.device.as_os_str().is_empty() {
        anyhow::bail!("device path must not be empty");
    }

    if config.threads == 0 || config.threads > MAX_THREADS {
        anyhow::bail!(
            "threads must be between 1 and {}, got {}",
            MAX_THREADS,
            config.threads
        );
    }

    if config.write_limit == Some(0) {
        anyhow::bail!("write_limit must be at least 1 when set");
    }

    validate_runtime(config)?;
    validate_output(&config.output)?;

    Ok(())
}

/// Intervals must parse; the poll interval must be non-zero
fn validate_runtime(config: &Config) -> Result<()> {
    let engine = config.engine_config()?;
    config.live_interval()?;

    if engine.poll_interval.is_zero() {
        anyhow::bail!("poll_interval must be greater than zero");
    }

    Ok(())
}

fn validate_output(output: &OutputConfig) -> Result<()> {
    if let Some(ref path) = output.json_output {
        if path.as_os_str().is_empty() {
            anyhow::bail!("json_output path must not be empty");
        }
        if path.is_dir() {
            anyhow::bail!("json_output {} is a directory", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(validate_config(&Config::new("/dev/sdb")).is_ok());
    }

    #[test]
    fn test_thread_bounds() {
        let mut config = Config::new("/dev/sdb");
        config.threads = 0;
        assert!(validate_config(&config).is_err());
        config.threads = MAX_THREADS + 1;
        assert!(validate_config(&config).is_err());
        config.threads = MAX_THREADS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_device_rejected() {
        assert!(validate_config(&Config::new("")).is_err());
    }

    #[test]
    fn test_zero_write_limit_rejected() {
        let mut config = Config::new("/dev/sdb");
        config.write_limit = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = Config::new("/dev/sdb");
        config.runtime.poll_interval = "0ms".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_json_output_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new("/dev/sdb");
        config.output.json_output = Some(dir.path().to_path_buf());
        assert!(validate_config(&config).is_err());
    }
}
