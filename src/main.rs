//! blockstress CLI entry point
//!
//! Exit status: 0 for a clean run, 1 when the check found mismatching
//! blocks, 2 when the run could not be completed.

use anyhow::{Context, Result};
use blockstress::config::{cli::Cli, toml::build_config, validator::validate_config, Config};
use blockstress::engine::Engine;
use blockstress::output::{json, text};
use blockstress::pool::RandomPool;
use blockstress::stats::live::LiveReporter;
use blockstress::target::block::BlockDevice;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.debug);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{}", fatal_message(&e));
            ExitCode::from(2)
        }
    }
}

/// One line naming the error and its whole context chain
fn fatal_message(e: &anyhow::Error) -> String {
    format!("Error: {:#}", e)
}

/// Logs go to stderr so the progress line owns stdout
fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns whether the device verified clean
fn run(cli: Cli) -> Result<bool> {
    let config = build_config(&cli)?;
    validate_config(&config).context("Configuration validation failed")?;

    println!("blockstress v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", config);
    println!();

    if cli.dry_run {
        println!("Dry run mode - configuration validated successfully");
        return Ok(true);
    }

    run_stress(&config)
}

fn run_stress(config: &Config) -> Result<bool> {
    let pool = RandomPool::initialize().context("Failed to fill random pool")?;
    let device = Arc::new(BlockDevice::new(&config.device).with_sync(config.sync));
    let mut engine = Engine::new(device, Arc::new(pool), config.engine_config()?)?;

    println!(
        "Starting {} threads to stress test {} ({} blocks)",
        config.threads,
        config.device.display(),
        engine.block_count()
    );
    println!("Destroying the contents of {}", config.device.display());

    let started_at = chrono::Utc::now();
    let reporter = match config.live_interval()? {
        Some(interval) => Some(LiveReporter::spawn(engine.registry(), interval)?),
        None => None,
    };

    let write = engine.run_write_phase();
    if let Some(reporter) = reporter {
        reporter.finish();
    }
    let write = write?;

    println!("Waiting for {} to become available again", config.device.display());
    engine.wait_for_device()?;

    let check = engine.run_check_phase()?;
    text::print_results(&write, &check);

    let clean = check.is_clean();
    if let Some(ref path) = config.output.json_output {
        let report = json::RunReport::new(
            &config.device,
            config.threads,
            engine.block_count(),
            started_at,
            write,
            check,
        );
        json::write_json_output(path, &report, config.output.json_pretty)?;
        println!("JSON report written to {}", path.display());
    }

    Ok(clean)
}
