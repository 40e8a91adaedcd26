//! Write/verify engine
//!
//! The engine drives one run against one device:
//!
//! ```text
//! idle -> writing -> draining -> checking -> done
//!            \                       \
//!             +-------> failed <------+
//! ```
//!
//! - **writing**: `threads` writer threads overwrite random blocks with pool
//!   payloads until each of them stops (see `worker`). Write faults end the
//!   affected writer only.
//! - **draining**: every writer handle is closed. The engine waits for the
//!   device path to exist again, polling at a fixed interval, so an external
//!   process can detach and reattach the device before verification.
//! - **checking**: every registry entry is read back and compared with its
//!   payload. Mismatches are tallied; a read fault aborts the run.
//!
//! Failing to open or size the device at setup, or to open it for checking,
//! is fatal.
//!
//! # Example
//!
//! ```no_run
//! use blockstress::engine::{Engine, EngineConfig};
//! use blockstress::pool::RandomPool;
//! use blockstress::target::block::BlockDevice;
//! use std::sync::Arc;
//!
//! let device = Arc::new(BlockDevice::new("/dev/sdb"));
//! let pool = Arc::new(RandomPool::initialize()?);
//! let mut engine = Engine::new(device, pool, EngineConfig::default())?;
//!
//! let report = engine.run()?;
//! println!("{} of {} blocks differ", report.mismatch_count(), report.checked);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod check;

pub use check::{CheckReport, Mismatch};

use crate::error::StressError;
use crate::pool::{RandomPool, BLOCK_SHIFT};
use crate::registry::BlockRegistry;
use crate::target::{AccessMode, Device};
use crate::worker::{Writer, WriterExit};
use crate::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default number of writer threads
pub const DEFAULT_THREADS: usize = 4;

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of writer threads
    pub threads: usize,
    /// Maximum writes per writer (unbounded when `None`)
    pub write_limit: Option<u64>,
    /// Pause between the end of the write phase and the first presence probe
    pub settle: Duration,
    /// Interval between device presence probes while draining
    pub poll_interval: Duration,
    /// Seed for reproducible address and payload sequences
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            write_limit: None,
            settle: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
            seed: None,
        }
    }
}

/// Run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Writing,
    Draining,
    Checking,
    Done,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Writing => "writing",
            Phase::Draining => "draining",
            Phase::Checking => "checking",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Point-in-time write counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Successful writes so far
    pub written: u64,
    /// Distinct blocks written so far
    pub distinct: usize,
}

/// Result of the write phase
#[derive(Debug, Clone, Serialize)]
pub struct WriteSummary {
    pub writes: u64,
    pub distinct_blocks: usize,
    pub writers: Vec<WriterExit>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

/// Orchestrates the write phase, the wait for the device, and the check phase
pub struct Engine {
    device: Arc<dyn Device>,
    pool: Arc<RandomPool>,
    registry: Arc<BlockRegistry>,
    config: EngineConfig,
    block_count: u64,
    phase: Phase,
}

impl Engine {
    /// Size the device and prepare an idle engine
    ///
    /// The device is opened read-only just long enough to learn its size.
    pub fn new(device: Arc<dyn Device>, pool: Arc<RandomPool>, config: EngineConfig) -> Result<Self> {
        if config.threads == 0 {
            anyhow::bail!("at least one writer thread is required");
        }

        let path = device.path().to_path_buf();
        let size = device
            .open(AccessMode::Read)
            .and_then(|handle| handle.size())
            .map_err(|source| StressError::Setup {
                path: path.clone(),
                source,
            })?;

        let block_count = size >> BLOCK_SHIFT;
        if block_count == 0 {
            return Err(StressError::DeviceTooSmall { path, size }.into());
        }

        info!(device = %device.path().display(), size, block_count, "device sized");

        Ok(Self {
            device,
            pool,
            registry: Arc::new(BlockRegistry::new()),
            config,
            block_count,
            phase: Phase::Idle,
        })
    }

    /// Number of addressable blocks on the device
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared registry, for progress reporters running beside the engine
    pub fn registry(&self) -> Arc<BlockRegistry> {
        Arc::clone(&self.registry)
    }

    /// Current write counters; safe to call while writers run
    pub fn progress(&self) -> Progress {
        Progress {
            written: self.registry.write_count(),
            distinct: self.registry.distinct_address_count(),
        }
    }

    /// Run the write phase until every writer stops on its own
    pub fn run_write_phase(&mut self) -> Result<WriteSummary> {
        self.run_write_phase_until(&AtomicBool::new(false))
    }

    /// Run the write phase until every writer stops or `stop` is raised
    pub fn run_write_phase_until(&mut self, stop: &AtomicBool) -> Result<WriteSummary> {
        self.expect_phase(Phase::Idle, "write phase")?;
        self.phase = Phase::Writing;

        info!(
            device = %self.device.path().display(),
            threads = self.config.threads,
            "destroying device contents"
        );

        let start = Instant::now();
        let device: &dyn Device = self.device.as_ref();
        let pool: &RandomPool = &self.pool;
        let registry: &BlockRegistry = &self.registry;
        let block_count = self.block_count;
        let config = &self.config;
        // Raised when the phase is abandoned, so writers already running
        // stop before the scope joins them.
        let abort = AtomicBool::new(false);
        let abort = &abort;

        let joined: Result<Vec<WriterExit>> = std::thread::scope(|s| {
            let mut handles = Vec::with_capacity(config.threads);
            for id in 0..config.threads {
                let writer = Writer::new(
                    id,
                    device,
                    pool,
                    registry,
                    block_count,
                    config.seed,
                    config.write_limit,
                );
                let spawned = std::thread::Builder::new()
                    .name(format!("writer-{}", id))
                    .spawn_scoped(s, move || writer.run_until_any(&[stop, abort]));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        abort.store(true, Ordering::Relaxed);
                        return Err(anyhow::Error::new(e)
                            .context(format!("Failed to spawn writer {}", id)));
                    }
                }
            }

            handles
                .into_iter()
                .enumerate()
                .map(|(id, handle)| {
                    handle
                        .join()
                        .map_err(|_| anyhow::anyhow!("writer {} panicked", id))
                })
                .collect()
        });

        let writers = match joined {
            Ok(writers) => writers,
            Err(e) => {
                self.phase = Phase::Failed;
                return Err(e);
            }
        };

        // All writer handles are closed once the scope has joined.
        self.phase = Phase::Draining;

        let summary = WriteSummary {
            writes: self.registry.write_count(),
            distinct_blocks: self.registry.distinct_address_count(),
            writers,
            elapsed: start.elapsed(),
        };

        info!(
            writes = summary.writes,
            distinct = summary.distinct_blocks,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "write phase finished"
        );

        Ok(summary)
    }

    /// Wait for the device to be present again
    ///
    /// Sleeps for the settle delay, then polls until the device path exists.
    /// There is no timeout; returns at once (after settling) if the device
    /// never went away.
    pub fn wait_for_device(&mut self) -> Result<()> {
        self.expect_phase(Phase::Draining, "drain")?;

        std::thread::sleep(self.config.settle);

        if !self.device.is_present() {
            info!(device = %self.device.path().display(), "waiting for device to become available again");
        }

        let mut polls = 0u64;
        while !self.device.is_present() {
            std::thread::sleep(self.config.poll_interval);
            polls += 1;
        }

        debug!(polls, "device present");
        Ok(())
    }

    /// Verify every recorded block
    ///
    /// Runs after the write phase (with or without `wait_for_device`). A
    /// failure to open or read the device moves the engine to `Failed`.
    pub fn run_check_phase(&mut self) -> Result<CheckReport> {
        self.expect_phase(Phase::Draining, "check phase")?;
        self.phase = Phase::Checking;

        match check::check_blocks(self.device.as_ref(), &self.pool, &self.registry) {
            Ok(report) => {
                self.phase = Phase::Done;
                Ok(report)
            }
            Err(e) => {
                self.phase = Phase::Failed;
                Err(e)
            }
        }
    }

    /// Full run: write until the device goes away, wait for it, verify
    pub fn run(&mut self) -> Result<CheckReport> {
        self.run_until(&AtomicBool::new(false))
    }

    /// Full run with an explicit stop signal for the write phase
    pub fn run_until(&mut self, stop: &AtomicBool) -> Result<CheckReport> {
        self.run_write_phase_until(stop)?;
        self.wait_for_device()?;
        self.run_check_phase()
    }

    fn expect_phase(&self, expected: Phase, what: &str) -> Result<()> {
        if self.phase != expected {
            anyhow::bail!("cannot start {} in phase {} (expected {})", what, self.phase, expected);
        }
        Ok(())
    }
}

pub(crate) mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BLOCK_SIZE;
    use crate::target::memory::MemoryDevice;
    use std::io::Cursor;

    fn pool() -> Arc<RandomPool> {
        let bytes: Vec<u8> = (0..BLOCK_SIZE * 16).map(|i| (i * 31 % 251) as u8).collect();
        Arc::new(RandomPool::with_size(Cursor::new(bytes), BLOCK_SIZE * 16).unwrap())
    }

    fn quick_config(threads: usize) -> EngineConfig {
        EngineConfig {
            threads,
            write_limit: None,
            settle: Duration::ZERO,
            poll_interval: Duration::from_millis(5),
            seed: Some(17),
        }
    }

    #[test]
    fn test_new_sizes_device() {
        let device = Arc::new(MemoryDevice::with_size(10 * BLOCK_SIZE as u64 + 100));
        let engine = Engine::new(device, pool(), quick_config(1)).unwrap();
        assert_eq!(engine.block_count(), 10);
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn test_device_smaller_than_block_is_setup_error() {
        let device = Arc::new(MemoryDevice::with_size(100));
        let err = Engine::new(device, pool(), quick_config(1)).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<StressError>(),
            Some(StressError::DeviceTooSmall { size: 100, .. })
        ));
    }

    #[test]
    fn test_missing_device_is_setup_error() {
        let device = MemoryDevice::new(4);
        device.detach();
        let err = Engine::new(Arc::new(device), pool(), quick_config(1)).err().unwrap();
        let typed = err.downcast_ref::<StressError>().unwrap();
        assert!(typed.is_setup());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let device = Arc::new(MemoryDevice::new(4));
        assert!(Engine::new(device, pool(), quick_config(0)).is_err());
    }

    #[test]
    fn test_write_phase_ends_when_device_fails() {
        let device = MemoryDevice::new(64);
        device.fail_writes_after(500);
        let mut engine = Engine::new(Arc::new(device.clone()), pool(), quick_config(4)).unwrap();

        let summary = engine.run_write_phase().unwrap();

        assert_eq!(summary.writes, 500);
        assert_eq!(summary.writers.len(), 4);
        assert!(summary.writers.iter().all(|w| w.reason.is_device_fault()));
        assert_eq!(summary.writers.iter().map(|w| w.writes).sum::<u64>(), 500);
        assert_eq!(engine.phase(), Phase::Draining);
        assert_eq!(engine.progress().written, 500);
    }

    #[test]
    fn test_phase_order_enforced() {
        let device = Arc::new(MemoryDevice::new(8));
        let mut engine = Engine::new(device, pool(), quick_config(1)).unwrap();

        assert!(engine.run_check_phase().is_err());
        assert!(engine.wait_for_device().is_err());
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn test_write_phase_cannot_run_twice() {
        let mut config = quick_config(2);
        config.write_limit = Some(5);
        let device = Arc::new(MemoryDevice::new(8));
        let mut engine = Engine::new(device, pool(), config).unwrap();

        engine.run_write_phase().unwrap();
        assert!(engine.run_write_phase().is_err());
    }

    #[test]
    fn test_stop_flag_ends_write_phase() {
        let device = Arc::new(MemoryDevice::new(32));
        let mut engine = Engine::new(device, pool(), quick_config(3)).unwrap();
        let stop = AtomicBool::new(false);
        let registry = engine.registry();

        let summary = std::thread::scope(|s| {
            s.spawn(|| {
                while registry.write_count() < 100 {
                    std::thread::yield_now();
                }
                stop.store(true, Ordering::Relaxed);
            });
            engine.run_write_phase_until(&stop).unwrap()
        });

        assert!(summary.writes >= 100);
        assert!(summary
            .writers
            .iter()
            .all(|w| w.reason == crate::worker::ExitReason::Stopped));
    }

    #[test]
    fn test_wait_for_device_blocks_until_reattached() {
        let device = MemoryDevice::new(16);
        device.fail_writes_after(50);
        // One writer: concurrent writers to the same block may legitimately
        // leave the registry naming the payload that lost the race.
        let mut engine = Engine::new(Arc::new(device.clone()), pool(), quick_config(1)).unwrap();
        engine.run_write_phase().unwrap();

        device.detach();
        let reattach = {
            let device = device.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                device.attach();
            })
        };

        let start = Instant::now();
        engine.wait_for_device().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert!(device.is_present());
        reattach.join().unwrap();

        let report = engine.run_check_phase().unwrap();
        assert_eq!(report.checked, engine.progress().distinct as u64);
        assert!(report.is_clean());
        assert_eq!(engine.phase(), Phase::Done);
    }

    #[test]
    fn test_check_open_failure_is_fatal() {
        let device = MemoryDevice::new(16);
        device.fail_writes_after(10);
        let mut engine = Engine::new(Arc::new(device.clone()), pool(), quick_config(1)).unwrap();
        engine.run_write_phase().unwrap();

        device.detach();
        let err = engine.run_check_phase().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StressError>(),
            Some(StressError::Setup { .. })
        ));
        assert_eq!(engine.phase(), Phase::Failed);
    }
}
