//! Live write-phase statistics
//!
//! Polls the registry's write counter at a fixed interval and prints the
//! running total, the IOPS over the last interval and the average IOPS since
//! the reporter started, on a single carriage-returned line.
//!
//! # Example
//!
//! ```no_run
//! use blockstress::registry::BlockRegistry;
//! use blockstress::stats::live::LiveReporter;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let registry = Arc::new(BlockRegistry::new());
//! let reporter = LiveReporter::spawn(Arc::clone(&registry), Duration::from_millis(500))?;
//! // ... run the write phase ...
//! reporter.finish();
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::registry::BlockRegistry;
use crate::util::time::{calculate_iops, format_rate};
use crate::Result;
use anyhow::Context;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// One progress sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveSample {
    pub total: u64,
    pub distinct: usize,
    /// IOPS since the previous sample
    pub last_iops: f64,
    /// IOPS since the tracker started
    pub avg_iops: f64,
}

impl LiveSample {
    /// Console line for this sample (without the leading carriage return)
    pub fn line(&self) -> String {
        format!(
            "Total written: {:>9} ({:>9} blocks). Last IOPS={:>7}  AVG IOPS={:>7}",
            self.total,
            self.distinct,
            format_rate(self.last_iops),
            format_rate(self.avg_iops)
        )
    }
}

/// Turns successive counter readings into rates
#[derive(Debug)]
pub struct LiveStats {
    start: Instant,
    last_update: Instant,
    last_total: u64,
}

impl LiveStats {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            start: now,
            last_update: now,
            last_total: 0,
        }
    }

    /// Record a reading of the counters
    pub fn update(&mut self, total: u64, distinct: usize) -> LiveSample {
        self.update_at(Instant::now(), total, distinct)
    }

    fn update_at(&mut self, now: Instant, total: u64, distinct: usize) -> LiveSample {
        let sample = LiveSample {
            total,
            distinct,
            last_iops: calculate_iops(
                total.saturating_sub(self.last_total),
                now.duration_since(self.last_update),
            ),
            avg_iops: calculate_iops(total, now.duration_since(self.start)),
        };

        self.last_update = now;
        self.last_total = total;
        sample
    }
}

impl Default for LiveStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Background thread printing live progress
pub struct LiveReporter {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl LiveReporter {
    /// Start printing a progress line every `interval`
    pub fn spawn(registry: Arc<BlockRegistry>, interval: Duration) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("live-stats".to_string())
            .spawn(move || report_loop(&registry, interval, &thread_stop))
            .context("Failed to spawn live statistics thread")?;

        Ok(Self { stop, handle })
    }

    /// Stop the reporter and end the progress line
    pub fn finish(self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.handle.join().is_ok() {
            println!();
        }
    }
}

fn report_loop(registry: &BlockRegistry, interval: Duration, stop: &AtomicBool) {
    let mut stats = LiveStats::new();
    let mut next = Instant::now() + interval;

    while !stop.load(Ordering::Relaxed) {
        // Sleep in short slices so `finish` does not wait a full interval
        let now = Instant::now();
        if now < next {
            std::thread::sleep((next - now).min(Duration::from_millis(50)));
            continue;
        }
        next += interval;

        let sample = stats.update(registry.write_count(), registry.distinct_address_count());
        print!("\r{}", sample.line());
        io::stdout().flush().ok();
    }
}
