//! Writer threads
//!
//! A `Writer` is one unit of write-phase parallelism. It owns its own device
//! handle and RNGs and shares only the pool and the registry with the other
//! writers. Each iteration draws a payload, draws a block address, writes the
//! payload there, and records the write once the device has accepted the
//! whole block.
//!
//! The loop has no natural end. It stops when the device stops accepting
//! writes (the expected way a run ends: the operator pulls the device or
//! fails it over), when the stop flag is raised, or when an optional per
//! writer limit is reached. None of these is an error for the run.

use crate::distribution::{uniform::UniformDistribution, Distribution};
use crate::pool::{RandomPool, BLOCK_SHIFT, BLOCK_SIZE};
use crate::registry::BlockRegistry;
use crate::target::{AccessMode, Device};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Why a writer stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitReason {
    /// Stop flag raised
    Stopped,
    /// Per-writer write limit reached
    LimitReached,
    /// Could not open a write handle
    OpenFailed { error: String },
    /// Device returned an error
    WriteError { error: String },
    /// Device accepted fewer bytes than a block
    ShortWrite { written: usize },
}

impl ExitReason {
    /// Whether the device went away under this writer
    pub fn is_device_fault(&self) -> bool {
        matches!(
            self,
            ExitReason::OpenFailed { .. } | ExitReason::WriteError { .. } | ExitReason::ShortWrite { .. }
        )
    }
}

/// Final state of one writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriterExit {
    pub writer: usize,
    /// Writes this writer recorded in the registry
    pub writes: u64,
    pub reason: ExitReason,
}

/// One write-phase thread
pub struct Writer<'a> {
    id: usize,
    device: &'a dyn Device,
    pool: &'a RandomPool,
    registry: &'a BlockRegistry,
    block_count: u64,
    distribution: UniformDistribution,
    rng: Xoshiro256PlusPlus,
    limit: Option<u64>,
}

impl<'a> Writer<'a> {
    /// Create writer `id`
    ///
    /// With a `seed`, the address and payload sequences are derived from it
    /// and the writer id, so a single-writer run against the same device
    /// repeats exactly.
    pub fn new(
        id: usize,
        device: &'a dyn Device,
        pool: &'a RandomPool,
        registry: &'a BlockRegistry,
        block_count: u64,
        seed: Option<u64>,
        limit: Option<u64>,
    ) -> Self {
        let (distribution, rng) = match seed {
            Some(seed) => {
                let base = seed.wrapping_add((id as u64).wrapping_mul(2));
                (
                    UniformDistribution::with_seed(base),
                    Xoshiro256PlusPlus::seed_from_u64(base.wrapping_add(1)),
                )
            }
            None => (UniformDistribution::new(), Xoshiro256PlusPlus::from_entropy()),
        };

        Self {
            id,
            device,
            pool,
            registry,
            block_count,
            distribution,
            rng,
            limit,
        }
    }

    /// Write until the device fails, `stop` is raised, or the limit is hit
    pub fn run(self, stop: &AtomicBool) -> WriterExit {
        self.run_until_any(&[stop])
    }

    /// Like `run`, stopping as soon as any of `stops` is raised
    pub fn run_until_any(mut self, stops: &[&AtomicBool]) -> WriterExit {
        let mut writes = 0u64;

        let mut handle = match self.device.open(AccessMode::Write) {
            Ok(handle) => handle,
            Err(e) => {
                debug!(writer = self.id, error = %e, "writer could not open device");
                return self.exit(writes, ExitReason::OpenFailed { error: e.to_string() });
            }
        };

        let reason = loop {
            if stops.iter().any(|stop| stop.load(Ordering::Relaxed)) {
                break ExitReason::Stopped;
            }
            if self.limit.is_some_and(|limit| writes >= limit) {
                break ExitReason::LimitReached;
            }

            let (id, payload) = self.pool.issue_with(&mut self.rng);
            let address = self.distribution.next_address(self.block_count);

            match handle.write_at(payload, address << BLOCK_SHIFT) {
                Ok(n) if n == BLOCK_SIZE => {}
                Ok(n) => break ExitReason::ShortWrite { written: n },
                Err(e) => break ExitReason::WriteError { error: e.to_string() },
            }

            self.registry.record_write(address, id);
            writes += 1;
        };

        debug!(writer = self.id, writes, reason = ?reason, "writer finished");
        self.exit(writes, reason)
    }

    fn exit(&self, writes: u64, reason: ExitReason) -> WriterExit {
        WriterExit {
            writer: self.id,
            writes,
            reason,
        }
    }
}
