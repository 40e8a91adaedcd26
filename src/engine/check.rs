//! Check phase
//!
//! Reads back every block in the registry and compares it with the payload
//! recorded for it. The pass is exhaustive: a mismatching block is logged and
//! tallied and the pass moves on, so the report covers the full extent of
//! the damage. A block that cannot be read at all ends the pass, since the
//! rest of the report could no longer be trusted.

use crate::error::StressError;
use crate::pool::{RandomId, RandomPool, BLOCK_SHIFT, BLOCK_SIZE};
use crate::registry::BlockRegistry;
use crate::target::{AccessMode, Device};
use crate::util::verification::{verify_block, VerificationResult};
use crate::Result;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, trace, warn};

/// A block whose content differs from its recorded payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub address: u64,
    pub id: RandomId,
    /// Offset of the first differing byte within the block
    pub first_difference: usize,
    /// Number of differing bytes in the block
    pub differing_bytes: usize,
}

/// Outcome of the check phase
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    /// Blocks read and compared
    pub checked: u64,
    pub mismatches: Vec<Mismatch>,
    #[serde(with = "super::duration_secs")]
    pub elapsed: Duration,
}

impl CheckReport {
    pub fn mismatch_count(&self) -> u64 {
        self.mismatches.len() as u64
    }

    /// No block differed
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Verify every registry entry against the device
pub(crate) fn check_blocks(
    device: &dyn Device,
    pool: &RandomPool,
    registry: &BlockRegistry,
) -> Result<CheckReport> {
    let start = Instant::now();

    let mut handle = device
        .open(AccessMode::Read)
        .map_err(|source| StressError::Setup {
            path: device.path().to_path_buf(),
            source,
        })?;

    let total = registry.distinct_address_count();
    info!(blocks = total, "checking blocks");

    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut mismatches = Vec::new();
    let mut checked = 0u64;

    // Writers are joined by now, so the map is walked in place.
    registry.try_for_each(|address, id| -> Result<()> {
        let n = handle
            .read_at(&mut buf, address << BLOCK_SHIFT)
            .map_err(|source| StressError::ReadFault { address, source })?;
        if n != BLOCK_SIZE {
            return Err(StressError::ShortRead { address, got: n }.into());
        }
        checked += 1;

        match verify_block(&buf, pool.resolve(id)) {
            VerificationResult::Match => {
                trace!(block = address, "checked {} / {} ok", checked, total);
            }
            VerificationResult::Mismatch {
                offset,
                expected,
                actual,
                differing,
            } => {
                warn!(
                    block = address,
                    offset,
                    expected,
                    actual,
                    differing,
                    "checked {} / {} error",
                    checked,
                    total
                );
                mismatches.push(Mismatch {
                    address,
                    id,
                    first_difference: offset,
                    differing_bytes: differing,
                });
            }
        }
        Ok(())
    })?;

    let report = CheckReport {
        checked,
        mismatches,
        elapsed: start.elapsed(),
    };

    info!(
        checked = report.checked,
        errors = report.mismatch_count(),
        "check phase finished"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::memory::MemoryDevice;
    use std::io::Cursor;

    fn pool() -> RandomPool {
        let bytes: Vec<u8> = (0..BLOCK_SIZE * 8).map(|i| (i * 13 % 241) as u8).collect();
        RandomPool::with_size(Cursor::new(bytes), BLOCK_SIZE * 8).unwrap()
    }

    /// Write `count` blocks directly, recording each in the registry
    fn populate(device: &MemoryDevice, pool: &RandomPool, registry: &BlockRegistry, count: u64) {
        for address in 0..count {
            let (id, payload) = pool.issue();
            device.overwrite_block(address, payload);
            registry.record_write(address, id);
        }
    }

    #[test]
    fn test_clean_device() {
        let device = MemoryDevice::new(32);
        let pool = pool();
        let registry = BlockRegistry::new();
        populate(&device, &pool, &registry, 32);

        let report = check_blocks(&device, &pool, &registry).unwrap();
        assert_eq!(report.checked, 32);
        assert!(report.is_clean());
    }

    #[test]
    fn test_check_is_exhaustive() {
        let device = MemoryDevice::new(40);
        let pool = pool();
        let registry = BlockRegistry::new();
        populate(&device, &pool, &registry, 40);
        device.corrupt_byte(20, 17);

        let report = check_blocks(&device, &pool, &registry).unwrap();
        assert_eq!(report.checked, 40);
        assert_eq!(report.mismatch_count(), 1);
        assert_eq!(report.mismatches[0].address, 20);
        assert_eq!(report.mismatches[0].first_difference, 17);
        assert_eq!(report.mismatches[0].differing_bytes, 1);
    }

    #[test]
    fn test_checked_matches_distinct_addresses() {
        let device = MemoryDevice::new(16);
        let pool = pool();
        let registry = BlockRegistry::new();
        for round in 0..3u64 {
            for address in (round..16).step_by(2) {
                let (id, payload) = pool.issue();
                device.overwrite_block(address, payload);
                registry.record_write(address, id);
            }
        }

        let report = check_blocks(&device, &pool, &registry).unwrap();
        assert_eq!(report.checked, registry.distinct_address_count() as u64);
        assert!(registry.write_count() > report.checked);
        assert!(report.is_clean());
    }

    #[test]
    fn test_many_mismatches_all_reported() {
        let device = MemoryDevice::new(10);
        let pool = pool();
        let registry = BlockRegistry::new();
        populate(&device, &pool, &registry, 10);
        for address in [1, 4, 9] {
            device.corrupt_byte(address, 0);
        }

        let report = check_blocks(&device, &pool, &registry).unwrap();
        let mut addresses: Vec<u64> = report.mismatches.iter().map(|m| m.address).collect();
        addresses.sort();
        assert_eq!(addresses, vec![1, 4, 9]);
    }

    #[test]
    fn test_read_error_is_fatal() {
        let device = MemoryDevice::new(4);
        let pool = pool();
        let registry = BlockRegistry::new();
        populate(&device, &pool, &registry, 4);
        device.set_fail_reads(true);

        let err = check_blocks(&device, &pool, &registry).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StressError>(),
            Some(StressError::ReadFault { .. })
        ));
    }

    #[test]
    fn test_short_read_is_fatal() {
        let device = MemoryDevice::new(4);
        let pool = pool();
        let registry = BlockRegistry::new();
        populate(&device, &pool, &registry, 4);
        device.set_short_reads(true);

        let err = check_blocks(&device, &pool, &registry).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StressError>(),
            Some(StressError::ShortRead { got, .. }) if *got == BLOCK_SIZE / 2
        ));
    }

    #[test]
    fn test_empty_registry_checks_nothing() {
        let device = MemoryDevice::new(4);
        let report = check_blocks(&device, &pool(), &BlockRegistry::new()).unwrap();
        assert_eq!(report.checked, 0);
        assert!(report.is_clean());
    }
}
