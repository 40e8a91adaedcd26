//! In-memory device for testing
//!
//! Simulates a block device backed by a byte array so the engine can be
//! driven end to end without touching real hardware. Clones share the same
//! backing store, so a test keeps one clone to inject faults while the engine
//! owns another.
//!
//! # Failure injection
//!
//! - Fail every write after a fixed number of successful ones (the usual way
//!   to end a write phase in tests)
//! - Short writes and short reads
//! - Failing reads
//! - Detach and reattach (open fails and `is_present` is false while detached)
//! - Direct corruption of stored blocks between phases
//!
//! # Example
//!
//! ```
//! use blockstress::target::{AccessMode, Device};
//! use blockstress::target::memory::MemoryDevice;
//!
//! let device = MemoryDevice::new(16);
//! device.fail_writes_after(1);
//!
//! let mut handle = device.open(AccessMode::Write).unwrap();
//! assert!(handle.write_at(&[1u8; 4096], 0).is_ok());
//! assert!(handle.write_at(&[1u8; 4096], 4096).is_err());
//! ```

use super::{AccessMode, Device, DeviceHandle};
use crate::pool::{BLOCK_SHIFT, BLOCK_SIZE};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Simulated block device
#[derive(Clone)]
pub struct MemoryDevice {
    inner: Arc<Shared>,
}

struct Shared {
    path: PathBuf,
    data: Mutex<Vec<u8>>,
    present: AtomicBool,
    write_budget: AtomicU64,
    writes: AtomicU64,
    short_writes: AtomicBool,
    fail_reads: AtomicBool,
    short_reads: AtomicBool,
}

impl MemoryDevice {
    /// Zero-filled device of `block_count` blocks
    pub fn new(block_count: u64) -> Self {
        Self::with_size(block_count << BLOCK_SHIFT)
    }

    /// Zero-filled device of `size` bytes (need not be block aligned)
    pub fn with_size(size: u64) -> Self {
        Self {
            inner: Arc::new(Shared {
                path: PathBuf::from("memory"),
                data: Mutex::new(vec![0u8; size as usize]),
                present: AtomicBool::new(true),
                write_budget: AtomicU64::new(u64::MAX),
                writes: AtomicU64::new(0),
                short_writes: AtomicBool::new(false),
                fail_reads: AtomicBool::new(false),
                short_reads: AtomicBool::new(false),
            }),
        }
    }

    /// Fail every write once `count` writes have succeeded in total
    pub fn fail_writes_after(&self, count: u64) {
        self.inner.write_budget.store(count, Ordering::SeqCst);
    }

    /// Writes transfer only half the buffer
    pub fn set_short_writes(&self, enabled: bool) {
        self.inner.short_writes.store(enabled, Ordering::SeqCst);
    }

    /// Reads fail with an IO error
    pub fn set_fail_reads(&self, enabled: bool) {
        self.inner.fail_reads.store(enabled, Ordering::SeqCst);
    }

    /// Reads transfer only half the buffer
    pub fn set_short_reads(&self, enabled: bool) {
        self.inner.short_reads.store(enabled, Ordering::SeqCst);
    }

    /// Take the device away: opens fail and open handles stop working
    pub fn detach(&self) {
        self.inner.present.store(false, Ordering::SeqCst);
    }

    /// Bring the device back
    pub fn attach(&self) {
        self.inner.present.store(true, Ordering::SeqCst);
    }

    /// Number of writes that succeeded (fully or short)
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Copy of the block at `address`
    pub fn block(&self, address: u64) -> Vec<u8> {
        let start = (address << BLOCK_SHIFT) as usize;
        self.inner.data()[start..start + BLOCK_SIZE].to_vec()
    }

    /// Overwrite the block at `address` behind the engine's back
    pub fn overwrite_block(&self, address: u64, contents: &[u8]) {
        let start = (address << BLOCK_SHIFT) as usize;
        self.inner.data()[start..start + contents.len()].copy_from_slice(contents);
    }

    /// Flip every bit of one byte within the block at `address`
    pub fn corrupt_byte(&self, address: u64, offset: usize) {
        let index = (address << BLOCK_SHIFT) as usize + offset;
        self.inner.data()[index] ^= 0xFF;
    }
}

impl Shared {
    fn data(&self) -> MutexGuard<'_, Vec<u8>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_present(&self) -> io::Result<()> {
        if self.present.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, "device detached"))
        }
    }
}

impl Device for MemoryDevice {
    fn path(&self) -> &Path {
        &self.inner.path
    }

    fn open(&self, _mode: AccessMode) -> io::Result<Box<dyn DeviceHandle>> {
        self.inner.ensure_present()?;
        Ok(Box::new(MemoryHandle {
            inner: Arc::clone(&self.inner),
        }))
    }

    fn is_present(&self) -> bool {
        self.inner.present.load(Ordering::SeqCst)
    }
}

struct MemoryHandle {
    inner: Arc<Shared>,
}

impl DeviceHandle for MemoryHandle {
    fn size(&self) -> io::Result<u64> {
        self.inner.ensure_present()?;
        Ok(self.inner.data().len() as u64)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.inner.ensure_present()?;

        let attempt = self.inner.writes.fetch_add(1, Ordering::SeqCst);
        if attempt >= self.inner.write_budget.load(Ordering::SeqCst) {
            self.inner.writes.fetch_sub(1, Ordering::SeqCst);
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }

        let mut data = self.inner.data();
        let start = offset as usize;
        if start >= data.len() {
            return Ok(0);
        }

        let mut len = buf.len().min(data.len() - start);
        if self.inner.short_writes.load(Ordering::SeqCst) {
            len /= 2;
        }
        data[start..start + len].copy_from_slice(&buf[..len]);
        Ok(len)
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.inner.ensure_present()?;
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected read failure"));
        }

        let data = self.inner.data();
        let start = offset as usize;
        if start >= data.len() {
            return Ok(0);
        }

        let mut len = buf.len().min(data.len() - start);
        if self.inner.short_reads.load(Ordering::SeqCst) {
            len /= 2;
        }
        buf[..len].copy_from_slice(&data[start..start + len]);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_device_round_trip() {
        let device = MemoryDevice::new(4);
        let mut handle = device.open(AccessMode::Write).unwrap();
        assert_eq!(handle.size().unwrap(), 4 * BLOCK_SIZE as u64);

        handle.write_at(&[7u8; BLOCK_SIZE], 2 * BLOCK_SIZE as u64).unwrap();
        assert_eq!(device.block(2), vec![7u8; BLOCK_SIZE]);
        assert_eq!(device.block(1), vec![0u8; BLOCK_SIZE]);
        assert_eq!(device.write_count(), 1);
    }

    #[test]
    fn test_write_budget() {
        let device = MemoryDevice::new(4);
        device.fail_writes_after(2);
        let mut handle = device.open(AccessMode::Write).unwrap();

        assert!(handle.write_at(&[1u8; BLOCK_SIZE], 0).is_ok());
        assert!(handle.write_at(&[1u8; BLOCK_SIZE], 0).is_ok());
        assert!(handle.write_at(&[1u8; BLOCK_SIZE], 0).is_err());
        assert_eq!(device.write_count(), 2);
    }

    #[test]
    fn test_short_transfers() {
        let device = MemoryDevice::new(2);
        device.set_short_writes(true);
        device.set_short_reads(true);

        let mut handle = device.open(AccessMode::Write).unwrap();
        assert_eq!(handle.write_at(&[1u8; BLOCK_SIZE], 0).unwrap(), BLOCK_SIZE / 2);

        let mut buf = vec![0u8; BLOCK_SIZE];
        assert_eq!(handle.read_at(&mut buf, 0).unwrap(), BLOCK_SIZE / 2);
    }

    #[test]
    fn test_detach_breaks_open_handles() {
        let device = MemoryDevice::new(2);
        let mut handle = device.open(AccessMode::Write).unwrap();

        device.detach();
        assert!(!device.is_present());
        assert!(handle.write_at(&[1u8; BLOCK_SIZE], 0).is_err());
        assert!(device.open(AccessMode::Read).is_err());

        device.attach();
        assert!(device.open(AccessMode::Read).is_ok());
    }

    #[test]
    fn test_corruption_helpers() {
        let device = MemoryDevice::new(2);
        device.overwrite_block(1, &[3u8; BLOCK_SIZE]);
        device.corrupt_byte(1, 10);

        let block = device.block(1);
        assert_eq!(block[9], 3);
        assert_eq!(block[10], 3 ^ 0xFF);
    }

    #[test]
    fn test_read_past_end() {
        let device = MemoryDevice::new(1);
        let mut handle = device.open(AccessMode::Read).unwrap();
        let mut buf = vec![0u8; BLOCK_SIZE];
        assert_eq!(handle.read_at(&mut buf, BLOCK_SIZE as u64).unwrap(), 0);
    }
}
