//! Device abstraction
//!
//! A `Device` is the thing being stress tested. The engine never holds a
//! device handle across phases: each writer opens its own write handle, and
//! the check phase opens a fresh read handle once the device has come back.
//!
//! # Implementations
//!
//! - **`block::BlockDevice`**: a raw block device or a regular file, accessed
//!   with positioned reads and writes
//! - **`memory::MemoryDevice`**: an in-memory block array with failure
//!   injection, used to drive the engine deterministically in tests

use std::io;
use std::path::Path;

/// How a handle is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Write-only handle for a writer thread
    Write,
    /// Read-only handle for sizing and verification
    Read,
}

/// A target that can be opened, and probed for presence while detached
///
/// Methods return plain `io::Result` so the engine decides what a failure
/// means: fatal at setup and during the check phase, the end of one writer
/// during the write phase.
pub trait Device: Send + Sync {
    /// Path used in log lines and error messages
    fn path(&self) -> &Path;

    /// Open a new independent handle
    fn open(&self, mode: AccessMode) -> io::Result<Box<dyn DeviceHandle>>;

    /// Whether the device path currently exists
    fn is_present(&self) -> bool;
}

/// An open handle on a device
///
/// Each call is a single positioned transfer. Short transfers are reported
/// as-is; retrying is the caller's decision.
pub trait DeviceHandle: Send {
    /// Device size in bytes
    fn size(&self) -> io::Result<u64>;

    /// Write `buf` at byte `offset`, returning the number of bytes written
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Read into `buf` from byte `offset`, returning the number of bytes read
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

pub mod block;
pub mod memory;
