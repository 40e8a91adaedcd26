//! Random payload pool
//!
//! Writers need a fresh block of random bytes for every write, and the
//! checker later needs the exact same bytes back. Pulling 4 KiB from the
//! kernel entropy source on every write would dominate the write path, so the
//! pool reads a large buffer once and hands out block-sized windows into it.
//! A window is named by its starting offset (`RandomId`), which is all the
//! registry has to remember per block.
//!
//! # Example
//!
//! ```no_run
//! use blockstress::pool::{RandomPool, BLOCK_SIZE};
//!
//! let pool = RandomPool::initialize()?;
//! let (id, payload) = pool.issue();
//! assert_eq!(payload.len(), BLOCK_SIZE);
//! assert_eq!(pool.resolve(id), payload);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::error::StressError;
use crate::Result;
use anyhow::Context;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Bit width of the block size
pub const BLOCK_SHIFT: u32 = 12;

/// Size of a device block and of every payload (4 KiB)
pub const BLOCK_SIZE: usize = 1 << BLOCK_SHIFT;

/// Size of the random pool (16 MiB)
pub const POOL_SIZE: usize = 16 * 1024 * 1024;

/// Default entropy source
pub const ENTROPY_SOURCE: &str = "/dev/urandom";

/// Offset into the pool at which a block-sized payload begins
///
/// Only meaningful for the pool that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RandomId(u32);

impl RandomId {
    /// Byte offset of the payload within the pool
    #[inline(always)]
    pub fn offset(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for RandomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Immutable buffer of random bytes
///
/// The buffer is filled once and never written again, so `issue` and
/// `resolve` take `&self` and the pool can be shared between writer threads
/// behind an `Arc` without locking.
pub struct RandomPool {
    buffer: Box<[u8]>,
}

impl RandomPool {
    /// Fill a `POOL_SIZE` pool from the system entropy source
    pub fn initialize() -> Result<Self> {
        Self::from_path(Path::new(ENTROPY_SOURCE))
    }

    /// Fill a `POOL_SIZE` pool from the file at `path`
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(StressError::Entropy)
            .with_context(|| format!("Failed to open entropy source: {}", path.display()))?;
        Self::from_reader(file)
    }

    /// Fill a `POOL_SIZE` pool from an arbitrary reader
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::with_size(reader, POOL_SIZE)
    }

    /// Fill a pool of `pool_size` bytes from `reader`
    ///
    /// Fails if the reader ends before the buffer is full. `pool_size` must be
    /// larger than one block.
    pub fn with_size<R: Read>(mut reader: R, pool_size: usize) -> Result<Self> {
        if pool_size <= BLOCK_SIZE || pool_size > u32::MAX as usize {
            anyhow::bail!(
                "pool size must be in ({}, {}], got {}",
                BLOCK_SIZE,
                u32::MAX,
                pool_size
            );
        }

        let mut buffer = vec![0u8; pool_size].into_boxed_slice();
        let mut filled = 0;

        while filled < pool_size {
            match reader.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(StressError::Entropy(e).into()),
            }
        }

        if filled < pool_size {
            return Err(StressError::ShortEntropy {
                wanted: pool_size,
                got: filled,
            }
            .into());
        }

        Ok(Self { buffer })
    }

    /// Pool size in bytes
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Exclusive upper bound of valid identifiers
    #[inline(always)]
    fn id_bound(&self) -> u32 {
        (self.buffer.len() - BLOCK_SIZE) as u32
    }

    /// Hand out a random payload using the calling thread's RNG
    pub fn issue(&self) -> (RandomId, &[u8]) {
        self.issue_with(&mut rand::thread_rng())
    }

    /// Hand out a random payload using the given RNG
    ///
    /// Writers pass their own xoshiro generator so the hot path never touches
    /// shared RNG state.
    #[inline(always)]
    pub fn issue_with<R: Rng + ?Sized>(&self, rng: &mut R) -> (RandomId, &[u8]) {
        let id = RandomId(rng.gen_range(0..self.id_bound()));
        (id, self.resolve(id))
    }

    /// Bytes of the payload named by `id`
    ///
    /// `id` must come from `issue` on this same pool. Foreign identifiers past
    /// the end of the buffer panic on the slice bound.
    #[inline(always)]
    pub fn resolve(&self, id: RandomId) -> &[u8] {
        let start = id.offset();
        &self.buffer[start..start + BLOCK_SIZE]
    }
}

impl std::fmt::Debug for RandomPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomPool")
            .field("size", &self.buffer.len())
            .finish()
    }
}
