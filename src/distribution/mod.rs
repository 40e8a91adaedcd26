//! Block address selection
//!
//! Writers pick the block to overwrite through a `Distribution`. Addresses
//! are block indices in `[0, block_count)`; the writer turns them into byte
//! offsets with `address << BLOCK_SHIFT`, so every write is block aligned.
//!
//! # Example
//!
//! ```
//! use blockstress::distribution::{Distribution, uniform::UniformDistribution};
//!
//! let mut dist = UniformDistribution::with_seed(7);
//! let address = dist.next_address(1024);
//! assert!(address < 1024);
//! ```

/// Source of block addresses for a single writer
///
/// Each writer thread owns its own instance, so implementations need `Send`
/// but never `Sync`.
pub trait Distribution: Send {
    /// Next block address in `[0, block_count)`
    ///
    /// Returns 0 when `block_count` is 0.
    fn next_address(&mut self, block_count: u64) -> u64;
}

pub mod uniform;
