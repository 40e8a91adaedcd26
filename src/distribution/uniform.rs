//! Uniform block address distribution
//!
//! Every block is equally likely. Uses xoshiro256++, which is cheap enough to
//! call once per write without showing up next to the write syscall.

use super::Distribution;
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Uniform random block addresses
pub struct UniformDistribution {
    rng: Xoshiro256PlusPlus,
}

impl UniformDistribution {
    /// Seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: Xoshiro256PlusPlus::from_entropy(),
        }
    }

    /// Seeded deterministically, for reproducible runs
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }
}

impl Default for UniformDistribution {
    fn default() -> Self {
        Self::new()
    }
}

impl Distribution for UniformDistribution {
    #[inline(always)]
    fn next_address(&mut self, block_count: u64) -> u64 {
        if block_count == 0 {
            return 0;
        }
        self.rng.gen_range(0..block_count)
    }
}
