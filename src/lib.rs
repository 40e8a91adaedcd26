//! blockstress - block device integrity stress tester
//!
//! blockstress overwrites a raw device with random blocks from many
//! concurrent writers, remembering which payload landed at each block. Once
//! the device has been taken away and returned (power cycle, failover,
//! reattach), it reads every remembered block back and reports each one
//! whose content changed. The goal is to surface silent corruption and lost
//! writes in a storage stack under concurrent write pressure.
//!
//! # Architecture
//!
//! - **pool**: pre-filled random buffer handing out block-sized payloads
//! - **registry**: concurrent block address -> payload map with a write counter
//! - **worker**: writer threads driving the write phase
//! - **engine**: write phase, wait for the device, check phase
//! - **target**: real block devices and an in-memory device for tests

pub mod config;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod output;
pub mod pool;
pub mod registry;
pub mod stats;
pub mod target;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use engine::{CheckReport, Engine, EngineConfig, Phase};
pub use error::StressError;
pub use pool::{RandomId, RandomPool, BLOCK_SIZE};
pub use registry::BlockRegistry;

/// Result type used throughout blockstress
pub type Result<T> = anyhow::Result<T>;
