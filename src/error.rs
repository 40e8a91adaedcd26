//! Error taxonomy
//!
//! Most of blockstress propagates `anyhow::Error` with context attached at
//! each IO boundary. The variants below are the conditions a caller has to be
//! able to tell apart: setup failures abort before any write happens, read
//! faults abort the check phase. Write faults and data mismatches are not
//! errors at all; see `engine::WriterExit` and `engine::CheckReport`.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions raised by the engine and the random pool
#[derive(Debug, Error)]
pub enum StressError {
    /// Device could not be opened or sized
    #[error("cannot set up device {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Device is smaller than a single block
    #[error("device {path} is too small ({size} bytes, need at least one block)")]
    DeviceTooSmall { path: PathBuf, size: u64 },

    /// Entropy source could not be opened or read
    #[error("entropy source unavailable: {0}")]
    Entropy(#[source] std::io::Error),

    /// Entropy source ran dry before the pool was full
    #[error("entropy source exhausted: wanted {wanted} bytes, got {got}")]
    ShortEntropy { wanted: usize, got: usize },

    /// Read error while verifying a block
    #[error("read fault at block {address}: {source}")]
    ReadFault {
        address: u64,
        #[source]
        source: std::io::Error,
    },

    /// Device returned fewer bytes than a block while verifying
    #[error("short read at block {address}: got {got} bytes")]
    ShortRead { address: u64, got: usize },
}

impl StressError {
    /// Whether this error happened before any work started
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            StressError::Setup { .. }
                | StressError::DeviceTooSmall { .. }
                | StressError::Entropy(_)
                | StressError::ShortEntropy { .. }
        )
    }
}
