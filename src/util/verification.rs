//! Block content verification
//!
//! Compares a block read back from the device against the payload that was
//! recorded for it. Besides the yes/no answer the comparison reports where
//! the first difference is and how many bytes differ, which tells a torn
//! write (one contiguous tail wrong) apart from a stale block (almost every
//! byte wrong).

/// Outcome of comparing a block with its expected payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResult {
    /// Every byte matches
    Match,
    /// At least one byte differs
    Mismatch {
        /// Offset of first mismatch within the block
        offset: usize,
        /// Expected value at `offset`
        expected: u8,
        /// Actual value at `offset`
        actual: u8,
        /// Total number of differing bytes
        differing: usize,
    },
}

impl VerificationResult {
    pub fn is_match(&self) -> bool {
        matches!(self, VerificationResult::Match)
    }
}

/// Compare `actual` against `expected` byte for byte
///
/// Slices of different lengths never match; the missing tail counts as
/// differing bytes.
pub fn verify_block(actual: &[u8], expected: &[u8]) -> VerificationResult {
    if actual == expected {
        return VerificationResult::Match;
    }

    let common = actual.len().min(expected.len());
    let first = actual[..common]
        .iter()
        .zip(&expected[..common])
        .position(|(a, e)| a != e);

    let differing = actual[..common]
        .iter()
        .zip(&expected[..common])
        .filter(|(a, e)| a != e)
        .count()
        + actual.len().abs_diff(expected.len());

    match first {
        Some(offset) => VerificationResult::Mismatch {
            offset,
            expected: expected[offset],
            actual: actual[offset],
            differing,
        },
        // Equal prefix, lengths differ
        None => VerificationResult::Mismatch {
            offset: common,
            expected: expected.get(common).copied().unwrap_or(0),
            actual: actual.get(common).copied().unwrap_or(0),
            differing,
        },
    }
}
