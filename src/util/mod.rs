//! Shared helpers: block comparison and time formatting

pub mod time;
pub mod verification;
