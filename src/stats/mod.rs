//! Progress reporting
//!
//! The engine exposes its counters through `Engine::progress` and the shared
//! `BlockRegistry`; this module turns them into the live console line shown
//! during the write phase.

pub mod live;
