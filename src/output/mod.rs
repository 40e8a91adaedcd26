//! Run results: console summary and JSON report

pub mod json;
pub mod text;
