//! JSON run report
//!
//! Written at the end of a run when `--json-output` is given, so soak runs
//! driven by scripts can collect results without scraping the console.

use crate::engine::{CheckReport, WriteSummary};
use crate::pool::BLOCK_SIZE;
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Everything known about a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub device: PathBuf,
    pub threads: usize,
    pub block_size: usize,
    pub block_count: u64,
    pub started_at: String,
    pub finished_at: String,
    pub write: WriteSummary,
    pub check: CheckReport,
    /// Whether the check found no mismatching block
    pub clean: bool,
}

impl RunReport {
    pub fn new(
        device: &Path,
        threads: usize,
        block_count: u64,
        started_at: DateTime<Utc>,
        write: WriteSummary,
        check: CheckReport,
    ) -> Self {
        Self {
            device: device.to_path_buf(),
            threads,
            block_size: BLOCK_SIZE,
            block_count,
            started_at: started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            clean: check.is_clean(),
            write,
            check,
        }
    }
}

/// Write the report to `output_path`
pub fn write_json_output(output_path: &Path, report: &RunReport, pretty: bool) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create JSON output: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    if pretty {
        serde_json::to_writer_pretty(&mut writer, report)?;
    } else {
        serde_json::to_writer(&mut writer, report)?;
    }

    writer.flush()?;
    Ok(())
}
