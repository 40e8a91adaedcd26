//! Human-readable text output

use crate::engine::{CheckReport, WriteSummary};
use crate::util::time::{calculate_iops, format_duration, format_rate};

/// Summary of the write phase
pub fn format_write_summary(summary: &WriteSummary) -> String {
    let faulted = summary
        .writers
        .iter()
        .filter(|w| w.reason.is_device_fault())
        .count();

    format!(
        "Write phase: {} writes to {} distinct blocks in {} ({} IOPS), {} of {} writers stopped by device faults",
        summary.writes,
        summary.distinct_blocks,
        format_duration(summary.elapsed),
        format_rate(calculate_iops(summary.writes, summary.elapsed)),
        faulted,
        summary.writers.len()
    )
}

/// Summary of the check phase
///
/// Ends with the total error count; zero means a clean run.
pub fn format_check_summary(report: &CheckReport) -> String {
    let mut out = format!(
        "Checked {} blocks in {}\n",
        report.checked,
        format_duration(report.elapsed)
    );

    for mismatch in &report.mismatches {
        out.push_str(&format!(
            "  block {:>10}: {} bytes differ from offset {} (payload {})\n",
            mismatch.address, mismatch.differing_bytes, mismatch.first_difference, mismatch.id
        ));
    }

    out.push_str(&format!("Total of errored blocks: {}", report.mismatch_count()));
    out
}

/// Print both summaries to stdout
pub fn print_results(write: &WriteSummary, check: &CheckReport) {
    println!();
    println!("{}", format_write_summary(write));
    println!("{}", format_check_summary(check));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Mismatch;
    use crate::pool::{RandomPool, BLOCK_SIZE};
    use crate::worker::{ExitReason, WriterExit};
    use std::time::Duration;

    #[test]
    fn test_write_summary() {
        let summary = WriteSummary {
            writes: 2000,
            distinct_blocks: 1500,
            writers: vec![
                WriterExit { writer: 0, writes: 1000, reason: ExitReason::ShortWrite { written: 0 } },
                WriterExit { writer: 1, writes: 1000, reason: ExitReason::Stopped },
            ],
            elapsed: Duration::from_secs(2),
        };

        let line = format_write_summary(&summary);
        assert!(line.contains("2000 writes to 1500 distinct blocks"));
        assert!(line.contains("(1.00K IOPS)"));
        assert!(line.contains("1 of 2 writers"));
    }

    #[test]
    fn test_check_summary_lists_mismatches() {
        let pool =
            RandomPool::with_size(std::io::Cursor::new(vec![0u8; BLOCK_SIZE * 2]), BLOCK_SIZE * 2)
                .unwrap();
        let report = CheckReport {
            checked: 5,
            mismatches: vec![Mismatch {
                address: 77,
                id: pool.issue().0,
                first_difference: 2048,
                differing_bytes: 2048,
            }],
            elapsed: Duration::from_millis(3),
        };

        let text = format_check_summary(&report);
        assert!(text.starts_with("Checked 5 blocks"));
        assert!(text.contains("block         77: 2048 bytes differ from offset 2048"));
        assert!(text.ends_with("Total of errored blocks: 1"));
    }

    #[test]
    fn test_clean_check_summary() {
        let report = CheckReport {
            checked: 0,
            mismatches: vec![],
            elapsed: Duration::ZERO,
        };
        assert!(format_check_summary(&report).ends_with("Total of errored blocks: 0"));
    }
}
