// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable rendering of batch results.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use crate::batch::{BatchSummary, JobOutcome, SkipReason};

/// `850ms`, `12.3s` or `3m 25s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let total = secs.round() as u64;
        format!("{}m {}s", total / 60, total % 60)
    }
}

/// Byte count in binary units with one decimal, e.g. `1.5 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|meta| meta.len())
}

fn name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// One line per document followed by the totals.
pub fn render_summary(summary: &BatchSummary) -> String {
    let mut out = String::new();
    for outcome in &summary.outcomes {
        let _ = match outcome {
            JobOutcome::Processed { report, deleted_original } if report.success => {
                let size: u64 = report.outputs.iter().filter_map(|path| file_size(path)).sum();
                let mut line = format!(
                    "  ok      {}  {} page(s) in {}, {}",
                    name(&report.input),
                    report.pages,
                    format_duration(report.elapsed),
                    format_size(size)
                );
                if !report.fallback_pages.is_empty() {
                    let _ = write!(line, ", fallback on {:?}", report.fallback_pages);
                }
                if *deleted_original {
                    line.push_str(", original deleted");
                }
                writeln!(out, "{}", line)
            }
            JobOutcome::Processed { report, .. } => writeln!(
                out,
                "  failed  {}  {}",
                name(&report.input),
                report.error.as_deref().unwrap_or("unknown error")
            ),
            JobOutcome::Skipped { input, reason } => {
                let why = match reason {
                    SkipReason::OutputExists => "output exists",
                    SkipReason::AlreadySearchable => "already searchable",
                };
                writeln!(out, "  skipped {}  {}", name(input), why)
            }
        };
    }
    let _ = writeln!(
        out,
        "Processed {}, already searchable {}, skipped {}, failed {}, originals deleted {} ({} worker(s), {})",
        summary.processed,
        summary.already_searchable,
        summary.skipped_existing,
        summary.failed,
        summary.deleted_originals,
        summary.workers,
        format_duration(summary.elapsed)
    );
    out
}
