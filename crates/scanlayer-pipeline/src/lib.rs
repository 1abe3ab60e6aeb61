// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanlayer pipeline — per-document orchestration and the batch runner.

pub mod batch;
pub mod naming;
pub mod pipeline;
pub mod report;

pub use batch::{BatchJob, BatchSummary, JobOutcome, SkipReason, plan_jobs, run_batch, scan_directory};
pub use pipeline::Pipeline;
