// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch runner — finds the PDFs in a directory and feeds them through the
// pipeline on a pool of workers.
//
// Jobs go into an mpsc queue; each worker pulls one, runs it on the blocking
// thread pool (the pipeline is synchronous and CPU/process bound) and sends
// the outcome back. Workers share nothing but the read-only `Pipeline`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use scanlayer_core::error::Result;
use scanlayer_core::{DocumentReport, OutputMode};
use scanlayer_document::SourceDocument;
use scanlayer_document::detect::is_document_searchable;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::naming::{is_pdf, is_processed_name, output_path_for, split_page_path};
use crate::pipeline::Pipeline;

/// One document to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub input: PathBuf,
    /// Merged output path (split files are derived from it).
    pub output: PathBuf,
}

/// Why a document was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Output from an earlier run is already there.
    OutputExists,
    /// The input has enough text already.
    AlreadySearchable,
}

/// What happened to one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum JobOutcome {
    Processed {
        report: DocumentReport,
        deleted_original: bool,
    },
    Skipped {
        input: PathBuf,
        reason: SkipReason,
    },
}

impl JobOutcome {
    pub fn input(&self) -> &Path {
        match self {
            Self::Processed { report, .. } => &report.input,
            Self::Skipped { input, .. } => input,
        }
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub already_searchable: usize,
    pub skipped_existing: usize,
    pub failed: usize,
    pub deleted_originals: usize,
    pub workers: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
    /// Per-document outcomes, ordered by input path.
    pub outcomes: Vec<JobOutcome>,
}

impl BatchSummary {
    fn record(&mut self, outcome: JobOutcome) {
        match &outcome {
            JobOutcome::Processed {
                report,
                deleted_original,
            } => {
                if report.success {
                    self.processed += 1;
                } else {
                    self.failed += 1;
                }
                if *deleted_original {
                    self.deleted_originals += 1;
                }
            }
            JobOutcome::Skipped { reason, .. } => match reason {
                SkipReason::OutputExists => self.skipped_existing += 1,
                SkipReason::AlreadySearchable => self.already_searchable += 1,
            },
        }
        self.outcomes.push(outcome);
    }

    /// Reports of documents that ran and failed.
    pub fn failures(&self) -> impl Iterator<Item = &DocumentReport> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            JobOutcome::Processed { report, .. } if !report.success => Some(report),
            _ => None,
        })
    }
}

/// Candidate inputs in `dir`, sorted by name: `.pdf` files (any case) whose
/// name does not carry the processed `suffix`.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn scan_directory(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_pdf(&path) && !is_processed_name(&path, suffix) {
            inputs.push(path);
        }
    }
    inputs.sort();
    info!(found = inputs.len(), "Directory scanned");
    Ok(inputs)
}

/// Pair every input with its output path.
pub fn plan_jobs(inputs: Vec<PathBuf>, suffix: &str) -> Vec<BatchJob> {
    inputs
        .into_iter()
        .map(|input| BatchJob {
            output: output_path_for(&input, suffix),
            input,
        })
        .collect()
}

/// Pre-flight checks, run by the worker before any real work.
///
/// Merged mode skips when the output exists; split mode when the first page
/// file does, named for the document's real page count. An input that cannot
/// be opened is never skipped, so the pipeline reports its failure.
pub fn check_job(pipeline: &Pipeline, job: &BatchJob) -> Option<SkipReason> {
    let config = pipeline.config();
    if config.output_mode == OutputMode::Merged && job.output.exists() {
        return Some(SkipReason::OutputExists);
    }

    let source = match SourceDocument::open(&job.input) {
        Ok(source) => source,
        Err(err) => {
            warn!(input = %job.input.display(), %err, "Could not inspect PDF, treating as not searchable");
            return None;
        }
    };
    if config.output_mode == OutputMode::Split
        && split_page_path(&job.output, 1, source.page_count()).exists()
    {
        return Some(SkipReason::OutputExists);
    }
    if is_document_searchable(&source, config.detection_mode) {
        return Some(SkipReason::AlreadySearchable);
    }
    None
}

/// Run one job to completion on the calling thread.
pub fn run_job(pipeline: &Pipeline, job: &BatchJob) -> JobOutcome {
    if let Some(reason) = check_job(pipeline, job) {
        info!(input = %job.input.display(), ?reason, "Skipping document");
        return JobOutcome::Skipped {
            input: job.input.clone(),
            reason,
        };
    }

    let report = pipeline.process_document(&job.input, &job.output);
    let deleted_original =
        report.success && pipeline.config().delete_originals && delete_original(&report);
    JobOutcome::Processed {
        report,
        deleted_original,
    }
}

/// Remove the input of a successful document, only if it is still there and
/// every output it produced exists. Failures are logged, never fatal.
fn delete_original(report: &DocumentReport) -> bool {
    if report.outputs.is_empty() || !report.outputs.iter().all(|path| path.exists()) {
        warn!(input = %report.input.display(), "Outputs missing, keeping original");
        return false;
    }
    if !report.input.exists() {
        return false;
    }
    match std::fs::remove_file(&report.input) {
        Ok(()) => {
            info!(input = %report.input.display(), "Original deleted");
            true
        }
        Err(err) => {
            warn!(input = %report.input.display(), %err, "Could not delete original");
            false
        }
    }
}

/// Number of workers for `pending` jobs.
pub fn worker_count(pending: usize, max_workers: Option<usize>) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let cap = max_workers.unwrap_or(cores).max(1);
    cores.min(pending).min(cap)
}

/// Process every job, at most `worker_count` at a time.
#[instrument(skip_all, fields(jobs = jobs.len()))]
pub async fn run_batch(pipeline: Arc<Pipeline>, jobs: Vec<BatchJob>) -> BatchSummary {
    let started = Instant::now();
    let mut summary = BatchSummary {
        started_at: Some(Utc::now()),
        ..BatchSummary::default()
    };
    if jobs.is_empty() {
        return summary;
    }

    let workers = worker_count(jobs.len(), pipeline.config().max_workers);
    summary.workers = workers;
    info!(workers, "Starting workers");

    let (job_tx, job_rx) = mpsc::channel::<BatchJob>(jobs.len());
    for job in jobs {
        // Capacity equals the job count, so this never waits.
        if job_tx.send(job).await.is_err() {
            break;
        }
    }
    drop(job_tx);

    let job_rx = Arc::new(Mutex::new(job_rx));
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<JobOutcome>();

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let job_rx = Arc::clone(&job_rx);
        let outcome_tx = outcome_tx.clone();
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            loop {
                let next = job_rx.lock().await.recv().await;
                let Some(job) = next else {
                    break;
                };
                debug!(worker, input = %job.input.display(), "Job picked up");

                let input = job.input.clone();
                let pipeline = Arc::clone(&pipeline);
                let outcome = match tokio::task::spawn_blocking(move || run_job(&pipeline, &job)).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(worker, %err, "Worker task aborted");
                        let mut report = DocumentReport::started(input);
                        report.error = Some(format!("worker aborted: {}", err));
                        JobOutcome::Processed {
                            report,
                            deleted_original: false,
                        }
                    }
                };
                if outcome_tx.send(outcome).is_err() {
                    break;
                }
            }
        }));
    }
    drop(outcome_tx);

    while let Some(outcome) = outcome_rx.recv().await {
        summary.record(outcome);
    }
    for handle in handles {
        if let Err(err) = handle.await {
            warn!(%err, "Worker ended abnormally");
        }
    }

    summary.outcomes.sort_by(|a, b| a.input().cmp(b.input()));
    summary.elapsed = started.elapsed();
    info!(
        processed = summary.processed,
        already_searchable = summary.already_searchable,
        skipped_existing = summary.skipped_existing,
        failed = summary.failed,
        deleted_originals = summary.deleted_originals,
        "Batch complete"
    );
    summary
}
