// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanlayer — makes every scanned PDF in a directory searchable.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use scanlayer_core::error::Result;
use scanlayer_core::{CompositionStrategy, DetectionMode, OutputMode, PipelineConfig};
use scanlayer_pipeline::report::render_summary;
use scanlayer_pipeline::{Pipeline, plan_jobs, run_batch, scan_directory};

#[derive(Parser, Debug)]
#[command(name = "scanlayer")]
#[command(version)]
#[command(about = "Add an invisible OCR text layer to scanned PDFs", long_about = None)]
struct Cli {
    /// Directory holding the PDFs to process
    #[arg(value_name = "DIR")]
    dir: PathBuf,

    /// JSON configuration file; flags override its values
    #[arg(short, long, value_name = "FILE", env = "SCANLAYER_CONFIG")]
    config: Option<PathBuf>,

    /// Write one file per page instead of a single output
    #[arg(long)]
    split: bool,

    /// Delete each original after its output is committed
    #[arg(long)]
    delete_originals: bool,

    /// How pages are rebuilt
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Rasterization resolution for OCR
    #[arg(long)]
    dpi: Option<u32>,

    /// OCR language, e.g. "eng+deu" (default: best installed)
    #[arg(short, long)]
    lang: Option<String>,

    /// Maximum number of documents processed at once
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Check every page for text instead of stopping at the first hit
    #[arg(long)]
    exhaustive_detection: bool,

    /// Print the batch summary as JSON
    #[arg(long)]
    json: bool,

    /// Recognise with the built-in ocrs models from this directory
    #[cfg(feature = "ocr")]
    #[arg(long, value_name = "DIR")]
    ocrs_models: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    /// Keep the original page content, add only the text layer
    PassThrough,
    /// Re-encode the page as a JPEG with the text layer on top
    Recompose,
}

impl From<StrategyArg> for CompositionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::PassThrough => CompositionStrategy::PassThrough,
            StrategyArg::Recompose => CompositionStrategy::RecomposeOptimized,
        }
    }
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if self.split {
            config.output_mode = OutputMode::Split;
        }
        if self.delete_originals {
            config.delete_originals = true;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy.into();
        }
        if let Some(dpi) = self.dpi {
            config.ocr_dpi = dpi;
        }
        if let Some(lang) = &self.lang {
            config.language = Some(lang.clone());
        }
        if let Some(jobs) = self.jobs {
            config.max_workers = Some(jobs);
        }
        if self.exhaustive_detection {
            config.detection_mode = DetectionMode::Exhaustive;
        }
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "ocr")]
    fn build_pipeline(&self, config: PipelineConfig) -> Result<Pipeline> {
        match &self.ocrs_models {
            Some(models) => Pipeline::with_ocrs_engine(config, Some(models.as_path())),
            None => Pipeline::with_system_engines(config),
        }
    }

    #[cfg(not(feature = "ocr"))]
    fn build_pipeline(&self, config: PipelineConfig) -> Result<Pipeline> {
        Pipeline::with_system_engines(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::info!(dir = %cli.dir.display(), "Scanlayer starting");

    let config = match cli.pipeline_config() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "Invalid configuration");
            return ExitCode::from(2);
        }
    };
    let suffix = config.output_suffix.clone();

    let pipeline = match cli.build_pipeline(config) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(err) => {
            tracing::error!(%err, "OCR environment is not usable");
            return ExitCode::from(2);
        }
    };
    tracing::info!(language = pipeline.language(), "OCR engine ready");

    let inputs = match scan_directory(&cli.dir, &suffix) {
        Ok(inputs) => inputs,
        Err(err) => {
            tracing::error!(%err, "Cannot read input directory");
            return ExitCode::from(2);
        }
    };

    let summary = run_batch(pipeline, plan_jobs(inputs, &suffix)).await;

    if cli.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(err) => tracing::error!(%err, "Could not serialise summary"),
        }
    } else {
        print!("{}", render_summary(&summary));
    }

    if summary.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
