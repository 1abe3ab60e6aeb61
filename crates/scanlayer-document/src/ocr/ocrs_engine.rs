// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process OCR with the pure-Rust `ocrs` engine (neural models run by `rten`).
//
// # Feature Gate
//
// Only compiled with the `ocr` feature:
//
// ```toml
// scanlayer-document = { path = "crates/scanlayer-document", features = ["ocr"] }
// ```
//
// # Model Setup
//
// Two model files are required, `text-detection.rten` and
// `text-recognition.rten`. Running `ocrs-cli` once downloads them into
// `$XDG_CACHE_HOME/ocrs` (typically `~/.cache/ocrs`), which is the default
// lookup directory.
//
// The models recognise Latin script only and the engine produces spans, not
// PDFs, so it suits the recompose strategy with `eng`.

use std::path::{Path, PathBuf};

use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_core::{BoundingBox, DEFAULT_OCR_LANGUAGE, OcrFormat, OcrResult, TextSpan};
use tracing::{debug, info, instrument};

use super::Recognize;
use crate::raster::RasterImage;

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Where to load the two models from.
#[derive(Debug, Clone)]
pub struct OcrsModels {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
}

impl Default for OcrsModels {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrsModels {
    /// Expects `text-detection.rten` and `text-recognition.rten` in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for path in [&self.detection_model_path, &self.recognition_model_path] {
            if !path.exists() {
                return Err(ScanlayerError::EngineUnavailable(format!(
                    "OCR model not found at {}; run `ocrs-cli` once to download the models",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// `ocrs` behind the [`Recognize`] seam.
///
/// Loading the models is the expensive part; build one engine and share it
/// across workers.
pub struct OcrsEngine {
    engine: OcrEngine,
}

impl OcrsEngine {
    #[instrument(skip_all, fields(
        detection = %models.detection_model_path.display(),
        recognition = %models.recognition_model_path.display(),
    ))]
    pub fn new(models: OcrsModels) -> Result<Self> {
        models.validate()?;

        let load = |path: &Path| {
            Model::load_file(path).map_err(|err| {
                ScanlayerError::EngineUnavailable(format!(
                    "failed to load OCR model from {}: {}",
                    path.display(),
                    err
                ))
            })
        };
        info!("Loading OCR models");
        let detection_model = load(&models.detection_model_path)?;
        let recognition_model = load(&models.recognition_model_path)?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| ScanlayerError::EngineUnavailable(format!("failed to initialise ocrs: {}", err)))?;

        info!("ocrs engine ready");
        Ok(Self { engine })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(OcrsModels::default())
    }
}

impl Recognize for OcrsEngine {
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    fn recognize(&self, image: &RasterImage, language: &str, format: OcrFormat) -> Result<OcrResult> {
        if language
            .split('+')
            .any(|code| code.trim() != DEFAULT_OCR_LANGUAGE)
        {
            return Err(ScanlayerError::OcrLanguageUnsupported {
                language: language.to_string(),
                detail: "ocrs models only cover Latin script".into(),
            });
        }
        if format == OcrFormat::Pdf {
            return Err(ScanlayerError::OcrError(
                "ocrs cannot render PDF output; use the recompose strategy".into(),
            ));
        }

        let rgb = image.as_rgb();
        let (width, height) = rgb.dimensions();
        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            ScanlayerError::OcrError(format!("failed to create image source ({}x{}): {}", width, height, err))
        })?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| ScanlayerError::OcrError(format!("OCR preprocessing failed: {}", err)))?;

        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|err| ScanlayerError::OcrError(format!("word detection failed: {}", err)))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|err| ScanlayerError::OcrError(format!("line recognition failed: {}", err)))?;

        let mut spans = Vec::new();
        for line in lines.iter().flatten() {
            let line_height = line.rotated_rect().bounding_rect().height() as f64;
            for word in line.words() {
                let text = word.to_string();
                if text.trim().is_empty() {
                    continue;
                }
                let rect = word.rotated_rect().bounding_rect();
                spans.push(TextSpan::new(
                    text,
                    BoundingBox::new(
                        rect.left() as f64,
                        rect.top() as f64,
                        rect.width() as f64,
                        rect.height() as f64,
                    ),
                    line_height,
                ));
            }
        }
        debug!(spans = spans.len(), "ocrs recognition complete");
        Ok(OcrResult::Spans(spans))
    }
}
