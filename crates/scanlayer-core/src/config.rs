// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{Result, ScanlayerError};
use crate::types::{CompositionStrategy, DEFAULT_OCR_LANGUAGE, DetectionMode, OutputMode};

/// Settings for one pipeline run. Every field has a default, so a JSON file
/// only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rasterization resolution handed to the OCR engine.
    pub ocr_dpi: u32,
    /// OCR language hint, e.g. `eng+deu`. `None` means "pick the best
    /// installed combination".
    pub language: Option<String>,
    /// Language retried once when the requested one is unavailable.
    pub fallback_language: String,
    pub strategy: CompositionStrategy,
    pub output_mode: OutputMode,
    /// JPEG quality (1-100) of recomposed page backgrounds.
    pub jpeg_quality: u8,
    /// Appended to the input stem to name outputs; inputs containing it are
    /// never picked up again.
    pub output_suffix: String,
    pub detection_mode: DetectionMode,
    /// Reuse a page's single embedded image instead of re-rendering it.
    pub use_embedded_images: bool,
    /// Upper bound on concurrent documents. `None` uses every core.
    pub max_workers: Option<usize>,
    /// Remove an input once its output has been committed.
    pub delete_originals: bool,
    /// Explicit `tesseract` binary.
    pub tesseract_cmd: Option<PathBuf>,
    /// Explicit `pdftoppm` binary.
    pub pdftoppm_cmd: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ocr_dpi: 300,
            language: None,
            fallback_language: DEFAULT_OCR_LANGUAGE.to_string(),
            strategy: CompositionStrategy::default(),
            output_mode: OutputMode::default(),
            jpeg_quality: 75,
            output_suffix: "_searchable".to_string(),
            detection_mode: DetectionMode::default(),
            use_embedded_images: true,
            max_workers: None,
            delete_originals: false,
            tesseract_cmd: None,
            pdftoppm_cmd: None,
        }
    }
}

impl PipelineConfig {
    /// Smallest accepted rasterization DPI.
    pub const MIN_DPI: u32 = 36;
    /// Largest accepted rasterization DPI.
    pub const MAX_DPI: u32 = 1200;

    /// Load a configuration from a JSON file and validate it.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        info!("Configuration loaded");
        debug!(?config);
        Ok(config)
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(Self::MIN_DPI..=Self::MAX_DPI).contains(&self.ocr_dpi) {
            return Err(ScanlayerError::Config(format!(
                "ocr_dpi must be between {} and {}, got {}",
                Self::MIN_DPI,
                Self::MAX_DPI,
                self.ocr_dpi
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ScanlayerError::Config(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }
        if self.output_suffix.trim().is_empty() {
            return Err(ScanlayerError::Config(
                "output_suffix must not be empty".to_string(),
            ));
        }
        if self.fallback_language.trim().is_empty() {
            return Err(ScanlayerError::Config(
                "fallback_language must not be empty".to_string(),
            ));
        }
        if self.language.as_deref().is_some_and(|l| l.trim().is_empty()) {
            return Err(ScanlayerError::Config(
                "language must not be empty when set".to_string(),
            ));
        }
        if self.max_workers == Some(0) {
            return Err(ScanlayerError::Config(
                "max_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The language hint to use, falling back to `fallback_language` when
    /// none was configured or detected.
    pub fn effective_language(&self) -> &str {
        self.language
            .as_deref()
            .unwrap_or(self.fallback_language.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ocr_dpi, 300);
        assert_eq!(config.output_suffix, "_searchable");
        assert_eq!(config.effective_language(), "eng");
    }

    #[test]
    fn rejects_out_of_range_dpi() {
        let config = PipelineConfig {
            ocr_dpi: 10,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ScanlayerError::Config(_))));
    }

    #[test]
    fn rejects_zero_quality_and_workers() {
        let config = PipelineConfig {
            jpeg_quality: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            max_workers: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanlayer.json");
        std::fs::write(
            &path,
            r#"{ "ocr_dpi": 200, "strategy": "pass-through", "output_mode": "split" }"#,
        )
        .unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.ocr_dpi, 200);
        assert_eq!(config.strategy, CompositionStrategy::PassThrough);
        assert_eq!(config.output_mode, OutputMode::Split);
        assert_eq!(config.jpeg_quality, 75);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "jpeg_quality": 150 }"#).unwrap();
        assert!(PipelineConfig::load(&path).is_err());
    }
}
