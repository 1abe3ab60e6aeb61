// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanlayer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for all Scanlayer operations.
#[derive(Debug, Error)]
pub enum ScanlayerError {
    // -- Document errors --
    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("page rasterization failed: {0}")]
    RasterError(String),

    // -- Recognition errors --
    #[error("OCR failed: {0}")]
    OcrError(String),

    #[error("OCR language '{language}' is not available: {detail}")]
    OcrLanguageUnsupported { language: String, detail: String },

    // -- Composition errors --
    #[error("page composition failed: {0}")]
    CompositeError(String),

    // -- Environment / configuration --
    #[error("required engine not available: {0}")]
    EngineUnavailable(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Where in the pipeline an error belongs, used for recovery decisions and
/// reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Source could not be inspected. Never fatal: the file is treated as
    /// not searchable.
    Detection,
    /// The OCR engine failed. Recovered once via the fallback language.
    Recognition,
    /// A single text run could not be placed. Recovered by skipping it.
    Composite,
    /// Unrecovered failure for a whole document.
    Document,
    /// Missing engine or broken configuration. Fatal at startup.
    Environment,
}

impl ScanlayerError {
    /// Classify this error for recovery and reporting.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::OcrError(_) | Self::OcrLanguageUnsupported { .. } => ErrorClass::Recognition,
            Self::CompositeError(_) => ErrorClass::Composite,
            Self::EngineUnavailable(_) | Self::Config(_) => ErrorClass::Environment,
            Self::PdfError(_)
            | Self::ImageError(_)
            | Self::RasterError(_)
            | Self::Io(_)
            | Self::Serialization(_) => ErrorClass::Document,
        }
    }

    /// Whether the OCR engine rejected the requested language (missing or
    /// unsupported language pack).
    pub fn is_language_error(&self) -> bool {
        matches!(self, Self::OcrLanguageUnsupported { .. })
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_error_is_recognition_class() {
        let err = ScanlayerError::OcrLanguageUnsupported {
            language: "deu".into(),
            detail: "Failed loading language 'deu'".into(),
        };
        assert!(err.is_language_error());
        assert_eq!(err.class(), ErrorClass::Recognition);
    }

    #[test]
    fn generic_ocr_error_is_not_language_error() {
        let err = ScanlayerError::OcrError("engine crashed".into());
        assert!(!err.is_language_error());
        assert_eq!(err.class(), ErrorClass::Recognition);
    }

    #[test]
    fn missing_engine_is_environment_class() {
        let err = ScanlayerError::EngineUnavailable("tesseract".into());
        assert_eq!(err.class(), ErrorClass::Environment);
    }

    #[test]
    fn io_error_is_document_class() {
        let err = ScanlayerError::from(std::io::Error::other("disk full"));
        assert_eq!(err.class(), ErrorClass::Document);
    }
}
