// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR module — the engine seam, the tesseract CLI engine, TSV parsing, and the
// optional in-process `ocrs` engine. `OcrInvoker` adds the one-shot fallback
// to the default language when a language pack is missing.

#[cfg(feature = "ocr")]
pub mod ocrs_engine;
pub mod tesseract;
pub mod tsv;

use std::sync::Arc;

use scanlayer_core::error::Result;
use scanlayer_core::{OcrFormat, OcrResult};
use tracing::{instrument, warn};

use crate::raster::RasterImage;

pub use tesseract::TesseractEngine;

/// An OCR engine.
///
/// Must report a missing or unsupported language as
/// [`ScanlayerError::OcrLanguageUnsupported`](scanlayer_core::ScanlayerError::OcrLanguageUnsupported)
/// so the invoker can retry with the fallback.
pub trait Recognize: Send + Sync {
    fn recognize(&self, image: &RasterImage, language: &str, format: OcrFormat) -> Result<OcrResult>;
}

/// A successful recognition and the language that produced it.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub result: OcrResult,
    pub language: String,
    /// True when the requested language failed and the fallback was used.
    pub fell_back: bool,
}

/// Runs an engine with at most one retry in the fallback language.
#[derive(Clone)]
pub struct OcrInvoker {
    engine: Arc<dyn Recognize>,
    fallback_language: String,
}

impl OcrInvoker {
    pub fn new(engine: Arc<dyn Recognize>, fallback_language: impl Into<String>) -> Self {
        Self {
            engine,
            fallback_language: fallback_language.into(),
        }
    }

    pub fn fallback_language(&self) -> &str {
        &self.fallback_language
    }

    /// Recognise `image` in `language`.
    ///
    /// Only a language error triggers the retry, and only when `language` is
    /// not already the fallback. Whatever the retry returns is final.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn invoke(&self, image: &RasterImage, language: &str, format: OcrFormat) -> Result<Recognition> {
        match self.engine.recognize(image, language, format) {
            Ok(result) => Ok(Recognition {
                result,
                language: language.to_string(),
                fell_back: false,
            }),
            Err(err) if err.is_language_error() && language != self.fallback_language => {
                warn!(
                    %err,
                    fallback = %self.fallback_language,
                    "OCR language unavailable, retrying with fallback"
                );
                let result = self.engine.recognize(image, &self.fallback_language, format)?;
                Ok(Recognition {
                    result,
                    language: self.fallback_language.clone(),
                    fell_back: true,
                })
            }
            Err(err) => Err(err),
        }
    }
}
