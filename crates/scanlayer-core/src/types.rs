// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanlayer OCR pipeline.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// PDF user-space units per inch.
pub const POINTS_PER_INCH: f64 = 72.0;

/// A document whose trimmed extractable text is longer than this many
/// characters is considered searchable.
pub const SEARCHABLE_TEXT_THRESHOLD: usize = 50;

/// Language used when the requested OCR language pack is unavailable.
pub const DEFAULT_OCR_LANGUAGE: &str = "eng";

/// Size of a page as a viewer displays it, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// ISO A4 (210 x 297 mm) in points.
    pub fn a4() -> Self {
        Self::new(595.0, 842.0)
    }

    /// Both dimensions finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// Pixel dimensions of a raster of this page at `dpi`.
    ///
    /// Never returns a zero dimension.
    pub fn pixel_dimensions(&self, dpi: u32) -> (u32, u32) {
        let scale = dpi as f64 / POINTS_PER_INCH;
        let width = (self.width * scale).round().max(1.0) as u32;
        let height = (self.height * scale).round().max(1.0) as u32;
        (width, height)
    }
}

/// Axis-aligned rectangle in OCR-image pixel space (origin top-left, y down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Intersect with the `[0, width] x [0, height]` image area.
    ///
    /// Returns `None` when nothing of positive area remains or any coordinate
    /// is not finite.
    pub fn clamp_to(&self, width: f64, height: f64) -> Option<Self> {
        if ![self.left, self.top, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
        {
            return None;
        }
        let left = self.left.clamp(0.0, width);
        let top = self.top.clamp(0.0, height);
        let right = self.right().clamp(0.0, width);
        let bottom = self.bottom().clamp(0.0, height);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Self::new(left, top, right - left, bottom - top))
    }
}

/// A recognised run of text in OCR-image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub bbox: BoundingBox,
    /// Font size in pixels, as reported (or estimated) by the OCR engine.
    pub font_size: f64,
}

impl TextSpan {
    pub fn new(text: impl Into<String>, bbox: BoundingBox, font_size: f64) -> Self {
        Self {
            text: text.into(),
            bbox,
            font_size,
        }
    }
}

/// A text run mapped into page point space (origin bottom-left, y up).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedSpan {
    pub text: String,
    /// Left edge of the run.
    pub x: f64,
    /// Baseline, taken as the bottom edge of the mapped box.
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
}

/// What the OCR engine handed back for one page image.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrResult {
    /// A complete one-page PDF rendered by the engine (image + text in place).
    Pdf(Vec<u8>),
    /// Positioned text runs in the coordinate space of the input image.
    Spans(Vec<TextSpan>),
}

impl OcrResult {
    pub fn format(&self) -> OcrFormat {
        match self {
            Self::Pdf(_) => OcrFormat::Pdf,
            Self::Spans(_) => OcrFormat::Spans,
        }
    }
}

/// Output shape requested from the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OcrFormat {
    Pdf,
    Spans,
}

/// How output pages are built from the OCR result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositionStrategy {
    /// Insert the engine's own one-page PDF, rescaled to the original size.
    PassThrough,
    /// Rebuild the page: JPEG background plus an invisible text overlay.
    #[default]
    RecomposeOptimized,
}

impl CompositionStrategy {
    /// The OCR output this strategy consumes.
    pub fn ocr_format(&self) -> OcrFormat {
        match self {
            Self::PassThrough => OcrFormat::Pdf,
            Self::RecomposeOptimized => OcrFormat::Spans,
        }
    }
}

/// One output file per document, or one per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    #[default]
    Merged,
    Split,
}

/// How much of a document the searchability detector reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMode {
    /// Stop as soon as enough text has been seen.
    #[default]
    EarlyStop,
    /// Extract text from every page.
    Exhaustive,
}

/// Outcome of running the pipeline over one source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub input: PathBuf,
    pub success: bool,
    /// Files committed for this document (empty on failure).
    pub outputs: Vec<PathBuf>,
    pub pages: usize,
    /// 1-based numbers of pages recognised with the fallback language.
    pub fallback_pages: Vec<u32>,
    /// Text runs dropped during composition (degenerate geometry, bad glyphs).
    pub skipped_spans: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl DocumentReport {
    /// A report for a document that has not produced anything yet.
    pub fn started(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            success: false,
            outputs: Vec::new(),
            pages: 0,
            fallback_pages: Vec::new(),
            skipped_spans: 0,
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_pixel_dimensions_at_300_dpi() {
        let (w, h) = PageSize::a4().pixel_dimensions(300);
        assert_eq!((w, h), (2479, 3508));
    }

    #[test]
    fn pixel_dimensions_never_zero() {
        let tiny = PageSize::new(0.1, 0.1);
        assert_eq!(tiny.pixel_dimensions(72), (1, 1));
    }

    #[test]
    fn invalid_page_sizes() {
        assert!(!PageSize::new(0.0, 10.0).is_valid());
        assert!(!PageSize::new(f64::NAN, 10.0).is_valid());
        assert!(PageSize::new(612.0, 792.0).is_valid());
    }

    #[test]
    fn clamp_keeps_inner_box() {
        let bbox = BoundingBox::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(bbox.clamp_to(100.0, 100.0), Some(bbox));
    }

    #[test]
    fn clamp_trims_overhang() {
        let bbox = BoundingBox::new(-5.0, 90.0, 20.0, 20.0);
        let clamped = bbox.clamp_to(100.0, 100.0).expect("partially visible");
        assert_eq!(clamped, BoundingBox::new(0.0, 90.0, 15.0, 10.0));
    }

    #[test]
    fn clamp_drops_degenerate_boxes() {
        assert!(BoundingBox::new(10.0, 10.0, 0.0, 5.0).clamp_to(100.0, 100.0).is_none());
        assert!(BoundingBox::new(10.0, 10.0, 5.0, -5.0).clamp_to(100.0, 100.0).is_none());
        assert!(BoundingBox::new(150.0, 10.0, 5.0, 5.0).clamp_to(100.0, 100.0).is_none());
        assert!(BoundingBox::new(f64::INFINITY, 0.0, 5.0, 5.0).clamp_to(100.0, 100.0).is_none());
    }

    #[test]
    fn strategy_selects_ocr_format() {
        assert_eq!(CompositionStrategy::PassThrough.ocr_format(), OcrFormat::Pdf);
        assert_eq!(
            CompositionStrategy::RecomposeOptimized.ocr_format(),
            OcrFormat::Spans
        );
    }

    #[test]
    fn strategy_serde_names() {
        let json = serde_json::to_string(&CompositionStrategy::RecomposeOptimized).unwrap();
        assert_eq!(json, "\"recompose-optimized\"");
        let parsed: CompositionStrategy = serde_json::from_str("\"pass-through\"").unwrap();
        assert_eq!(parsed, CompositionStrategy::PassThrough);
    }
}
