// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Geometry mapper — converts OCR-image pixel coordinates (origin top-left,
// y down) into PDF point coordinates (origin bottom-left, y up) so recognised
// text lands over the glyphs it came from.

use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_core::{PageSize, PlacedSpan, TextSpan};

/// Smallest font size emitted for a text run, in points.
pub const MIN_FONT_SIZE: f64 = 1.0;
/// Largest font size emitted for a text run, in points.
pub const MAX_FONT_SIZE: f64 = 200.0;

/// Scale factors between one OCR coordinate space and one output page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryMapper {
    page: PageSize,
    ocr_width: f64,
    ocr_height: f64,
    sx: f64,
    sy: f64,
}

impl GeometryMapper {
    /// Build a mapper from OCR space `ocr_width x ocr_height` (pixels for span
    /// output, points for an engine-rendered PDF page) onto `page`.
    pub fn new(page: PageSize, ocr_width: f64, ocr_height: f64) -> Result<Self> {
        if !page.is_valid() {
            return Err(ScanlayerError::CompositeError(format!(
                "invalid target page size {}x{}",
                page.width, page.height
            )));
        }
        let ocr = PageSize::new(ocr_width, ocr_height);
        if !ocr.is_valid() {
            return Err(ScanlayerError::CompositeError(format!(
                "invalid OCR space {}x{}",
                ocr_width, ocr_height
            )));
        }
        Ok(Self {
            page,
            ocr_width,
            ocr_height,
            sx: page.width / ocr_width,
            sy: page.height / ocr_height,
        })
    }

    pub fn page(&self) -> PageSize {
        self.page
    }

    /// Horizontal scale factor (points per OCR unit).
    pub fn sx(&self) -> f64 {
        self.sx
    }

    /// Vertical scale factor (points per OCR unit).
    pub fn sy(&self) -> f64 {
        self.sy
    }

    /// The single factor applied to a whole engine-rendered page. Derived from
    /// the width so the page fills the output horizontally.
    pub fn uniform_scale(&self) -> f64 {
        self.sx
    }

    /// Map one span into page space.
    ///
    /// The box is clamped to the OCR image first, so the result always lies
    /// inside the page. Spans that end up with no area, or no visible text,
    /// return `None`.
    pub fn map_span(&self, span: &TextSpan) -> Option<PlacedSpan> {
        let text = span.text.trim();
        if text.is_empty() {
            return None;
        }
        let bbox = span.bbox.clamp_to(self.ocr_width, self.ocr_height)?;

        let x = bbox.left * self.sx;
        let width = (bbox.width * self.sx).min(self.page.width - x);
        let height = bbox.height * self.sy;
        // Bottom edge of the box, flipped into PDF's upward y axis.
        let y = (self.page.height - bbox.bottom() * self.sy).max(0.0);

        if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
            return None;
        }

        let font_size = if span.font_size.is_finite() && span.font_size > 0.0 {
            span.font_size * self.sy
        } else {
            height
        };

        Some(PlacedSpan {
            text: text.to_string(),
            x,
            y,
            width,
            height: height.min(self.page.height),
            font_size: font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanlayer_core::BoundingBox;

    fn a4_at_300dpi() -> GeometryMapper {
        let page = PageSize::a4();
        let (w, h) = page.pixel_dimensions(300);
        GeometryMapper::new(page, w as f64, h as f64).unwrap()
    }

    #[test]
    fn scale_factors_follow_dpi() {
        let mapper = a4_at_300dpi();
        assert!((mapper.sx() - 72.0 / 300.0).abs() < 1e-3);
        assert!((mapper.sy() - 72.0 / 300.0).abs() < 1e-3);
    }

    #[test]
    fn span_maps_to_bottom_left_baseline() {
        let mapper = GeometryMapper::new(PageSize::new(100.0, 200.0), 1000.0, 2000.0).unwrap();
        let span = TextSpan::new("Invoice", BoundingBox::new(100.0, 300.0, 400.0, 50.0), 50.0);
        let placed = mapper.map_span(&span).unwrap();

        assert_eq!(placed.text, "Invoice");
        assert!((placed.x - 10.0).abs() < 1e-9);
        assert!((placed.width - 40.0).abs() < 1e-9);
        assert!((placed.height - 5.0).abs() < 1e-9);
        // Box bottom at 350px -> 35pt from the top -> 165pt from the bottom.
        assert!((placed.y - 165.0).abs() < 1e-9);
        assert!((placed.font_size - 5.0).abs() < 1e-9);
    }

    #[test]
    fn font_size_is_clamped() {
        let mapper = GeometryMapper::new(PageSize::new(100.0, 100.0), 100.0, 100.0).unwrap();
        let huge = TextSpan::new("X", BoundingBox::new(0.0, 0.0, 10.0, 10.0), 5000.0);
        assert_eq!(mapper.map_span(&huge).unwrap().font_size, MAX_FONT_SIZE);

        let tiny = TextSpan::new("x", BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.01);
        assert_eq!(mapper.map_span(&tiny).unwrap().font_size, MIN_FONT_SIZE);
    }

    #[test]
    fn missing_font_size_falls_back_to_box_height() {
        let mapper = GeometryMapper::new(PageSize::new(100.0, 100.0), 200.0, 200.0).unwrap();
        let span = TextSpan::new("abc", BoundingBox::new(0.0, 0.0, 40.0, 24.0), f64::NAN);
        assert!((mapper.map_span(&span).unwrap().font_size - 12.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_spans_are_dropped() {
        let mapper = a4_at_300dpi();
        let zero_width = TextSpan::new("a", BoundingBox::new(10.0, 10.0, 0.0, 10.0), 10.0);
        let negative = TextSpan::new("a", BoundingBox::new(10.0, 10.0, 10.0, -3.0), 10.0);
        let outside = TextSpan::new("a", BoundingBox::new(9000.0, 10.0, 10.0, 10.0), 10.0);
        let blank = TextSpan::new("   ", BoundingBox::new(10.0, 10.0, 10.0, 10.0), 10.0);
        assert!(mapper.map_span(&zero_width).is_none());
        assert!(mapper.map_span(&negative).is_none());
        assert!(mapper.map_span(&outside).is_none());
        assert!(mapper.map_span(&blank).is_none());
    }

    #[test]
    fn mapped_spans_stay_inside_the_page() {
        let mapper = a4_at_300dpi();
        let page = mapper.page();
        let spans = [
            TextSpan::new("edge", BoundingBox::new(2400.0, 3450.0, 500.0, 500.0), 40.0),
            TextSpan::new("corner", BoundingBox::new(-50.0, -50.0, 100.0, 100.0), 40.0),
            TextSpan::new("full", BoundingBox::new(0.0, 0.0, 2479.0, 3508.0), 40.0),
        ];
        for span in &spans {
            let placed = mapper.map_span(span).unwrap();
            assert!(placed.width > 0.0 && placed.width <= page.width);
            assert!(placed.height > 0.0 && placed.height <= page.height);
            assert!(placed.x >= 0.0 && placed.x + placed.width <= page.width + 1e-9);
            assert!(placed.y >= 0.0 && placed.y + placed.height <= page.height + 1e-9);
        }
    }

    #[test]
    fn rejects_empty_spaces() {
        assert!(GeometryMapper::new(PageSize::new(0.0, 10.0), 10.0, 10.0).is_err());
        assert!(GeometryMapper::new(PageSize::a4(), 0.0, 10.0).is_err());
    }
}
