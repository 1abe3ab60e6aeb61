// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page compositor — turns one page's raster and OCR result into an output page.
//
// Two strategies:
//
// - **PassThrough** keeps the engine's own one-page PDF (its image plus its
//   text layer) and rescales it onto the original page size.
// - **RecomposeOptimized** rebuilds the page from scratch: the raster as a
//   JPEG background and every OCR span as invisible text (render mode 3)
//   positioned over the glyphs it was read from.

use lopdf::{Document, ObjectId};
use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_core::{CompositionStrategy, OcrResult, PageSize, PipelineConfig, PlacedSpan, TextSpan};
use tracing::{debug, instrument, warn};

use crate::geometry::GeometryMapper;
use crate::image::processor::ImageProcessor;
use crate::pdf::reader::{PageInfo, inherited_attribute, rectangle};
use crate::raster::RasterImage;

/// Average Helvetica glyph advance as a fraction of the font size.
pub const AVERAGE_GLYPH_WIDTH: f64 = 0.5;
/// Bounds for the horizontal stretch (`Tz`) of an invisible run, in percent.
pub const MIN_HORIZONTAL_SCALE: f64 = 10.0;
pub const MAX_HORIZONTAL_SCALE: f64 = 1000.0;

/// A finished page, ready for [`OutputDocument::add_page`](crate::pdf::writer::OutputDocument::add_page).
#[derive(Debug)]
pub enum ComposedPage {
    PassThrough(ImportedPage),
    Recomposed(OutputPage),
}

impl ComposedPage {
    pub fn size(&self) -> PageSize {
        match self {
            Self::PassThrough(page) => page.size,
            Self::Recomposed(page) => page.size,
        }
    }

    /// Spans dropped while composing (always 0 for pass-through).
    pub fn skipped_spans(&self) -> usize {
        match self {
            Self::PassThrough(_) => 0,
            Self::Recomposed(page) => page.skipped_spans,
        }
    }
}

/// The engine's page, to be copied into the output with a uniform scale.
#[derive(Debug)]
pub struct ImportedPage {
    pub document: Document,
    pub page_id: ObjectId,
    /// The engine page's own `[x0, y0, x1, y1]`.
    pub media_box: [f64; 4],
    /// Points of output per point of engine page.
    pub scale: f64,
    /// Original page size, which the output page takes.
    pub size: PageSize,
}

/// JPEG-encoded page raster.
#[derive(Debug, Clone)]
pub struct JpegBackground {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// One invisible text run, already encoded for the output font.
#[derive(Debug, Clone, PartialEq)]
pub struct InvisibleRun {
    pub span: PlacedSpan,
    /// WinAnsi bytes for the `Tj` operand.
    pub encoded: Vec<u8>,
    /// `Tz` percentage that stretches the run to the span's width.
    pub horizontal_scale: f64,
}

/// A rebuilt page: background image plus invisible text layer.
#[derive(Debug, Clone)]
pub struct OutputPage {
    pub size: PageSize,
    pub background: JpegBackground,
    pub text_layer: Vec<InvisibleRun>,
    pub skipped_spans: usize,
}

/// Builds output pages with one strategy.
#[derive(Debug, Clone, Copy)]
pub struct PageCompositor {
    strategy: CompositionStrategy,
    jpeg_quality: u8,
}

impl PageCompositor {
    pub fn new(strategy: CompositionStrategy, jpeg_quality: u8) -> Self {
        Self {
            strategy,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.strategy, config.jpeg_quality)
    }

    pub fn strategy(&self) -> CompositionStrategy {
        self.strategy
    }

    /// Compose `page` from its raster and OCR result.
    ///
    /// The raster is consumed; it is not needed once the page is built.
    #[instrument(skip(self, raster, ocr), fields(page = page.number, strategy = ?self.strategy))]
    pub fn compose(&self, page: &PageInfo, raster: RasterImage, ocr: OcrResult) -> Result<ComposedPage> {
        match (self.strategy, ocr) {
            (CompositionStrategy::PassThrough, OcrResult::Pdf(bytes)) => {
                drop(raster);
                import_engine_page(page, &bytes).map(ComposedPage::PassThrough)
            }
            (CompositionStrategy::RecomposeOptimized, OcrResult::Spans(spans)) => self
                .recompose(page, raster, &spans)
                .map(ComposedPage::Recomposed),
            (strategy, other) => Err(ScanlayerError::CompositeError(format!(
                "{:?} cannot use {:?} OCR output",
                strategy,
                other.format()
            ))),
        }
    }

    fn recompose(&self, page: &PageInfo, raster: RasterImage, spans: &[TextSpan]) -> Result<OutputPage> {
        let mapper = GeometryMapper::new(page.size, raster.width() as f64, raster.height() as f64)?;

        let mut text_layer = Vec::with_capacity(spans.len());
        let mut skipped_spans = 0;
        for span in spans {
            match invisible_run(&mapper, span) {
                Ok(run) => text_layer.push(run),
                Err(err) => {
                    warn!(%err, text = %span.text, "Skipping OCR span");
                    skipped_spans += 1;
                }
            }
        }

        let (width, height) = (raster.width(), raster.height());
        let data = ImageProcessor::from_rgb(raster.into_rgb()).to_jpeg_bytes(self.jpeg_quality)?;
        debug!(
            runs = text_layer.len(),
            skipped_spans,
            jpeg_bytes = data.len(),
            "Page recomposed"
        );

        Ok(OutputPage {
            size: page.size,
            background: JpegBackground { data, width, height },
            text_layer,
            skipped_spans,
        })
    }
}

/// Place and encode one span. Any failure here skips only this span.
fn invisible_run(mapper: &GeometryMapper, span: &TextSpan) -> Result<InvisibleRun> {
    let placed = mapper.map_span(span).ok_or_else(|| {
        ScanlayerError::CompositeError(format!("span has no visible area: {:?}", span.bbox))
    })?;
    let encoded = encode_win_ansi(&placed.text).ok_or_else(|| {
        ScanlayerError::CompositeError(format!("'{}' has no WinAnsi encoding", placed.text))
    })?;
    let horizontal_scale = horizontal_scale(&placed);
    if ![placed.x, placed.y, placed.font_size, horizontal_scale]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(ScanlayerError::CompositeError("non-finite span geometry".into()));
    }
    Ok(InvisibleRun {
        span: placed,
        encoded,
        horizontal_scale,
    })
}

/// `Tz` percentage making the run's advance match the box width.
pub fn horizontal_scale(span: &PlacedSpan) -> f64 {
    let chars = span.text.chars().count().max(1) as f64;
    let natural = chars * AVERAGE_GLYPH_WIDTH * span.font_size;
    (span.width / natural * 100.0).clamp(MIN_HORIZONTAL_SCALE, MAX_HORIZONTAL_SCALE)
}

/// Encode `text` in WinAnsiEncoding. `None` if any character is not in it.
pub fn encode_win_ansi(text: &str) -> Option<Vec<u8>> {
    text.chars().map(win_ansi_byte).collect()
}

fn win_ansi_byte(ch: char) -> Option<u8> {
    let code = ch as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => Some(match ch {
            '\t' => b' ',
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            _ => return None,
        }),
    }
}

/// Parse the engine's one-page PDF and work out how to scale it onto `page`.
fn import_engine_page(page: &PageInfo, bytes: &[u8]) -> Result<ImportedPage> {
    let document = Document::load_mem(bytes).map_err(|err| {
        ScanlayerError::CompositeError(format!("OCR engine returned an unreadable PDF: {}", err))
    })?;
    let page_id = document
        .get_pages()
        .into_values()
        .next()
        .ok_or_else(|| ScanlayerError::CompositeError("OCR engine returned a PDF with no pages".into()))?;
    let media_box = inherited_attribute(&document, page_id, b"MediaBox")
        .and_then(|obj| rectangle(&document, obj))
        .ok_or_else(|| ScanlayerError::CompositeError("OCR page has no /MediaBox".into()))?;

    let mapper = GeometryMapper::new(
        page.size,
        media_box[2] - media_box[0],
        media_box[3] - media_box[1],
    )?;
    debug!(scale = mapper.uniform_scale(), "Engine page imported");

    Ok(ImportedPage {
        document,
        page_id,
        media_box,
        scale: mapper.uniform_scale(),
        size: page.size,
    })
}
