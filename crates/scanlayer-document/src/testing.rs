// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Test support — in-memory PDF fixtures and scripted engines, so pipeline
// behaviour can be exercised without poppler or tesseract installed.
//
// Fixture builders panic on failure; they only ever run inside tests.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_core::{BoundingBox, OcrFormat, OcrResult, POINTS_PER_INCH, TextSpan};

use crate::image::processor::ImageProcessor;
use crate::ocr::Recognize;
use crate::pdf::outline::{OutlineEntry, write_outline};
use crate::pdf::reader::{PageInfo, SourceDocument};
use crate::pdf::real;
use crate::raster::{RasterImage, Rasterize};

// -- PDF fixtures -------------------------------------------------------------

#[derive(Debug, Clone)]
struct FixtureImage {
    width: u32,
    height: u32,
    jpeg: bool,
}

/// One page of a [`PdfFixture`].
#[derive(Debug, Clone)]
pub struct PageFixture {
    width: f64,
    height: f64,
    media_box: bool,
    rotate: Option<i64>,
    texts: Vec<String>,
    images: Vec<FixtureImage>,
    mirrored: bool,
    coverage: f64,
}

impl PageFixture {
    /// An empty page with a `[0 0 width height]` media box.
    pub fn blank(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            media_box: true,
            rotate: None,
            texts: Vec::new(),
            images: Vec::new(),
            mirrored: false,
            coverage: 1.0,
        }
    }

    pub fn rotate(mut self, degrees: i64) -> Self {
        self.rotate = Some(degrees);
        self
    }

    /// Leave /MediaBox to the page tree.
    pub fn without_media_box(mut self) -> Self {
        self.media_box = false;
        self
    }

    /// A line of Helvetica text.
    pub fn text(mut self, text: &str) -> Self {
        self.texts.push(text.to_string());
        self
    }

    /// An uncompressed light-grey RGB image drawn over the whole page.
    pub fn image(mut self, width: u32, height: u32) -> Self {
        self.images.push(FixtureImage {
            width,
            height,
            jpeg: false,
        });
        self
    }

    /// A DCT-encoded image drawn over the whole page.
    pub fn jpeg_image(mut self, width: u32, height: u32) -> Self {
        self.images.push(FixtureImage {
            width,
            height,
            jpeg: true,
        });
        self
    }

    /// Draw images flipped horizontally.
    pub fn mirrored(mut self) -> Self {
        self.mirrored = true;
        self
    }

    /// Draw images scaled to `fraction` of the page.
    pub fn placed_at(mut self, fraction: f64) -> Self {
        self.coverage = fraction;
        self
    }

    fn operations(&self) -> Vec<Operation> {
        let mut ops = Vec::new();
        for index in 0..self.images.len() {
            let (w, h) = (self.width * self.coverage, self.height * self.coverage);
            let matrix = if self.mirrored {
                [-w, 0.0, 0.0, h, w, 0.0]
            } else {
                [w, 0.0, 0.0, h, 0.0, 0.0]
            };
            ops.push(Operation::new("q", vec![]));
            ops.push(Operation::new("cm", matrix.iter().map(|v| real(*v)).collect()));
            ops.push(Operation::new(
                "Do",
                vec![Object::Name(format!("Im{}", index).into_bytes())],
            ));
            ops.push(Operation::new("Q", vec![]));
        }
        for (line, text) in self.texts.iter().enumerate() {
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), real(12.0)]));
            ops.push(Operation::new(
                "Td",
                vec![real(36.0), real(self.height - 48.0 - 16.0 * line as f64)],
            ));
            ops.push(Operation::new(
                "Tj",
                vec![Object::String(text.as_bytes().to_vec(), StringFormat::Literal)],
            ));
            ops.push(Operation::new("ET", vec![]));
        }
        ops
    }
}

fn fixture_image(document: &mut Document, image: &FixtureImage) -> ObjectId {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    let stream = if image.jpeg {
        dict.set("Filter", "DCTDecode");
        let rgb = RgbImage::from_pixel(image.width, image.height, Rgb([230, 230, 230]));
        let jpeg = ImageProcessor::from_rgb(rgb)
            .to_jpeg_bytes(80)
            .expect("fixture JPEG encodes");
        Stream::new(dict, jpeg).with_compression(false)
    } else {
        let samples = vec![230u8; image.width as usize * image.height as usize * 3];
        Stream::new(dict, samples)
    };
    document.add_object(stream)
}

/// Builder for small in-memory PDFs.
#[derive(Debug, Clone, Default)]
pub struct PdfFixture {
    pages: Vec<PageFixture>,
    title: Option<String>,
    inherited_media_box: Option<(f64, f64)>,
    outline: Vec<OutlineEntry>,
}

impl PdfFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: PageFixture) -> Self {
        self.pages.push(page);
        self
    }

    /// Set /Title in the document information dictionary.
    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Put a /MediaBox on the page tree root for pages to inherit.
    pub fn inherited_media_box(mut self, width: f64, height: f64) -> Self {
        self.inherited_media_box = Some((width, height));
        self
    }

    pub fn outline(mut self, entries: Vec<OutlineEntry>) -> Self {
        self.outline = entries;
        self
    }

    pub fn to_document(&self) -> Document {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut page_ids = Vec::new();
        for page in &self.pages {
            let mut xobjects = Dictionary::new();
            for (index, image) in page.images.iter().enumerate() {
                let image_id = fixture_image(&mut document, image);
                xobjects.set(format!("Im{}", index), image_id);
            }
            let mut resources = dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            };
            if !xobjects.is_empty() {
                resources.set("XObject", xobjects);
            }

            let bytes = Content {
                operations: page.operations(),
            }
            .encode()
            .expect("fixture content encodes");
            let content_id = document.add_object(Stream::new(Dictionary::new(), bytes));

            let mut dict = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Resources" => resources,
                "Contents" => content_id,
            };
            if page.media_box {
                dict.set(
                    "MediaBox",
                    vec![real(0.0), real(0.0), real(page.width), real(page.height)],
                );
            }
            if let Some(degrees) = page.rotate {
                dict.set("Rotate", degrees);
            }
            page_ids.push(document.add_object(dict));
        }

        let mut pages = dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => page_ids.len() as i64,
        };
        if let Some((width, height)) = self.inherited_media_box {
            pages.set("MediaBox", vec![real(0.0), real(0.0), real(width), real(height)]);
        }
        document.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        };
        if let Some(outline_id) = write_outline(&mut document, &self.outline, &page_ids) {
            catalog.set("Outlines", outline_id);
        }
        let catalog_id = document.add_object(catalog);
        document.trailer.set("Root", catalog_id);

        if let Some(title) = &self.title {
            let info_id = document.add_object(dictionary! {
                "Title" => Object::String(title.as_bytes().to_vec(), StringFormat::Literal),
                "Producer" => Object::String(b"fixture".to_vec(), StringFormat::Literal),
            });
            document.trailer.set("Info", info_id);
        }
        document
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut document = self.to_document();
        document.compress();
        let mut output = Vec::new();
        document.save_to(&mut output).expect("fixture PDF serialises");
        output
    }

    pub fn write_to(&self, path: impl AsRef<Path>) {
        std::fs::write(path, self.to_bytes()).expect("fixture PDF written");
    }
}

/// A one-page searchable PDF like the one an OCR engine emits.
pub fn ocr_page_pdf(width: f64, height: f64, text: &str) -> Vec<u8> {
    PdfFixture::new()
        .page(PageFixture::blank(width, height).text(text))
        .to_bytes()
}

// -- Fake engines -------------------------------------------------------------

/// Renders every page as a white image of the right size, and counts calls.
#[derive(Debug, Default)]
pub struct FakeRasterizer {
    calls: AtomicUsize,
}

impl FakeRasterizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Rasterize for FakeRasterizer {
    fn rasterize(&self, _document: &SourceDocument, page: &PageInfo, dpi: u32) -> Result<RasterImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (width, height) = page.size.pixel_dimensions(dpi);
        Ok(RasterImage::rendered(
            RgbImage::from_pixel(width, height, Rgb([255, 255, 255])),
            dpi,
        ))
    }
}

/// An OCR engine that "reads" a fixed line of text and fails on chosen calls.
///
/// Calls are numbered from 0 in the order they arrive, fallback retries
/// included.
#[derive(Debug, Default)]
pub struct ScriptedRecognizer {
    language_failures: BTreeSet<usize>,
    engine_failures: BTreeSet<usize>,
    text: Option<String>,
    languages: Mutex<Vec<String>>,
}

impl ScriptedRecognizer {
    pub const DEFAULT_TEXT: &'static str = "Scanned page text";

    /// Report a missing language pack on these calls.
    pub fn language_failure_on_calls(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.language_failures.extend(calls);
        self
    }

    /// Fail outright on these calls.
    pub fn engine_failure_on_calls(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.engine_failures.extend(calls);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    /// Languages requested so far, in call order.
    pub fn languages(&self) -> Vec<String> {
        self.languages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.languages().len()
    }
}

impl Recognize for ScriptedRecognizer {
    fn recognize(&self, image: &RasterImage, language: &str, format: OcrFormat) -> Result<OcrResult> {
        let call = {
            let mut languages = self
                .languages
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            languages.push(language.to_string());
            languages.len() - 1
        };
        if self.language_failures.contains(&call) {
            return Err(ScanlayerError::OcrLanguageUnsupported {
                language: language.to_string(),
                detail: format!("Failed loading language '{}'", language),
            });
        }
        if self.engine_failures.contains(&call) {
            return Err(ScanlayerError::OcrError("scripted engine failure".into()));
        }

        let text = self.text.as_deref().unwrap_or(Self::DEFAULT_TEXT);
        let (width, height) = (image.width() as f64, image.height() as f64);
        match format {
            OcrFormat::Spans => Ok(OcrResult::Spans(vec![TextSpan::new(
                text,
                BoundingBox::new(width * 0.1, height * 0.1, width * 0.6, height * 0.04),
                height * 0.04,
            )])),
            OcrFormat::Pdf => {
                let scale = POINTS_PER_INCH / image.dpi() as f64;
                Ok(OcrResult::Pdf(ocr_page_pdf(width * scale, height * scale, text)))
            }
        }
    }
}
