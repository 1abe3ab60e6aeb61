// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page rasterization — turn one PDF page into an upright RGB image at a given
// DPI, either by reusing the page's single embedded scan or by rendering it.

pub mod embedded;
pub mod pdftoppm;

use std::sync::Arc;

use image::RgbImage;
use scanlayer_core::error::Result;
use tracing::{debug, instrument};

use crate::image::processor::ImageProcessor;
use crate::pdf::reader::{PageInfo, SourceDocument};

pub use pdftoppm::PdftoppmRenderer;

/// How a raster came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterOrigin {
    /// Rendered from the page description.
    Rendered,
    /// Decoded straight from the page's only embedded image.
    Embedded,
}

/// A page image plus the resolution it represents.
///
/// Owned by the page step that produced it and dropped once the page is
/// composed.
#[derive(Debug, Clone)]
pub struct RasterImage {
    image: RgbImage,
    dpi: u32,
    origin: RasterOrigin,
}

impl RasterImage {
    pub fn new(image: RgbImage, dpi: u32, origin: RasterOrigin) -> Self {
        Self { image, dpi, origin }
    }

    pub fn rendered(image: RgbImage, dpi: u32) -> Self {
        Self::new(image, dpi, RasterOrigin::Rendered)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    pub fn origin(&self) -> RasterOrigin {
        self.origin
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_rgb(self) -> RgbImage {
        self.image
    }

    /// Lossless encoding handed to file-based OCR engines.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        ImageProcessor::from_rgb(self.image.clone()).to_png_bytes()
    }
}

/// Anything that can turn a page into pixels.
///
/// Implementations must apply the page's /Rotate so the result is upright.
pub trait Rasterize: Send + Sync {
    fn rasterize(&self, document: &SourceDocument, page: &PageInfo, dpi: u32) -> Result<RasterImage>;
}

/// The pipeline's rasterizer: tries the page's single embedded image first
/// (when enabled) and falls back to full rendering on any extraction error.
pub struct PageRasterizer {
    renderer: Arc<dyn Rasterize>,
    use_embedded: bool,
}

impl PageRasterizer {
    pub fn new(renderer: Arc<dyn Rasterize>, use_embedded: bool) -> Self {
        Self {
            renderer,
            use_embedded,
        }
    }
}

impl Rasterize for PageRasterizer {
    #[instrument(skip_all, fields(page = page.number, dpi = dpi))]
    fn rasterize(&self, document: &SourceDocument, page: &PageInfo, dpi: u32) -> Result<RasterImage> {
        if self.use_embedded {
            match embedded::extract_single_image(document, page) {
                Ok(raster) => {
                    debug!(
                        width = raster.width(),
                        height = raster.height(),
                        effective_dpi = raster.dpi(),
                        "Using embedded page image"
                    );
                    return Ok(raster);
                }
                Err(err) => debug!(%err, "Embedded image not usable, rendering page"),
            }
        }
        self.renderer.rasterize(document, page, dpi)
    }
}
