// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanlayer-document — Page-level machinery for the Scanlayer OCR pipeline.
//
// Provides PDF reading and assembly (lopdf), the searchability detector, page
// rasterization, OCR invocation with language fallback, the geometry mapper
// between OCR-image pixels and PDF points, and the two page composition
// strategies.

pub mod compose;
pub mod detect;
pub mod engine;
pub mod geometry;
pub mod image;
pub mod ocr;
pub mod pdf;
pub mod raster;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export the primary structs so callers can use `scanlayer_document::SourceDocument` etc.
pub use compose::{ComposedPage, OutputPage, PageCompositor};
pub use geometry::GeometryMapper;
pub use crate::image::processor::ImageProcessor;
pub use ocr::{OcrInvoker, Recognition, Recognize};
pub use pdf::reader::{PageInfo, SourceDocument};
pub use pdf::writer::OutputDocument;
pub use raster::{PageRasterizer, RasterImage, Rasterize};

#[cfg(feature = "ocr")]
pub use ocr::ocrs_engine::OcrsEngine;
