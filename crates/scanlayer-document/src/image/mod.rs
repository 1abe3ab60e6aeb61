// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — decoding embedded page images and encoding raster pages for
// the OCR engine (PNG) and for recomposed page backgrounds (JPEG).

pub mod processor;

pub use processor::ImageProcessor;
