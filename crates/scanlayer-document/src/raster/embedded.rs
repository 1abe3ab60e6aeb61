// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Embedded image short-circuit — scanned PDFs usually hold one full-page image
// per page. When a page is exactly that (one image, painted upright over the
// whole media box, nothing else drawn) the image is decoded and handed to OCR
// directly instead of re-rendering the page.

use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use scanlayer_core::{POINTS_PER_INCH, PipelineConfig};
use scanlayer_core::error::{Result, ScanlayerError};
use tracing::{debug, instrument};

use super::{RasterImage, RasterOrigin};
use crate::image::processor::ImageProcessor;
use crate::pdf::reader::{PageInfo, SourceDocument, inherited_attribute, number};

/// Content operators that only touch graphics state.
const STATE_OPERATORS: &[&str] = &["q", "Q", "cm", "gs", "w", "J", "j", "M", "d", "ri", "i"];

/// Affine matrix `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Matrix {
    const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// `self x other`, the order `cm` concatenates in (new CTM = M x CTM).
    fn concat(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }
}

fn error(message: impl Into<String>) -> ScanlayerError {
    ScanlayerError::RasterError(message.into())
}

/// Decode the page's only image if the page is nothing but that image.
#[instrument(skip_all, fields(page = page.number))]
pub fn extract_single_image(source: &SourceDocument, page: &PageInfo) -> Result<RasterImage> {
    if page.is_rotated() {
        return Err(error("page is rotated"));
    }
    let document = source.document();

    let resources = inherited_attribute(document, page.object_id, b"Resources")
        .and_then(|obj| obj.as_dict().ok())
        .ok_or_else(|| error("page has no resources"))?;
    let xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| document.dereference(obj).ok())
        .and_then(|(_, obj)| obj.as_dict().ok())
        .ok_or_else(|| error("page has no XObjects"))?;

    let (name, image_id) = single_image(document, xobjects)?;

    let content = document
        .get_and_decode_page_content(page.object_id)
        .map_err(|err| error(format!("cannot decode content stream: {}", err)))?;
    let placement = image_placement(document, &content.operations, &name)?;
    check_covers_page(&placement, page)?;

    let stream = document
        .get_object(image_id)
        .and_then(Object::as_stream)
        .map_err(|err| error(format!("image object unreadable: {}", err)))?;
    let image = decode_image(document, stream, pixel_budget(page))?;

    let effective_dpi = (image.width() as f64 * POINTS_PER_INCH / page.size.width)
        .round()
        .max(1.0) as u32;
    debug!(
        width = image.width(),
        height = image.height(),
        effective_dpi,
        "Embedded image decoded"
    );
    Ok(RasterImage::new(image, effective_dpi, RasterOrigin::Embedded))
}

/// The resource name and object id of the only XObject, which must be an image.
fn single_image(document: &Document, xobjects: &Dictionary) -> Result<(Vec<u8>, ObjectId)> {
    if xobjects.len() != 1 {
        return Err(error(format!("page has {} XObjects", xobjects.len())));
    }
    let (name, object) = xobjects
        .iter()
        .next()
        .ok_or_else(|| error("page has no XObjects"))?;
    let id = object
        .as_reference()
        .map_err(|_| error("inline XObject entry"))?;
    let stream = document
        .get_object(id)
        .and_then(Object::as_stream)
        .map_err(|err| error(format!("XObject unreadable: {}", err)))?;
    let subtype = stream
        .dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .map_err(|_| error("XObject has no subtype"))?;
    if subtype != b"Image" {
        return Err(error("XObject is not an image"));
    }
    Ok((name.clone(), id))
}

/// Track the CTM through the content stream and return it at the single
/// `Do` of `image_name`. Any painting operator besides that one disqualifies
/// the page.
fn image_placement(document: &Document, operations: &[Operation], image_name: &[u8]) -> Result<Matrix> {
    let mut ctm = Matrix::IDENTITY;
    let mut saved: Vec<Matrix> = Vec::new();
    let mut placement = None;

    for op in operations {
        match op.operator.as_str() {
            "q" => saved.push(ctm),
            "Q" => ctm = saved.pop().unwrap_or(Matrix::IDENTITY),
            "cm" => ctm = matrix_operand(document, &op.operands)?.concat(&ctm),
            "Do" => {
                let name = op
                    .operands
                    .first()
                    .and_then(|obj| obj.as_name().ok())
                    .ok_or_else(|| error("Do without a name"))?;
                if name != image_name || placement.is_some() {
                    return Err(error("image painted more than once"));
                }
                placement = Some(ctm);
            }
            other if STATE_OPERATORS.contains(&other) => {}
            other => return Err(error(format!("page draws more than an image ({})", other))),
        }
    }

    placement.ok_or_else(|| error("image is never painted"))
}

fn matrix_operand(document: &Document, operands: &[Object]) -> Result<Matrix> {
    let values: Vec<f64> = operands
        .iter()
        .filter_map(|obj| number(document, obj))
        .collect();
    match values.as_slice() {
        [a, b, c, d, e, f] => Ok(Matrix {
            a: *a,
            b: *b,
            c: *c,
            d: *d,
            e: *e,
            f: *f,
        }),
        _ => Err(error("malformed cm operands")),
    }
}

/// The image must be upright, unmirrored and span the whole media box.
fn check_covers_page(placement: &Matrix, page: &PageInfo) -> Result<()> {
    let [x0, y0, x1, y1] = page.media_box;
    let (width, height) = (x1 - x0, y1 - y0);
    let close = |value: f64, target: f64, extent: f64| (value - target).abs() <= (extent * 0.01).max(1.0);

    let axis_aligned = placement.b.abs() < 1e-6 && placement.c.abs() < 1e-6;
    if !axis_aligned || placement.a <= 0.0 || placement.d <= 0.0 {
        return Err(error("image is rotated or mirrored"));
    }
    if !(close(placement.a, width, width)
        && close(placement.d, height, height)
        && close(placement.e, x0, width)
        && close(placement.f, y0, height))
    {
        return Err(error("image does not cover the page"));
    }
    Ok(())
}

/// Largest sample grid worth decoding for `page`: its size at the highest
/// rasterization DPI.
fn pixel_budget(page: &PageInfo) -> u64 {
    let (width, height) = page.size.pixel_dimensions(PipelineConfig::MAX_DPI);
    u64::from(width) * u64::from(height)
}

/// Decode an image XObject into RGB pixels, refusing sample grids larger than
/// `max_pixels`.
fn decode_image(document: &Document, stream: &Stream, max_pixels: u64) -> Result<image::RgbImage> {
    let dict = &stream.dict;
    if dict
        .get(b"ImageMask")
        .and_then(Object::as_bool)
        .unwrap_or(false)
    {
        return Err(error("stencil masks are not page scans"));
    }

    let filters = filter_names(document, dict);
    if filters.last().map(Vec::as_slice) == Some(b"DCTDecode".as_slice()) {
        if filters.len() != 1 {
            return Err(error("chained filters before DCTDecode"));
        }
        return Ok(ImageProcessor::from_jpeg(&stream.content)?.into_rgb8());
    }

    let dimension = |key: &[u8]| {
        dict.get(key)
            .ok()
            .and_then(|obj| number(document, obj))
            .filter(|value| *value >= 1.0)
            .map(|value| value as u32)
            .ok_or_else(|| error(format!("image has no valid /{}", String::from_utf8_lossy(key))))
    };
    let width = dimension(b"Width")?;
    let height = dimension(b"Height")?;
    if u64::from(width) * u64::from(height) > max_pixels {
        return Err(error(format!("image of {}x{} exceeds the page's pixel budget", width, height)));
    }

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|obj| number(document, obj))
        .unwrap_or(8.0) as u32;
    if bits != 8 {
        return Err(error(format!("{} bits per component", bits)));
    }
    let components = color_components(document, dict)?;

    let samples = match filters.as_slice() {
        [] => stream.content.clone(),
        [only] if only.as_slice() == b"FlateDecode" => stream
            .decompressed_content()
            .map_err(|err| error(format!("Flate decode failed: {}", err)))?,
        other => {
            return Err(error(format!(
                "unsupported filter chain {:?}",
                other
                    .iter()
                    .map(|f| String::from_utf8_lossy(f).to_string())
                    .collect::<Vec<_>>()
            )));
        }
    };

    Ok(ImageProcessor::from_raw_samples(width, height, components, samples)?.into_rgb8())
}

fn filter_names(document: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    let Some(filter) = dict
        .get(b"Filter")
        .ok()
        .and_then(|obj| document.dereference(obj).ok())
        .map(|(_, obj)| obj)
    else {
        return Vec::new();
    };
    match filter {
        Object::Name(name) => vec![name.clone()],
        Object::Array(items) => items
            .iter()
            .filter_map(|item| item.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// Channel count for the device colour spaces (and ICC profiles declaring /N).
fn color_components(document: &Document, dict: &Dictionary) -> Result<u8> {
    let space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|obj| document.dereference(obj).ok())
        .map(|(_, obj)| obj)
        .ok_or_else(|| error("image has no colour space"))?;

    let by_name = |name: &[u8]| match name {
        b"DeviceGray" | b"CalGray" => Some(1),
        b"DeviceRGB" | b"CalRGB" => Some(3),
        b"DeviceCMYK" => Some(4),
        _ => None,
    };

    match space {
        Object::Name(name) => by_name(name.as_slice()),
        Object::Array(items) => match items.first().and_then(|obj| obj.as_name().ok()) {
            Some(b"ICCBased") => items
                .get(1)
                .and_then(|obj| document.dereference(obj).ok())
                .and_then(|(_, obj)| obj.as_stream().ok())
                .and_then(|profile| profile.dict.get(b"N").ok())
                .and_then(|n| number(document, n))
                .map(|n| n as u8)
                .filter(|n| matches!(n, 1 | 3 | 4)),
            Some(name) => by_name(name),
            None => None,
        },
        _ => None,
    }
    .ok_or_else(|| error("unsupported colour space"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PageFixture, PdfFixture};

    fn extract(fixture: PageFixture) -> Result<RasterImage> {
        let bytes = PdfFixture::new().page(fixture).to_bytes();
        let source = SourceDocument::from_bytes(&bytes).unwrap();
        let page = source.page(0).unwrap();
        extract_single_image(&source, &page)
    }

    #[test]
    fn raw_rgb_full_page_image_is_used() {
        let raster = extract(PageFixture::blank(595.0, 842.0).image(620, 877)).unwrap();
        assert_eq!((raster.width(), raster.height()), (620, 877));
        assert_eq!(raster.dpi(), 75);
        assert_eq!(raster.origin(), RasterOrigin::Embedded);
    }

    #[test]
    fn jpeg_full_page_image_is_used() {
        let raster = extract(PageFixture::blank(612.0, 792.0).jpeg_image(306, 396)).unwrap();
        assert_eq!((raster.width(), raster.height()), (306, 396));
        assert_eq!(raster.dpi(), 36);
    }

    #[test]
    fn page_with_text_is_rejected() {
        let result = extract(PageFixture::blank(595.0, 842.0).image(100, 100).text("Already text"));
        assert!(result.is_err());
    }

    #[test]
    fn rotated_page_is_rejected() {
        let result = extract(PageFixture::blank(595.0, 842.0).image(100, 100).rotate(90));
        assert!(result.is_err());
    }

    #[test]
    fn mirrored_placement_is_rejected() {
        let result = extract(PageFixture::blank(595.0, 842.0).image(100, 100).mirrored());
        assert!(result.is_err());
    }

    #[test]
    fn partial_placement_is_rejected() {
        let result = extract(PageFixture::blank(595.0, 842.0).image(100, 100).placed_at(0.5));
        assert!(result.is_err());
    }

    #[test]
    fn oversized_image_dimensions_are_rejected() {
        let mut document = PdfFixture::new()
            .page(PageFixture::blank(595.0, 842.0).image(100, 100))
            .to_document();
        for object in document.objects.values_mut() {
            if let Ok(stream) = object.as_stream_mut() {
                if stream.dict.get(b"Subtype").and_then(Object::as_name).ok() == Some(b"Image".as_slice()) {
                    stream.dict.set("Width", i64::from(u32::MAX));
                    stream.dict.set("Height", i64::from(u32::MAX));
                }
            }
        }
        let source = SourceDocument::from_document(document, None);
        let page = source.page(0).unwrap();

        let err = extract_single_image(&source, &page).unwrap_err();
        assert!(matches!(err, ScanlayerError::RasterError(_)));
    }

    #[test]
    fn blank_page_is_rejected() {
        assert!(extract(PageFixture::blank(595.0, 842.0)).is_err());
    }

    #[test]
    fn matrix_concat_applies_translation_after_scale() {
        let scale = Matrix {
            a: 2.0,
            d: 3.0,
            ..Matrix::IDENTITY
        };
        let translate = Matrix {
            e: 10.0,
            f: 20.0,
            ..Matrix::IDENTITY
        };
        let combined = scale.concat(&translate);
        assert_eq!((combined.a, combined.d, combined.e, combined.f), (2.0, 3.0, 10.0, 20.0));
    }
}
