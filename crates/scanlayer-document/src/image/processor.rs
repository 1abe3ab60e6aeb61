// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor — decode embedded PDF image samples and encode page rasters
// as PNG (lossless, for the OCR engine) or JPEG (lossy, for page backgrounds).
// Operates on in-memory images using the `image` crate.

use image::{DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage};
use scanlayer_core::error::{Result, ScanlayerError};
use tracing::{debug, instrument};

/// Image processing wrapper around a single in-memory image.
///
/// ```ignore
/// let jpeg = ImageProcessor::from_rgb(raster).to_jpeg_bytes(75)?;
/// ```
#[derive(Debug)]
pub struct ImageProcessor {
    /// The current working image.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Create a processor from raw encoded bytes (JPEG, PNG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(data).map_err(|err| {
            ScanlayerError::ImageError(format!("failed to decode image: {}", err))
        })?;
        debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded from bytes"
        );
        Ok(Self { image: img })
    }

    /// Create a processor from a JPEG stream (PDF `/DCTDecode`).
    pub fn from_jpeg(data: &[u8]) -> Result<Self> {
        let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg).map_err(|err| {
            ScanlayerError::ImageError(format!("failed to decode JPEG: {}", err))
        })?;
        Ok(Self { image: img })
    }

    /// Build an image from unfiltered 8-bit PDF samples with `components`
    /// channels (1 = DeviceGray, 3 = DeviceRGB, 4 = DeviceCMYK).
    pub fn from_raw_samples(width: u32, height: u32, components: u8, samples: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(components as usize))
            .ok_or_else(|| {
                ScanlayerError::ImageError(format!(
                    "image dimensions overflow: {}x{}x{}",
                    width, height, components
                ))
            })?;
        if samples.len() < expected {
            return Err(ScanlayerError::ImageError(format!(
                "image data too short: {} bytes for {}x{}x{}",
                samples.len(),
                width,
                height,
                components
            )));
        }
        let mut samples = samples;
        samples.truncate(expected);

        let image = match components {
            1 => GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8),
            4 => Some(DynamicImage::ImageRgb8(cmyk_to_rgb(width, height, &samples))),
            other => {
                return Err(ScanlayerError::ImageError(format!(
                    "unsupported component count {}",
                    other
                )));
            }
        };

        image.map(|image| Self { image }).ok_or_else(|| {
            ScanlayerError::ImageError(format!("invalid image buffer {}x{}", width, height))
        })
    }

    /// Wrap an RGB buffer.
    pub fn from_rgb(image: RgbImage) -> Self {
        Self {
            image: DynamicImage::ImageRgb8(image),
        }
    }

    // -- Accessors ------------------------------------------------------------

    /// Current image width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Current image height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Consume the processor and return the image as RGB8.
    pub fn into_rgb8(self) -> RgbImage {
        match self.image {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => other.to_rgb8(),
        }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        self.image.write_to(&mut cursor, ImageFormat::Png).map_err(|err| {
            ScanlayerError::ImageError(format!("PNG encoding failed: {}", err))
        })?;
        Ok(buffer)
    }

    /// Encode the current image as JPEG bytes with the given quality (1-100).
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let rgb = self.image.to_rgb8();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        rgb.write_with_encoder(encoder).map_err(|err| {
            ScanlayerError::ImageError(format!("JPEG encoding failed: {}", err))
        })?;
        Ok(buffer)
    }
}

/// Naive CMYK to RGB conversion, good enough to feed an OCR engine.
fn cmyk_to_rgb(width: u32, height: u32, samples: &[u8]) -> RgbImage {
    let mut rgb = RgbImage::new(width, height);
    for (pixel, cmyk) in rgb.pixels_mut().zip(samples.chunks_exact(4)) {
        let k = 255 - cmyk[3] as u16;
        let channel = |c: u8| ((255 - c as u16) * k / 255) as u8;
        *pixel = Rgb([channel(cmyk[0]), channel(cmyk[1]), channel(cmyk[2])]);
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_round_trip_keeps_dimensions() {
        let rgb = RgbImage::from_pixel(64, 48, Rgb([200, 10, 10]));
        let jpeg = ImageProcessor::from_rgb(rgb).to_jpeg_bytes(75).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "JPEG SOI marker");

        let decoded = ImageProcessor::from_jpeg(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn lower_quality_is_smaller() {
        let mut rgb = RgbImage::new(128, 128);
        for (x, y, pixel) in rgb.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 2) as u8, (y * 2) as u8, ((x ^ y) * 3) as u8]);
        }
        let processor = ImageProcessor::from_rgb(rgb);
        let high = processor.to_jpeg_bytes(95).unwrap();
        let low = processor.to_jpeg_bytes(20).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn gray_samples_expand_to_rgb() {
        let processor = ImageProcessor::from_raw_samples(2, 1, 1, vec![0, 255]).unwrap();
        let rgb = processor.into_rgb8();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn cmyk_samples_convert() {
        let processor =
            ImageProcessor::from_raw_samples(2, 1, 4, vec![0, 0, 0, 0, 0, 0, 0, 255]).unwrap();
        let rgb = processor.into_rgb8();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn short_sample_buffer_is_rejected() {
        assert!(ImageProcessor::from_raw_samples(10, 10, 3, vec![0; 20]).is_err());
        assert!(ImageProcessor::from_raw_samples(1, 1, 2, vec![0; 2]).is_err());
    }

    #[test]
    fn overflowing_dimensions_are_rejected() {
        let err = ImageProcessor::from_raw_samples(u32::MAX, u32::MAX, 4, Vec::new()).unwrap_err();
        assert!(matches!(err, ScanlayerError::ImageError(_)));
    }

    #[test]
    fn png_encoding_decodes_back() {
        let rgb = RgbImage::from_pixel(5, 7, Rgb([1, 2, 3]));
        let png = ImageProcessor::from_rgb(rgb).to_png_bytes().unwrap();
        let decoded = ImageProcessor::from_bytes(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (5, 7));
    }
}
