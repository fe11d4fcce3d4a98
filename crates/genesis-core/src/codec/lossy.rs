//! Lossy pathway: JPEG encoding of the RGB image and still-image decoding.
//!
//! Encoding goes through the `image` crate's baseline JPEG encoder. Decoding
//! accepts any still format the `image` crate was built with (JPEG, PNG), which
//! is what lets untagged legacy streams be sniffed.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use image::ImageEncoder;
use image::ImageFormat;
use image::ImageReader;
use std::io::Cursor;
use thiserror::Error;

use super::DecodedImage;

/// Errors that can occur while producing an encoded body.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Pixel data length doesn't match expected dimensions
    #[error("Invalid pixel data: expected {expected} bytes (width * height * 3), got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    /// Width or height is zero
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    InvalidDimensions { width: u32, height: u32 },

    /// JPEG encoding failed
    #[error("JPEG encoding failed: {0}")]
    EncodingFailed(String),

    /// Palette record serialization failed
    #[error("Palette record serialization failed: {0}")]
    RecordFailed(String),
}

/// Encode RGB pixel data to JPEG bytes.
///
/// # Arguments
///
/// * `pixels` - RGB pixel data (3 bytes per pixel, row-major order)
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
/// * `quality` - JPEG quality (1-100, where 100 is highest quality)
///
/// Quality values outside 1-100 are clamped.
pub fn encode_jpeg(
    pixels: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, EncodeError> {
    if width == 0 || height == 0 {
        return Err(EncodeError::InvalidDimensions { width, height });
    }

    let expected_len = (width as usize) * (height as usize) * 3;
    if pixels.len() != expected_len {
        return Err(EncodeError::InvalidPixelData {
            expected: expected_len,
            actual: pixels.len(),
        });
    }

    let quality = quality.clamp(1, 100);

    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder
        .write_image(pixels, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;

    Ok(buffer.into_inner())
}

/// Decode a JPEG body produced by [`encode_jpeg`].
pub fn decode_jpeg(bytes: &[u8]) -> Result<DecodedImage, image::ImageError> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?;
    Ok(DecodedImage::from_rgb_image(img.into_rgb8()))
}

/// Decode bytes as a standalone still image of any supported format.
///
/// Fails if the format cannot be guessed from the leading bytes or the body
/// does not decode completely.
pub fn decode_still(bytes: &[u8]) -> Result<DecodedImage, image::ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let img = reader.decode()?;
    Ok(DecodedImage::from_rgb_image(img.into_rgb8()))
}
