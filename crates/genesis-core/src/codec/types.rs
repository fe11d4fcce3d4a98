//! Core types for the adaptive image codec.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::lossy::EncodeError;

/// Images with more pixels than this (one megapixel) take the lossy pathway.
pub const LOSSY_PIXEL_THRESHOLD: u64 = 1_000_000;

/// Default JPEG quality for the lossy pathway.
pub const DEFAULT_QUALITY: u8 = 90;

/// Leading byte of a decompressed stream produced by the lossy pathway.
pub const TAG_LOSSY: u8 = 0x01;

/// Leading byte of a decompressed stream produced by the palette pathway.
pub const TAG_PALETTE: u8 = 0x02;

/// Error types for image encoding and decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The generic decompression pass rejected the input.
    #[error("corrupt compressed payload: {0}")]
    Corrupt(String),

    /// Neither a still image nor a palette record could be read from the stream.
    #[error("unrecognized image representation")]
    UnrecognizedImageRepresentation,

    /// A palette index points past the end of the color table.
    #[error(
        "palette index {index} at pixel {position} is out of range for a palette of {palette_len} colors"
    )]
    IndexOutOfRange {
        index: u8,
        palette_len: usize,
        position: usize,
    },

    /// A palette record parsed but is structurally inconsistent.
    #[error("invalid palette record: {0}")]
    InvalidRecord(String),

    /// Encoding the lossy or palette body failed.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The generic compression pass failed at encode time.
    #[error("compression failed: {0}")]
    Compress(String),
}

/// Which representation produced an encoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pathway {
    /// JPEG body, then the generic compressor.
    #[serde(rename = "lossy+generic")]
    Lossy,
    /// Palette + index matrix record, then the generic compressor.
    #[serde(rename = "palette+generic")]
    Palette,
}

impl Pathway {
    /// Stream tag byte written ahead of the body.
    pub fn tag(self) -> u8 {
        match self {
            Pathway::Lossy => TAG_LOSSY,
            Pathway::Palette => TAG_PALETTE,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_LOSSY => Some(Pathway::Lossy),
            TAG_PALETTE => Some(Pathway::Palette),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Pathway::Lossy => "lossy+generic",
            Pathway::Palette => "palette+generic",
        }
    }
}

impl std::fmt::Display for Pathway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for [`ImageCodec`](super::ImageCodec).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecOptions {
    /// JPEG quality (1-100) for the lossy pathway.
    pub quality: u8,
    /// Pixel count above which the lossy pathway is selected.
    pub lossy_threshold_pixels: u64,
    /// Effort passed to the generic compressor.
    pub compression_level: u32,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            lossy_threshold_pixels: LOSSY_PIXEL_THRESHOLD,
            compression_level: crate::compress::DEFAULT_LEVEL,
        }
    }
}

impl CodecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_threshold(mut self, pixels: u64) -> Self {
        self.lossy_threshold_pixels = pixels;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Deterministic pathway choice for an image of the given size.
    pub fn select_pathway(&self, width: u32, height: u32) -> Pathway {
        let pixels = u64::from(width) * u64::from(height);
        if pixels > self.lossy_threshold_pixels {
            Pathway::Lossy
        } else {
            Pathway::Palette
        }
    }
}

/// Output of an encode call.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Compressed stream, ready to be framed or stored.
    pub bytes: Vec<u8>,
    /// Pathway that produced `bytes`.
    pub pathway: Pathway,
    pub width: u32,
    pub height: u32,
}

/// A decoded image with RGB pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// RGB pixel data in row-major order (3 bytes per pixel).
    /// Length should be width * height * 3.
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Create a new DecodedImage with the given dimensions and pixel data.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            pixels.len(),
            (width as usize) * (height as usize) * 3,
            "Pixel buffer size mismatch"
        );
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Create a DecodedImage from an image::RgbImage.
    pub fn from_rgb_image(img: image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let pixels = img.into_raw();
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Convert to an image::RgbImage for further processing.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.pixels.clone())
    }

    /// Consume into an image::RgbImage without copying.
    pub fn into_rgb_image(self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.pixels)
    }

    /// Get the total number of pixels.
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Check if this is an empty/invalid image.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.pixels.is_empty()
    }
}
