//! WASM-compatible wrapper types for image data.
//!
//! These wrap the core codec types and handle the conversion between Rust and
//! JavaScript data representations.

use genesis_core::codec::{DecodedImage, EncodedImage};
use wasm_bindgen::prelude::*;

/// A decoded image wrapper for JavaScript.
///
/// The pixel data is stored in WASM memory. Calling `pixels()` copies it into
/// a JavaScript `Uint8Array`.
#[wasm_bindgen]
pub struct JsDecodedImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

#[wasm_bindgen]
impl JsDecodedImage {
    /// Create a new JsDecodedImage from dimensions and RGB pixel data
    /// (3 bytes per pixel, row-major order).
    #[wasm_bindgen(constructor)]
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> JsDecodedImage {
        JsDecodedImage {
            width,
            height,
            pixels,
        }
    }

    #[wasm_bindgen(getter)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of bytes in the pixel buffer (width * height * 3).
    #[wasm_bindgen(getter)]
    pub fn byte_length(&self) -> usize {
        self.pixels.len()
    }

    /// Returns RGB pixel data as Uint8Array (copied).
    pub fn pixels(&self) -> Vec<u8> {
        self.pixels.clone()
    }

    /// Explicitly free WASM memory. Optional; the finalizer does the same.
    pub fn free(self) {}
}

impl JsDecodedImage {
    pub(crate) fn from_decoded(img: DecodedImage) -> Self {
        Self {
            width: img.width,
            height: img.height,
            pixels: img.pixels,
        }
    }
}

/// An encoded image stream plus the pathway that produced it.
#[wasm_bindgen]
pub struct JsEncodedImage {
    bytes: Vec<u8>,
    pathway: String,
    width: u32,
    height: u32,
}

#[wasm_bindgen]
impl JsEncodedImage {
    /// Compressed stream bytes.
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// `"lossy+generic"` or `"palette+generic"`.
    #[wasm_bindgen(getter)]
    pub fn pathway(&self) -> String {
        self.pathway.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[wasm_bindgen(getter)]
    pub fn byte_length(&self) -> usize {
        self.bytes.len()
    }
}

impl JsEncodedImage {
    pub(crate) fn from_encoded(encoded: EncodedImage) -> Self {
        Self {
            pathway: encoded.pathway.to_string(),
            width: encoded.width,
            height: encoded.height,
            bytes: encoded.bytes,
        }
    }
}
