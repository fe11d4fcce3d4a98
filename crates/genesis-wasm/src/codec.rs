//! Adaptive image codec WASM bindings.
//!
//! # Functions
//!
//! - [`encode_image`] - Encode RGB pixels along the size-selected pathway
//! - [`decode_image`] - Decode a codec stream back to RGB pixels
//! - [`encode_image_container`] - Encode and frame as a container
//! - [`decode_image_container`] - Unframe, verify and decode a container
//!
//! # Example
//!
//! ```typescript
//! import { encode_image, decode_image } from '@genesis/wasm';
//!
//! const encoded = encode_image(pixels, width, height, 90);
//! console.log(`${encoded.pathway}: ${encoded.byte_length} bytes`);
//! const image = decode_image(encoded.bytes());
//! ```

use genesis_core::codec::{CodecError, CodecOptions, EncodedImage, ImageCodec};
use genesis_core::container::{self, ContainerError};
use wasm_bindgen::prelude::*;

use crate::types::{JsDecodedImage, JsEncodedImage};

fn options(quality: Option<u8>) -> CodecOptions {
    match quality {
        Some(q) => CodecOptions::default().with_quality(q),
        None => CodecOptions::default(),
    }
}

fn encode_core(
    pixels: &[u8],
    width: u32,
    height: u32,
    options: CodecOptions,
) -> Result<EncodedImage, CodecError> {
    ImageCodec::new(options).encode_pixels(pixels, width, height)
}

fn encode_container_core(
    pixels: &[u8],
    width: u32,
    height: u32,
    name: &str,
    options: CodecOptions,
) -> Result<Vec<u8>, ContainerError> {
    let encoded = encode_core(pixels, width, height, options)?;
    container::frame_image(&encoded, name, &options)
}

/// Encode RGB pixel data (3 bytes per pixel, row-major).
///
/// Images above one megapixel are encoded lossily with JPEG at `quality`
/// (default 90); smaller ones go through the palette pathway.
#[wasm_bindgen]
pub fn encode_image(
    pixels: &[u8],
    width: u32,
    height: u32,
    quality: Option<u8>,
) -> Result<JsEncodedImage, JsValue> {
    encode_core(pixels, width, height, options(quality))
        .map(JsEncodedImage::from_encoded)
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Decode a codec stream.
#[wasm_bindgen]
pub fn decode_image(bytes: &[u8]) -> Result<JsDecodedImage, JsValue> {
    ImageCodec::new(CodecOptions::default())
        .decode(bytes)
        .map(JsDecodedImage::from_decoded)
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Encode RGB pixel data and frame it as a container named `original_filename`.
#[wasm_bindgen]
pub fn encode_image_container(
    pixels: &[u8],
    width: u32,
    height: u32,
    original_filename: &str,
    quality: Option<u8>,
) -> Result<Vec<u8>, JsValue> {
    encode_container_core(pixels, width, height, original_filename, options(quality))
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Unframe, verify and decode an image container.
#[wasm_bindgen]
pub fn decode_image_container(bytes: &[u8]) -> Result<JsDecodedImage, JsValue> {
    container::decode_image_container(bytes)
        .map(|(_, image)| JsDecodedImage::from_decoded(image))
        .map_err(|e| JsValue::from_str(&e.to_string()))
}
