//! Genesis WASM - WebAssembly bindings for Genesis
//!
//! This crate exposes the genesis-core container and adaptive image codec to
//! JavaScript/TypeScript applications.
//!
//! # Module Structure
//!
//! - `container` - Pack, unpack and inspect `GENV1` containers
//! - `codec` - Adaptive image encode/decode and image containers
//! - `types` - WASM-compatible wrapper types for image data
//!
//! # Usage
//!
//! ```typescript
//! import init, { pack_container, unpack_container } from '@genesis/wasm';
//!
//! await init();
//!
//! const bytes = new Uint8Array(await file.arrayBuffer());
//! const packed = pack_container(bytes, file.name, { codec: 'libx265', crf: 28 });
//! const payload = unpack_container(packed);
//! ```

use wasm_bindgen::prelude::*;

mod codec;
mod container;
mod types;

pub use codec::{decode_image, decode_image_container, encode_image, encode_image_container};
pub use container::{inspect_container, is_container, pack_container, unpack_container};
pub use types::{JsDecodedImage, JsEncodedImage};

/// Initialize the WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {}

/// Get the version of the WASM module
#[wasm_bindgen]
pub fn version() -> String {
    genesis_core::version().to_string()
}
