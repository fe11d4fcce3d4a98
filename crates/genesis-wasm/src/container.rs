//! Container WASM bindings.
//!
//! Pack arbitrary bytes behind a metadata record, unpack with integrity
//! verification, and read metadata without touching the payload.

use genesis_core::container::{self, ContainerError, ContainerMetadata, EncodingParams, MAGIC};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Summary returned by [`inspect_container`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContainerSummary {
    metadata: ContainerMetadata,
    payload_length: usize,
    /// `None` when the container carries no digest.
    verified: Option<bool>,
}

fn summarize(bytes: &[u8]) -> Result<ContainerSummary, ContainerError> {
    let (metadata, payload) = container::parse(bytes)?;
    let verified = metadata
        .has_digest()
        .then(|| container::verify_payload(&metadata, payload).is_ok());
    Ok(ContainerSummary {
        payload_length: payload.len(),
        verified,
        metadata,
    })
}

fn unpack_core(bytes: &[u8]) -> Result<(Vec<u8>, bool), ContainerError> {
    let unpacked = container::decode(bytes)?;
    let verified = unpacked.metadata.has_digest();
    Ok((unpacked.payload, verified))
}

/// Frame `payload` as a container.
///
/// `params` is an optional object with any of `codec`, `crf`, `preset`,
/// `target_fps`, `max_resolution`, `quality`, `pathway`.
#[wasm_bindgen]
pub fn pack_container(
    payload: &[u8],
    original_filename: &str,
    params: JsValue,
) -> Result<Vec<u8>, JsValue> {
    let params: EncodingParams = if params.is_undefined() || params.is_null() {
        EncodingParams::default()
    } else {
        serde_wasm_bindgen::from_value(params)
            .map_err(|e| JsValue::from_str(&format!("Invalid encoding params: {}", e)))?
    };
    let metadata = ContainerMetadata::new(original_filename).with_params(params);
    container::pack(payload, metadata).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Unframe a container and return its verified payload.
///
/// Containers without a digest are returned unverified, with a console warning.
#[wasm_bindgen]
pub fn unpack_container(bytes: &[u8]) -> Result<Vec<u8>, JsValue> {
    let (payload, verified) = unpack_core(bytes).map_err(|e| JsValue::from_str(&e.to_string()))?;
    if !verified {
        web_sys::console::warn_1(&JsValue::from_str(
            "genesis: container has no payload digest, integrity not verified",
        ));
    }
    Ok(payload)
}

/// Metadata, payload length and verification status as a plain object.
#[wasm_bindgen]
pub fn inspect_container(bytes: &[u8]) -> Result<JsValue, JsValue> {
    let summary = summarize(bytes).map_err(|e| JsValue::from_str(&e.to_string()))?;
    summary
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Quick check for the container magic.
#[wasm_bindgen]
pub fn is_container(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}
