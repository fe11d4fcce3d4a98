//! Container metadata and error types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{CodecError, Pathway};
use crate::integrity::{Digest, IntegrityError};

/// Current container format version.
pub const FORMAT_VERSION: &str = "1";

/// Errors raised while parsing the container framing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    /// The leading bytes are not the container magic.
    #[error("not a genesis container: expected magic {expected:?}, found {found:02X?}")]
    BadMagic {
        expected: &'static str,
        found: Vec<u8>,
    },

    /// The input ends before a header field or the metadata record is complete.
    #[error("truncated container: needed {needed} bytes, only {available} available")]
    Truncated { needed: u64, available: u64 },

    /// The metadata record is not UTF-8 JSON of the expected shape.
    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),
}

/// Errors for container encode/decode operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// Metadata could not be serialized at encode time.
    #[error("metadata encoding failed: {0}")]
    MetadataEncoding(String),

    /// The framed payload is an image stream that failed to encode or decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters that produced the payload. Every field is optional; absent
/// fields are omitted on write and accepted as missing or `null` on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingParams {
    /// Video codec name (e.g., "libx265").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    /// Constant rate factor used by the transcoder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crf: Option<u32>,
    /// Transcoder speed/size preset name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// Target frame rate; `None` keeps the source rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_fps: Option<u32>,
    /// Long-side resolution cap; `None` keeps the source resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_resolution: Option<u32>,
    /// JPEG quality for image payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    /// Image pathway for image payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pathway: Option<Pathway>,
}

/// Self-describing metadata record stored ahead of the payload.
///
/// Serialized as compact JSON. Keys written by the first packaging tool
/// (`orig_name`, `container_version`, `compressed_size`) are accepted as
/// aliases on read, and its `compressed_sha1` digest is kept and checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    #[serde(alias = "orig_name")]
    pub original_filename: String,

    #[serde(alias = "container_version", default = "default_version")]
    pub format_version: String,

    #[serde(flatten)]
    pub params: EncodingParams,

    /// UTC creation time, ISO-8601.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Lowercase hex SHA-256 of the payload. When absent, decode skips
    /// verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_sha256: Option<String>,

    /// Lowercase hex SHA-1 of the payload, from older containers. Checked on
    /// decode only when no SHA-256 is recorded.
    #[serde(
        rename = "compressed_sha1",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub legacy_sha1: Option<String>,

    #[serde(
        default,
        alias = "compressed_size",
        skip_serializing_if = "Option::is_none"
    )]
    pub payload_size: Option<u64>,
}

fn default_version() -> String {
    FORMAT_VERSION.to_string()
}

impl ContainerMetadata {
    /// Metadata for a payload named `original_filename`, stamped with the current time.
    pub fn new(original_filename: impl Into<String>) -> Self {
        Self {
            original_filename: original_filename.into(),
            format_version: default_version(),
            params: EncodingParams::default(),
            timestamp: Some(Utc::now()),
            payload_sha256: None,
            legacy_sha1: None,
            payload_size: None,
        }
    }

    pub fn with_params(mut self, params: EncodingParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Record the payload fingerprint.
    pub fn with_payload(mut self, digest: &Digest, size: u64) -> Self {
        self.payload_sha256 = Some(digest.to_hex());
        self.legacy_sha1 = None;
        self.payload_size = Some(size);
        self
    }

    /// Whether decode has a recorded digest to verify against.
    pub fn has_digest(&self) -> bool {
        self.payload_sha256.is_some() || self.legacy_sha1.is_some()
    }

    /// Compact JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, ContainerError> {
        serde_json::to_vec(self).map_err(|e| ContainerError::MetadataEncoding(e.to_string()))
    }

    /// Parse a metadata record from raw bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, FormatError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| FormatError::MalformedMetadata(format!("invalid UTF-8: {e}")))?;
        serde_json::from_str(text).map_err(|e| FormatError::MalformedMetadata(e.to_string()))
    }
}
