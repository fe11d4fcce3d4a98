//! Generic byte-stream compression.
//!
//! The adaptive image codec runs every encoded image through a general-purpose
//! entropy coder as a final pass. The codec only relies on the round trip being
//! exact, so the backend is abstracted behind the [`Compressor`] trait; the
//! default backend is zlib via `flate2`.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

/// Default compression effort (zlib scale, 0-9).
pub const DEFAULT_LEVEL: u32 = 6;

/// Largest output [`Zlib::decompress`] will produce (512 MiB).
pub const MAX_DECOMPRESSED_LEN: u64 = 512 * 1024 * 1024;

/// Errors reported by a compression backend.
#[derive(Debug, Error)]
pub enum CompressError {
    /// The input could not be compressed.
    #[error("compression failed: {0}")]
    Compress(String),

    /// The input is not a valid compressed stream.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// The stream inflates past the output limit.
    #[error("decompressed stream exceeds {limit} bytes")]
    TooLarge { limit: u64 },
}

/// A lossless byte-stream codec.
///
/// `decompress(compress(bytes, level))` must return `bytes` for every level.
/// The level is an effort knob only and never changes what decodes.
pub trait Compressor {
    fn compress(&self, bytes: &[u8], level: u32) -> Result<Vec<u8>, CompressError>;
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, CompressError>;
}

/// zlib (RFC 1950) backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zlib;

impl Compressor for Zlib {
    fn compress(&self, bytes: &[u8], level: u32) -> Result<Vec<u8>, CompressError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
        encoder
            .write_all(bytes)
            .map_err(|e| CompressError::Compress(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CompressError::Compress(e.to_string()))
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, CompressError> {
        self.decompress_bounded(bytes, MAX_DECOMPRESSED_LEN)
    }
}

impl Zlib {
    /// Inflate `bytes`, failing once the output would pass `limit` bytes.
    pub fn decompress_bounded(&self, bytes: &[u8], limit: u64) -> Result<Vec<u8>, CompressError> {
        let mut out = Vec::new();
        ZlibDecoder::new(bytes)
            .take(limit.saturating_add(1))
            .read_to_end(&mut out)
            .map_err(|e| CompressError::Decompress(e.to_string()))?;
        if out.len() as u64 > limit {
            return Err(CompressError::TooLarge { limit });
        }
        Ok(out)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: every level decodes back to the exact input.
        #[test]
        fn prop_round_trip_any_level(
            data in prop::collection::vec(any::<u8>(), 0..2048),
            level in 0u32..=9,
        ) {
            let packed = Zlib.compress(&data, level).unwrap();
            prop_assert_eq!(Zlib.decompress(&packed).unwrap(), data);
        }
    }
}
