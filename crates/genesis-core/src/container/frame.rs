//! In-memory framing.
//!
//! Layout: `MAGIC (5) | META_LEN (u64 LE) | META (META_LEN bytes) | PAYLOAD`.

use std::io;

use tracing::{debug, warn};

use super::{ContainerError, ContainerMetadata, FormatError};
use crate::integrity::{self, digest_bytes, Digest, Hasher, CHUNK_SIZE};

/// Format magic at offset 0.
pub const MAGIC: &[u8; 5] = b"GENV1";

/// Bytes of fixed header before the metadata record (magic + length).
pub const HEADER_LEN: usize = MAGIC.len() + 8;

/// A parsed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub metadata: ContainerMetadata,
    pub payload: Vec<u8>,
}

/// Frame `payload` with `metadata`, byte-exact and without touching either.
pub fn encode(payload: &[u8], metadata: &ContainerMetadata) -> Result<Vec<u8>, ContainerError> {
    let meta = metadata.to_json()?;
    let mut out = Vec::with_capacity(HEADER_LEN + meta.len() + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(meta.len() as u64).to_le_bytes());
    out.extend_from_slice(&meta);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Fingerprint `payload` into `metadata`, then frame it.
pub fn pack(payload: &[u8], metadata: ContainerMetadata) -> Result<Vec<u8>, ContainerError> {
    let metadata = metadata.with_payload(&digest_bytes(payload), payload.len() as u64);
    encode(payload, &metadata)
}

/// Check the magic token against the first bytes seen.
pub(crate) fn check_magic(head: &[u8]) -> Result<(), FormatError> {
    if head.len() >= MAGIC.len() {
        if &head[..MAGIC.len()] == MAGIC {
            return Ok(());
        }
    } else if MAGIC.starts_with(head) {
        return Err(FormatError::Truncated {
            needed: MAGIC.len() as u64,
            available: head.len() as u64,
        });
    }
    Err(FormatError::BadMagic {
        expected: "GENV1",
        found: head[..head.len().min(MAGIC.len())].to_vec(),
    })
}

/// Split a container into metadata and a borrowed payload without verifying it.
pub fn parse(bytes: &[u8]) -> Result<(ContainerMetadata, &[u8]), FormatError> {
    check_magic(bytes)?;

    let rest = &bytes[MAGIC.len()..];
    if rest.len() < 8 {
        return Err(FormatError::Truncated {
            needed: HEADER_LEN as u64,
            available: bytes.len() as u64,
        });
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&rest[..8]);
    let meta_len = u64::from_le_bytes(len_bytes);

    let rest = &rest[8..];
    if meta_len > rest.len() as u64 {
        return Err(FormatError::Truncated {
            needed: meta_len,
            available: rest.len() as u64,
        });
    }
    let (meta, payload) = rest.split_at(meta_len as usize);
    let metadata = ContainerMetadata::from_json(meta)?;
    Ok((metadata, payload))
}

/// Hash a payload with `feed` and check it against every digest `metadata` records.
///
/// SHA-256 is preferred; a legacy SHA-1 is checked only when it is the sole
/// digest. With neither, this only logs (weaker-integrity mode). Returns the
/// SHA-256 digest and byte count of what was fed.
pub(crate) fn hash_and_verify<F>(
    metadata: &ContainerMetadata,
    feed: F,
) -> Result<(Digest, u64), ContainerError>
where
    F: FnOnce(&mut Hasher) -> io::Result<()>,
{
    let mut hasher = match (&metadata.payload_sha256, &metadata.legacy_sha1) {
        (None, Some(_)) => Hasher::with_legacy(),
        _ => Hasher::new(),
    };
    feed(&mut hasher)?;
    let len = hasher.len();
    let (digest, legacy) = hasher.finish_with_legacy();

    match (&metadata.payload_sha256, &metadata.legacy_sha1, legacy) {
        (Some(recorded), _, _) => {
            integrity::check(recorded, &digest)?;
            debug!(digest = %recorded, "payload digest verified");
        }
        (None, Some(recorded), Some(legacy)) => {
            integrity::check_legacy(recorded, &legacy)?;
            debug!(digest = %recorded, "legacy SHA-1 payload digest verified");
        }
        _ => warn!(
            file = %metadata.original_filename,
            "container has no payload digest, skipping verification"
        ),
    }
    Ok((digest, len))
}

/// Verify a payload against its metadata.
///
/// Without a recorded digest this is a no-op (weaker-integrity mode).
pub fn verify_payload(metadata: &ContainerMetadata, payload: &[u8]) -> Result<(), ContainerError> {
    hash_and_verify(metadata, |hasher| {
        for chunk in payload.chunks(CHUNK_SIZE) {
            hasher.update(chunk);
        }
        Ok(())
    })?;
    Ok(())
}

/// Parse and verify a container.
pub fn decode(bytes: &[u8]) -> Result<Container, ContainerError> {
    let (metadata, payload) = parse(bytes)?;
    verify_payload(&metadata, payload)?;
    Ok(Container {
        metadata,
        payload: payload.to_vec(),
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::container::EncodingParams;
    use proptest::prelude::*;

    fn metadata_strategy() -> impl Strategy<Value = ContainerMetadata> {
        (
            "[a-zA-Z0-9_. -]{1,24}",
            proptest::option::of(18u32..=36),
            proptest::option::of(1u32..=120),
            proptest::option::of(prop::sample::select(vec![480u32, 720, 1080, 2160])),
        )
            .prop_map(|(name, crf, fps, res)| {
                ContainerMetadata::new(name).with_params(EncodingParams {
                    codec: Some("libx265".to_string()),
                    crf,
                    target_fps: fps,
                    max_resolution: res,
                    ..Default::default()
                })
            })
    }

    proptest! {
        /// Property: payload and metadata survive a round trip.
        #[test]
        fn prop_round_trip(
            payload in prop::collection::vec(any::<u8>(), 0..4096),
            metadata in metadata_strategy(),
        ) {
            let bytes = encode(&payload, &metadata).unwrap();
            let container = decode(&bytes).unwrap();
            prop_assert_eq!(container.payload, payload);
            prop_assert_eq!(container.metadata, metadata);
        }

        /// Property: anything shorter than the fixed header is a format error.
        #[test]
        fn prop_truncated_header_is_format_error(
            payload in prop::collection::vec(any::<u8>(), 0..64),
            cut in 0usize..HEADER_LEN,
        ) {
            let bytes = pack(&payload, ContainerMetadata::new("t")).unwrap();
            prop_assert!(
                matches!(
                    decode(&bytes[..cut]),
                    Err(ContainerError::Format(FormatError::Truncated { .. }))
                ),
                "expected a truncated-format error"
            );
            prop_assert!(
                matches!(parse(&bytes[..cut]), Err(FormatError::Truncated { .. })),
                "expected a truncated-format error"
            );
        }

        /// Property: flipping any magic byte is always BadMagic.
        #[test]
        fn prop_flipped_magic_is_bad_magic(
            payload in prop::collection::vec(any::<u8>(), 0..64),
            pos in 0usize..MAGIC.len(),
            mask in 1u8..=255,
        ) {
            let mut bytes = pack(&payload, ContainerMetadata::new("t")).unwrap();
            bytes[pos] ^= mask;
            prop_assert!(
                matches!(parse(&bytes), Err(FormatError::BadMagic { .. })),
                "expected BadMagic"
            );
        }

        /// Property: altering a digested payload is always caught.
        #[test]
        fn prop_tampering_detected(
            payload in prop::collection::vec(any::<u8>(), 1..512),
            idx in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let mut bytes = pack(&payload, ContainerMetadata::new("t")).unwrap();
            let offset = bytes.len() - payload.len() + idx.index(payload.len());
            bytes[offset] ^= mask;
            prop_assert!(matches!(decode(&bytes), Err(ContainerError::Integrity(_))));
        }
    }
}
