//! Payload content digests.
//!
//! Digests are SHA-256 over the payload bytes only. The container prefix
//! (magic, length, metadata) is never hashed, so re-stamping metadata does not
//! invalidate a payload. All hashing is done over bounded chunks so memory use
//! is independent of payload size.
//!
//! Containers written by the first packaging tool carry a SHA-1 digest
//! instead. It is still checked on read, see [`LegacyDigest`].

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// Block size used for every streaming read/write in this crate (1 MiB).
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// A SHA-256 content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Lowercase hex form, as stored in container metadata.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Error parsing a hex digest string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid digest {input:?}: expected {expected} hex characters")]
pub struct ParseDigestError {
    pub input: String,
    pub expected: usize,
}

fn parse_hex<const N: usize>(s: &str) -> Result<[u8; N], ParseDigestError> {
    let mut out = [0u8; N];
    hex::decode_to_slice(s.trim(), &mut out).map_err(|_| ParseDigestError {
        input: s.to_string(),
        expected: N * 2,
    })?;
    Ok(out)
}

impl FromStr for Digest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex(s).map(Self)
    }
}

/// A SHA-1 payload digest, recorded as `compressed_sha1` by older containers.
///
/// Never written by this crate. It exists so those containers keep their
/// integrity check instead of falling back to unverified decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LegacyDigest([u8; 20]);

impl LegacyDigest {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for LegacyDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for LegacyDigest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex(s).map(Self)
    }
}

/// Integrity failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntegrityError {
    /// The payload does not hash to the digest recorded at encode time.
    #[error("payload digest mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },

    /// The recorded digest is not a well-formed hex string of the right length.
    #[error("recorded digest is malformed: {0}")]
    MalformedDigest(String),
}

/// Incremental digest state.
///
/// Always computes SHA-256. A hasher built with [`Hasher::with_legacy`] also
/// computes SHA-1 over the same bytes.
#[derive(Clone, Default)]
pub struct Hasher {
    inner: Sha256,
    legacy: Option<Sha1>,
    len: u64,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_legacy() -> Self {
        Self {
            legacy: Some(Sha1::new()),
            ..Self::default()
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
        if let Some(legacy) = &mut self.legacy {
            legacy.update(bytes);
        }
        self.len += bytes.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finish(self) -> Digest {
        Digest(self.inner.finalize().into())
    }

    /// Finish both digests. The SHA-1 side is `None` unless the hasher was
    /// built with [`Hasher::with_legacy`].
    pub fn finish_with_legacy(self) -> (Digest, Option<LegacyDigest>) {
        let legacy = self.legacy.map(|h| LegacyDigest(h.finalize().into()));
        (Digest(self.inner.finalize().into()), legacy)
    }
}

/// Digest an in-memory buffer, one chunk at a time.
pub fn digest_bytes(bytes: &[u8]) -> Digest {
    let mut hasher = Hasher::new();
    for chunk in bytes.chunks(CHUNK_SIZE) {
        hasher.update(chunk);
    }
    hasher.finish()
}

/// Digest everything `reader` yields. Returns the digest and byte count.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<(Digest, u64)> {
    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    let len = hasher.len();
    Ok((hasher.finish(), len))
}

/// Copy `reader` into `writer` in bounded blocks, feeding every block to `hasher`.
pub fn copy_hashed<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    hasher: &mut Hasher,
) -> io::Result<()> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
    }
    writer.flush()
}

/// Copy `reader` into `writer` while hashing what passes through.
pub fn copy_with_digest<R: Read, W: Write>(reader: R, writer: W) -> io::Result<(Digest, u64)> {
    let mut hasher = Hasher::new();
    copy_hashed(reader, writer, &mut hasher)?;
    let len = hasher.len();
    Ok((hasher.finish(), len))
}

/// Exact digest comparison.
pub fn verify(expected: &Digest, actual: &Digest) -> bool {
    expected == actual
}

/// Check a payload digest against the hex string recorded in metadata.
///
/// A malformed recorded digest is an error, never a silent pass.
pub fn check(recorded: &str, actual: &Digest) -> Result<(), IntegrityError> {
    let expected: Digest = recorded
        .parse()
        .map_err(|_| IntegrityError::MalformedDigest(recorded.to_string()))?;
    if verify(&expected, actual) {
        Ok(())
    } else {
        Err(IntegrityError::Mismatch {
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        })
    }
}

/// [`check`] for a recorded SHA-1 digest.
pub fn check_legacy(recorded: &str, actual: &LegacyDigest) -> Result<(), IntegrityError> {
    let expected: LegacyDigest = recorded
        .parse()
        .map_err(|_| IntegrityError::MalformedDigest(recorded.to_string()))?;
    if expected == *actual {
        Ok(())
    } else {
        Err(IntegrityError::Mismatch {
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        })
    }
}
