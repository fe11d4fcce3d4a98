//! Streaming container I/O.
//!
//! Payloads move in [`CHUNK_SIZE`] blocks, so memory use does not depend on
//! payload size. Only the metadata record is held in memory.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use super::frame::{check_magic, hash_and_verify, HEADER_LEN, MAGIC};
use super::{ContainerError, ContainerMetadata, FormatError};
use crate::integrity::{
    self, copy_hashed, copy_with_digest, digest_reader, Digest, IntegrityError, CHUNK_SIZE,
};

/// Result of packing a payload stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packed {
    /// Total container bytes written, header included.
    pub written: u64,
    pub payload_len: u64,
    /// Digest of the payload bytes actually written.
    pub digest: Digest,
}

/// Result of unpacking a container stream.
#[derive(Debug, Clone)]
pub struct Unpacked {
    pub metadata: ContainerMetadata,
    /// Payload bytes written to the destination.
    pub payload_len: u64,
    /// Digest of the payload as written.
    pub digest: Digest,
}

/// Read into `buf` until it is full or the reader is exhausted.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Write magic, length and metadata. Returns the header size in bytes.
pub fn write_header<W: Write>(
    writer: &mut W,
    metadata: &ContainerMetadata,
) -> Result<u64, ContainerError> {
    let meta = metadata.to_json()?;
    writer.write_all(MAGIC)?;
    writer.write_all(&(meta.len() as u64).to_le_bytes())?;
    writer.write_all(&meta)?;
    Ok((HEADER_LEN + meta.len()) as u64)
}

/// Parse the header from `reader`, leaving it positioned at the payload.
///
/// `available` is the total stream length when known (e.g., a file size); it
/// lets an oversized metadata length fail before any allocation.
pub fn read_header<R: Read>(
    reader: &mut R,
    available: Option<u64>,
) -> Result<ContainerMetadata, ContainerError> {
    let mut magic = [0u8; 5];
    let n = read_full(reader, &mut magic)?;
    check_magic(&magic[..n])?;

    let mut len_bytes = [0u8; 8];
    let n = read_full(reader, &mut len_bytes)?;
    if n < len_bytes.len() {
        return Err(FormatError::Truncated {
            needed: HEADER_LEN as u64,
            available: (MAGIC.len() + n) as u64,
        }
        .into());
    }
    let meta_len = u64::from_le_bytes(len_bytes);

    if let Some(total) = available {
        let remaining = total.saturating_sub(HEADER_LEN as u64);
        if meta_len > remaining {
            return Err(FormatError::Truncated {
                needed: meta_len,
                available: remaining,
            }
            .into());
        }
    }

    // `take` bounds the read; the buffer grows only as bytes actually arrive.
    let mut meta = Vec::new();
    reader.by_ref().take(meta_len).read_to_end(&mut meta)?;
    if (meta.len() as u64) < meta_len {
        return Err(FormatError::Truncated {
            needed: meta_len,
            available: meta.len() as u64,
        }
        .into());
    }

    Ok(ContainerMetadata::from_json(&meta)?)
}

/// Frame everything `payload` yields behind `metadata`, block by block.
///
/// `metadata` is written as given; use [`pack_source`] or [`pack_file`] to
/// have the digest and size filled in.
pub fn pack_reader<R: Read, W: Write>(
    payload: R,
    metadata: &ContainerMetadata,
    mut out: W,
) -> Result<Packed, ContainerError> {
    let header = write_header(&mut out, metadata)?;
    let (digest, payload_len) = copy_with_digest(payload, &mut out)?;
    Ok(Packed {
        written: header + payload_len,
        payload_len,
        digest,
    })
}

/// Two-pass pack of whatever `open` yields.
///
/// The first reader is only hashed, and its digest and size are stamped into
/// `metadata`. The second is framed into `out`. If the second read does not
/// hash to the stamped digest the header would describe other bytes, so this
/// fails with [`IntegrityError::Mismatch`].
pub fn pack_source<R, F, W>(
    mut open: F,
    metadata: ContainerMetadata,
    out: W,
) -> Result<(ContainerMetadata, Packed), ContainerError>
where
    R: Read,
    F: FnMut() -> io::Result<R>,
    W: Write,
{
    let (digest, size) = digest_reader(open()?)?;
    let metadata = metadata.with_payload(&digest, size);
    let packed = pack_reader(open()?, &metadata, out)?;

    if !integrity::verify(&digest, &packed.digest) || packed.payload_len != size {
        warn!(
            file = %metadata.original_filename,
            first_pass = size,
            second_pass = packed.payload_len,
            "payload changed while packing"
        );
        return Err(IntegrityError::Mismatch {
            expected: digest.to_hex(),
            actual: packed.digest.to_hex(),
        }
        .into());
    }
    Ok((metadata, packed))
}

/// Unframe a container stream into `out`, then verify the payload digest.
///
/// The payload is fully written before verification, so on
/// [`ContainerError::Integrity`] the destination still holds the bytes that
/// failed the check.
pub fn unpack_reader<R: Read, W: Write>(
    mut reader: R,
    available: Option<u64>,
    out: W,
) -> Result<Unpacked, ContainerError> {
    let metadata = read_header(&mut reader, available)?;
    let (digest, payload_len) =
        hash_and_verify(&metadata, |hasher| copy_hashed(reader, out, hasher))?;
    debug!(payload_len, "payload unpacked");

    Ok(Unpacked {
        metadata,
        payload_len,
        digest,
    })
}

/// Package the file at `payload_path` into a container at `container_path`.
///
/// The payload is read twice: once to fingerprint it, once to copy it. A file
/// that changes between the two reads is rejected and the partial container
/// removed. Returns the metadata as written.
pub fn pack_file(
    payload_path: impl AsRef<Path>,
    container_path: impl AsRef<Path>,
    metadata: ContainerMetadata,
) -> Result<ContainerMetadata, ContainerError> {
    let payload_path = payload_path.as_ref();
    let container_path = container_path.as_ref();

    let open = || File::open(payload_path).map(|f| BufReader::with_capacity(CHUNK_SIZE, f));
    let mut out = BufWriter::with_capacity(CHUNK_SIZE, File::create(container_path)?);
    let result = pack_source(open, metadata, &mut out).and_then(|packed| {
        out.flush()?;
        Ok(packed)
    });

    let (metadata, packed) = match result {
        Ok(packed) => packed,
        Err(err) => {
            drop(out);
            if let Err(e) = fs::remove_file(container_path) {
                warn!(
                    container = %container_path.display(),
                    error = %e,
                    "could not remove partial container"
                );
            }
            return Err(err);
        }
    };

    info!(
        payload = %payload_path.display(),
        container = %container_path.display(),
        size = packed.payload_len,
        written = packed.written,
        "container written"
    );
    Ok(metadata)
}

/// Unpack the container at `container_path`, writing the payload to `out_path`.
pub fn unpack_file(
    container_path: impl AsRef<Path>,
    out_path: impl AsRef<Path>,
) -> Result<ContainerMetadata, ContainerError> {
    let container_path = container_path.as_ref();
    let out_path = out_path.as_ref();

    let file = File::open(container_path)?;
    let available = file.metadata()?.len();
    let reader = BufReader::with_capacity(CHUNK_SIZE, file);
    let mut out = BufWriter::with_capacity(CHUNK_SIZE, File::create(out_path)?);

    let result = unpack_reader(reader, Some(available), &mut out);
    // Flush even on integrity failure so the rejected payload is left for inspection.
    out.flush()?;
    let unpacked = result?;

    info!(
        container = %container_path.display(),
        payload = %out_path.display(),
        size = unpacked.payload_len,
        "container unpacked"
    );
    Ok(unpacked.metadata)
}

/// Read only the metadata record of the container at `path`.
pub fn read_metadata(path: impl AsRef<Path>) -> Result<ContainerMetadata, ContainerError> {
    let file = File::open(path.as_ref())?;
    let available = file.metadata()?.len();
    read_header(&mut BufReader::new(file), Some(available))
}
