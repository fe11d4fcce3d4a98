//! Self-describing container format.
//!
//! A container wraps an opaque payload with a JSON metadata record:
//!
//! ```text
//! MAGIC "GENV1" (5 bytes) | META_LEN (u64 LE) | META (UTF-8 JSON) | PAYLOAD
//! ```
//!
//! The payload digest (SHA-256, hex) lives in the metadata and covers the
//! payload only. Older containers record a SHA-1 under `compressed_sha1`
//! instead, which is verified the same way. Containers without any digest
//! decode without verification.
//!
//! - [`encode`] / [`decode`] - in-memory framing
//! - [`pack_file`] / [`unpack_file`] - bounded-memory file I/O
//! - [`encode_image_container`] / [`decode_image_container`] - images via the adaptive codec

mod frame;
mod image_payload;
mod stream;
mod types;

pub use frame::{decode, encode, pack, parse, verify_payload, Container, HEADER_LEN, MAGIC};
pub use image_payload::{decode_image_container, encode_image_container, frame_image};
pub use stream::{
    pack_file, pack_reader, pack_source, read_header, read_metadata, unpack_file, unpack_reader,
    write_header, Packed, Unpacked,
};
pub use types::{ContainerError, ContainerMetadata, EncodingParams, FormatError, FORMAT_VERSION};
