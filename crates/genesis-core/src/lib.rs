//! Genesis Core - media packaging library
//!
//! This crate provides the core functionality for Genesis: the self-describing
//! `GENV1` container, payload integrity fingerprints, the adaptive image codec,
//! and the typed contract for the external video transcoder.

pub mod codec;
pub mod compress;
pub mod container;
pub mod integrity;
pub mod transcode;

pub use codec::{
    decode_image, encode_image, CodecError, CodecOptions, DecodedImage, EncodedImage, ImageCodec,
    Pathway,
};
pub use compress::{Compressor, Zlib};
pub use container::{
    decode_image_container, encode_image_container, pack_file, read_metadata, unpack_file,
    Container, ContainerError, ContainerMetadata, EncodingParams, FormatError,
};
pub use integrity::{Digest, IntegrityError, LegacyDigest};
pub use transcode::{
    package_video, unique_name, Ffmpeg, PackageError, Preset, TranscodeError, TranscodeOutcome,
    TranscodeParams, Transcoder,
};

/// Library version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
