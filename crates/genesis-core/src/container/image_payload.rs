//! Containers whose payload is an adaptive-codec image stream.

use image::DynamicImage;
use tracing::info;

use super::frame::{decode, pack};
use super::{ContainerError, ContainerMetadata, EncodingParams};
use crate::codec::{CodecOptions, DecodedImage, EncodedImage, ImageCodec, Pathway};

/// Encode `image` and frame the stream, recording the pathway and quality.
pub fn encode_image_container(
    image: &DynamicImage,
    original_filename: impl Into<String>,
    options: CodecOptions,
) -> Result<Vec<u8>, ContainerError> {
    let encoded = ImageCodec::new(options).encode(image)?;
    frame_image(&encoded, original_filename, &options)
}

/// Frame an already encoded image stream.
///
/// `options` must be the ones the stream was encoded with; quality is only
/// recorded for the lossy pathway.
pub fn frame_image(
    encoded: &EncodedImage,
    original_filename: impl Into<String>,
    options: &CodecOptions,
) -> Result<Vec<u8>, ContainerError> {
    let metadata = ContainerMetadata::new(original_filename).with_params(EncodingParams {
        quality: (encoded.pathway == Pathway::Lossy).then_some(options.quality),
        pathway: Some(encoded.pathway),
        ..Default::default()
    });
    info!(
        file = %metadata.original_filename,
        pathway = %encoded.pathway,
        width = encoded.width,
        height = encoded.height,
        "image container built"
    );
    pack(&encoded.bytes, metadata)
}

/// Unframe, verify and decode an image container.
///
/// The recorded pathway is informational only; the stream identifies itself.
pub fn decode_image_container(
    bytes: &[u8],
) -> Result<(ContainerMetadata, DecodedImage), ContainerError> {
    let container = decode(bytes)?;
    let image = ImageCodec::default().decode(&container.payload)?;
    Ok((container.metadata, image))
}
