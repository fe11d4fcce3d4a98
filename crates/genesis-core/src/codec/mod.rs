//! Adaptive image codec.
//!
//! Each image is encoded along one of two pathways, chosen by pixel count:
//!
//! - **Lossy** (`width * height` above the threshold): RGB conversion, JPEG at
//!   the configured quality, then the generic compressor.
//! - **Palette** (at or below the threshold): color table + index matrix
//!   record, then the generic compressor. Exact for images with at most 256
//!   distinct colors.
//!
//! # Stream layout
//!
//! After generic decompression, streams written by this module start with a
//! one-byte pathway tag ([`TAG_LOSSY`] or [`TAG_PALETTE`]) followed by the body
//! (JPEG bytes or a JSON [`PaletteRecord`]). Neither tag can begin a still
//! image or a JSON document, so untagged legacy streams are still told apart
//! and go through sniffing:
//!
//! 1. decode as a standalone still image;
//! 2. otherwise parse as a palette record;
//! 3. otherwise fail with [`CodecError::UnrecognizedImageRepresentation`].

mod lossy;
mod palette;
mod types;

pub use lossy::{decode_jpeg, decode_still, encode_jpeg, EncodeError};
pub use palette::{quantize, PaletteImage, PaletteRecord, MAX_PALETTE_COLORS};
pub use types::{
    CodecError, CodecOptions, DecodedImage, EncodedImage, Pathway, DEFAULT_QUALITY,
    LOSSY_PIXEL_THRESHOLD, TAG_LOSSY, TAG_PALETTE,
};

use image::{DynamicImage, RgbImage};
use tracing::debug;

use crate::compress::{Compressor, Zlib};

/// Adaptive encoder/decoder bound to a generic compressor.
#[derive(Debug, Clone)]
pub struct ImageCodec<C = Zlib> {
    compressor: C,
    options: CodecOptions,
}

impl ImageCodec<Zlib> {
    pub fn new(options: CodecOptions) -> Self {
        Self {
            compressor: Zlib,
            options,
        }
    }
}

impl Default for ImageCodec<Zlib> {
    fn default() -> Self {
        Self::new(CodecOptions::default())
    }
}

impl<C: Compressor> ImageCodec<C> {
    pub fn with_compressor(compressor: C, options: CodecOptions) -> Self {
        Self {
            compressor,
            options,
        }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Encode an image along the pathway its pixel count selects.
    pub fn encode(&self, image: &DynamicImage) -> Result<EncodedImage, CodecError> {
        self.encode_rgb(&image.to_rgb8())
    }

    /// Encode tightly packed RGB bytes (3 per pixel, row-major).
    pub fn encode_pixels(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<EncodedImage, CodecError> {
        let expected = (width as usize) * (height as usize) * 3;
        if pixels.len() != expected {
            return Err(EncodeError::InvalidPixelData {
                expected,
                actual: pixels.len(),
            }
            .into());
        }
        let rgb = RgbImage::from_raw(width, height, pixels.to_vec())
            .ok_or(EncodeError::InvalidDimensions { width, height })?;
        self.encode_rgb(&rgb)
    }

    fn encode_rgb(&self, rgb: &RgbImage) -> Result<EncodedImage, CodecError> {
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(EncodeError::InvalidDimensions { width, height }.into());
        }

        let pathway = self.options.select_pathway(width, height);
        let mut stream = vec![pathway.tag()];
        match pathway {
            Pathway::Lossy => {
                let jpeg = encode_jpeg(rgb.as_raw(), width, height, self.options.quality)?;
                stream.extend_from_slice(&jpeg);
            }
            Pathway::Palette => {
                let indexed = quantize(rgb);
                debug!(colors = indexed.palette_len(), "palette built");
                stream.extend_from_slice(&indexed.to_record().to_json()?);
            }
        }

        let bytes = self
            .compressor
            .compress(&stream, self.options.compression_level)
            .map_err(|e| CodecError::Compress(e.to_string()))?;
        debug!(
            %pathway,
            width,
            height,
            body = stream.len(),
            compressed = bytes.len(),
            "image encoded"
        );

        Ok(EncodedImage {
            bytes,
            pathway,
            width,
            height,
        })
    }

    /// Decode a stream produced by [`ImageCodec::encode`] or a legacy untagged stream.
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError> {
        self.decode_with_pathway(bytes).map(|(image, _)| image)
    }

    /// Decode and report which representation the stream held.
    pub fn decode_with_pathway(&self, bytes: &[u8]) -> Result<(DecodedImage, Pathway), CodecError> {
        let stream = self
            .compressor
            .decompress(bytes)
            .map_err(|e| CodecError::Corrupt(e.to_string()))?;

        match stream.first().copied().and_then(Pathway::from_tag) {
            Some(Pathway::Lossy) => {
                let image = decode_jpeg(&stream[1..])
                    .map_err(|e| CodecError::Corrupt(format!("lossy body: {e}")))?;
                Ok((image, Pathway::Lossy))
            }
            Some(Pathway::Palette) => {
                let record = PaletteRecord::from_json(&stream[1..])
                    .map_err(|e| CodecError::InvalidRecord(e.to_string()))?;
                let image = PaletteImage::from_record(record)?.to_decoded()?;
                Ok((image, Pathway::Palette))
            }
            None => sniff(&stream),
        }
    }
}

/// Untagged stream: still image first, palette record second.
fn sniff(stream: &[u8]) -> Result<(DecodedImage, Pathway), CodecError> {
    match decode_still(stream) {
        Ok(image) => {
            debug!(
                width = image.width,
                height = image.height,
                "untagged stream decoded as still image"
            );
            return Ok((image, Pathway::Lossy));
        }
        Err(e) => debug!(error = %e, "untagged stream is not a still image"),
    }

    match PaletteRecord::from_json(stream) {
        Ok(record) => {
            debug!("untagged stream decoded as palette record");
            let image = PaletteImage::from_record(record)?.to_decoded()?;
            Ok((image, Pathway::Palette))
        }
        Err(e) => {
            debug!(error = %e, "untagged stream is not a palette record");
            Err(CodecError::UnrecognizedImageRepresentation)
        }
    }
}

/// Encode with the default zlib compressor.
pub fn encode_image(
    image: &DynamicImage,
    options: CodecOptions,
) -> Result<EncodedImage, CodecError> {
    ImageCodec::new(options).encode(image)
}

/// Decode with the default zlib compressor.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, CodecError> {
    ImageCodec::new(CodecOptions::default()).decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::CompressError;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::cell::Cell;
    use std::io::Cursor;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 96])
        }))
    }

    fn zlib(bytes: &[u8]) -> Vec<u8> {
        Zlib.compress(bytes, 6).unwrap()
    }

    /// Pass-through backend that remembers the level it was asked for.
    #[derive(Default)]
    struct Stored {
        last_level: Cell<Option<u32>>,
    }

    impl Compressor for Stored {
        fn compress(&self, bytes: &[u8], level: u32) -> Result<Vec<u8>, CompressError> {
            self.last_level.set(Some(level));
            Ok(bytes.to_vec())
        }

        fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, CompressError> {
            Ok(bytes.to_vec())
        }
    }

    struct Broken;

    impl Compressor for Broken {
        fn compress(&self, _: &[u8], _: u32) -> Result<Vec<u8>, CompressError> {
            Err(CompressError::Compress("backend offline".into()))
        }

        fn decompress(&self, _: &[u8]) -> Result<Vec<u8>, CompressError> {
            Err(CompressError::Decompress("backend offline".into()))
        }
    }

    #[test]
    fn test_solid_red_uses_one_entry_palette() {
        let codec = ImageCodec::new(CodecOptions::default());
        let encoded = codec.encode(&solid(10, 10, [255, 0, 0])).unwrap();
        assert_eq!(encoded.pathway, Pathway::Palette);

        let stream = Zlib.decompress(&encoded.bytes).unwrap();
        assert_eq!(stream[0], TAG_PALETTE);
        let record = PaletteRecord::from_json(&stream[1..]).unwrap();
        assert_eq!(record.palette, vec![255, 0, 0]);
        assert_eq!(record.indices, vec![0u8; 100]);

        let decoded = codec.decode(&encoded.bytes).unwrap();
        assert_eq!((decoded.width, decoded.height), (10, 10));
        assert!(decoded.pixels.chunks_exact(3).all(|p| p == [255, 0, 0]));
    }

    #[test]
    fn test_custom_compressor_sees_tagged_stream() {
        let options = CodecOptions::new().with_compression_level(3);
        let codec = ImageCodec::with_compressor(Stored::default(), options);
        let encoded = codec.encode(&solid(3, 2, [0, 128, 255])).unwrap();

        assert_eq!(codec.compressor.last_level.get(), Some(3));
        assert_eq!(encoded.bytes[0], TAG_PALETTE);
        let record = PaletteRecord::from_json(&encoded.bytes[1..]).unwrap();
        assert_eq!(record.palette, vec![0, 128, 255]);

        let decoded = codec.decode(&encoded.bytes).unwrap();
        assert_eq!(decoded.pixels, [0u8, 128, 255].repeat(6));
    }

    #[test]
    fn test_compressor_failures_are_reported() {
        let codec = ImageCodec::with_compressor(Broken, CodecOptions::default());
        assert!(matches!(
            codec.encode(&solid(2, 2, [1, 2, 3])),
            Err(CodecError::Compress(_))
        ));
        assert!(matches!(codec.decode(b"anything"), Err(CodecError::Corrupt(_))));
    }

    #[test]
    fn test_large_image_takes_lossy_pathway() {
        let codec = ImageCodec::new(CodecOptions::new().with_threshold(64 * 64));
        let encoded = codec.encode(&gradient(80, 64)).unwrap();
        assert_eq!(encoded.pathway, Pathway::Lossy);

        let stream = Zlib.decompress(&encoded.bytes).unwrap();
        assert_eq!(stream[0], TAG_LOSSY);
        assert_eq!(&stream[1..3], &[0xFF, 0xD8]);

        let (decoded, pathway) = codec.decode_with_pathway(&encoded.bytes).unwrap();
        assert_eq!(pathway, Pathway::Lossy);
        assert_eq!((decoded.width, decoded.height), (80, 64));
    }

    #[test]
    fn test_rgba_input_is_reduced_to_rgb() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 128])));
        let encoded = encode_image(&img, CodecOptions::default()).unwrap();
        let decoded = decode_image(&encoded.bytes).unwrap();
        assert_eq!(decoded.pixels.len(), 4 * 4 * 3);
        assert_eq!(&decoded.pixels[0..3], &[1, 2, 3]);
    }

    #[test]
    fn test_zero_sized_image_rejected() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(0, 5));
        assert!(matches!(
            encode_image(&img, CodecOptions::default()),
            Err(CodecError::Encode(EncodeError::InvalidDimensions { .. }))
        ));
    }

    #[test]
    fn test_encode_pixels() {
        let codec = ImageCodec::new(CodecOptions::default());
        let pixels = [9u8, 8, 7].repeat(6);
        let encoded = codec.encode_pixels(&pixels, 3, 2).unwrap();
        assert_eq!(codec.decode(&encoded.bytes).unwrap().pixels, pixels);

        assert!(matches!(
            codec.encode_pixels(&pixels, 4, 2),
            Err(CodecError::Encode(EncodeError::InvalidPixelData {
                expected: 24,
                actual: 18
            }))
        ));
        assert!(matches!(
            codec.encode_pixels(&[], 0, 0),
            Err(CodecError::Encode(EncodeError::InvalidDimensions { .. }))
        ));
    }

    #[test]
    fn test_decode_garbage_is_corrupt() {
        assert!(matches!(
            decode_image(b"definitely not zlib"),
            Err(CodecError::Corrupt(_))
        ));
    }

    #[test]
    fn test_decode_unrecognized_representation() {
        let bytes = zlib(b"neither an image nor a record");
        assert!(matches!(
            decode_image(&bytes),
            Err(CodecError::UnrecognizedImageRepresentation)
        ));
    }

    #[test]
    fn test_decode_empty_stream_unrecognized() {
        assert!(matches!(
            decode_image(&zlib(&[])),
            Err(CodecError::UnrecognizedImageRepresentation)
        ));
    }

    #[test]
    fn test_legacy_untagged_jpeg() {
        let jpeg = encode_jpeg(&vec![200u8; 16 * 8 * 3], 16, 8, 90).unwrap();
        let (decoded, pathway) = ImageCodec::new(CodecOptions::default())
            .decode_with_pathway(&zlib(&jpeg))
            .unwrap();
        assert_eq!(pathway, Pathway::Lossy);
        assert_eq!((decoded.width, decoded.height), (16, 8));
    }

    #[test]
    fn test_legacy_untagged_png() {
        let img = RgbImage::from_pixel(2, 2, Rgb([5, 6, 7]));
        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, image::ImageFormat::Png).unwrap();
        let decoded = decode_image(&zlib(png.get_ref())).unwrap();
        assert_eq!(decoded.pixels, vec![5, 6, 7].repeat(4));
    }

    #[test]
    fn test_legacy_untagged_palette_record() {
        let json = br#"{"width":2,"height":1,"palette":[0,0,0,255,255,255],"indices":[1,0]}"#;
        let (decoded, pathway) = ImageCodec::new(CodecOptions::default())
            .decode_with_pathway(&zlib(json))
            .unwrap();
        assert_eq!(pathway, Pathway::Palette);
        assert_eq!(decoded.pixels, vec![255, 255, 255, 0, 0, 0]);
    }

    #[test]
    fn test_legacy_palette_index_out_of_range() {
        let json = br#"{"width":2,"height":1,"palette":[0,0,0],"indices":[0,1]}"#;
        assert!(matches!(
            decode_image(&zlib(json)),
            Err(CodecError::IndexOutOfRange {
                index: 1,
                palette_len: 1,
                position: 1
            })
        ));
    }

    #[test]
    fn test_tagged_palette_index_out_of_range() {
        let mut stream = vec![TAG_PALETTE];
        stream.extend_from_slice(br#"{"width":1,"height":1,"palette":[9,9,9],"indices":[3]}"#);
        assert!(matches!(
            decode_image(&zlib(&stream)),
            Err(CodecError::IndexOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn test_tagged_lossy_with_bad_body_is_corrupt() {
        let stream = [TAG_LOSSY, 1, 2, 3, 4];
        assert!(matches!(
            decode_image(&zlib(&stream)),
            Err(CodecError::Corrupt(_))
        ));
    }

    #[test]
    fn test_pathway_selection_is_deterministic() {
        let codec = ImageCodec::new(CodecOptions::new().with_threshold(50));
        for _ in 0..3 {
            assert_eq!(codec.encode(&solid(7, 7, [1, 1, 1])).unwrap().pathway, Pathway::Palette);
            assert_eq!(codec.encode(&solid(8, 7, [1, 1, 1])).unwrap().pathway, Pathway::Lossy);
        }
    }
}
