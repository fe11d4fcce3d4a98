//! Palette pathway: color table + index matrix.
//!
//! Images with at most 256 distinct colors are indexed exactly, with palette
//! slots assigned in order of first appearance (row-major scan). Images with
//! more colors are reduced with median cut to exactly 256 slots. In both cases
//! the index matrix has one entry per pixel, so dimensions are always exact.

use std::collections::HashMap;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::lossy::EncodeError;
use super::{CodecError, DecodedImage};

/// Maximum number of palette slots.
pub const MAX_PALETTE_COLORS: usize = 256;

/// An image expressed as a color table plus one index per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteImage {
    pub width: u32,
    pub height: u32,
    /// Color table, at most 256 RGB entries.
    pub palette: Vec<[u8; 3]>,
    /// Row-major palette indices, `width * height` entries.
    pub indices: Vec<u8>,
}

/// Serialized form of a [`PaletteImage`]: dimensions, flattened RGB triples
/// and flattened row-major indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteRecord {
    pub width: u32,
    pub height: u32,
    pub palette: Vec<u8>,
    pub indices: Vec<u8>,
}

impl PaletteImage {
    /// Number of entries in the color table.
    pub fn palette_len(&self) -> usize {
        self.palette.len()
    }

    /// Check dimensions and that every index names a palette slot.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.width == 0 || self.height == 0 {
            return Err(CodecError::InvalidRecord(format!(
                "dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.palette.is_empty() || self.palette.len() > MAX_PALETTE_COLORS {
            return Err(CodecError::InvalidRecord(format!(
                "palette must hold 1..={} colors, got {}",
                MAX_PALETTE_COLORS,
                self.palette.len()
            )));
        }
        let expected = (self.width as usize) * (self.height as usize);
        if self.indices.len() != expected {
            return Err(CodecError::InvalidRecord(format!(
                "index matrix holds {} entries, expected {} ({}x{})",
                self.indices.len(),
                expected,
                self.width,
                self.height
            )));
        }
        if let Some((position, &index)) = self
            .indices
            .iter()
            .enumerate()
            .find(|(_, &i)| usize::from(i) >= self.palette.len())
        {
            return Err(CodecError::IndexOutOfRange {
                index,
                palette_len: self.palette.len(),
                position,
            });
        }
        Ok(())
    }

    /// Map every index through the palette.
    pub fn to_decoded(&self) -> Result<DecodedImage, CodecError> {
        self.validate()?;
        let mut pixels = Vec::with_capacity(self.indices.len() * 3);
        for &index in &self.indices {
            pixels.extend_from_slice(&self.palette[usize::from(index)]);
        }
        Ok(DecodedImage::new(self.width, self.height, pixels))
    }

    pub fn to_record(&self) -> PaletteRecord {
        PaletteRecord {
            width: self.width,
            height: self.height,
            palette: self.palette.iter().flatten().copied().collect(),
            indices: self.indices.clone(),
        }
    }

    /// Rebuild from a record, validating it fully.
    pub fn from_record(record: PaletteRecord) -> Result<Self, CodecError> {
        if record.palette.len() % 3 != 0 {
            return Err(CodecError::InvalidRecord(format!(
                "flattened palette length {} is not a multiple of 3",
                record.palette.len()
            )));
        }
        let palette = record
            .palette
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        let image = Self {
            width: record.width,
            height: record.height,
            palette,
            indices: record.indices,
        };
        image.validate()?;
        Ok(image)
    }
}

impl PaletteRecord {
    pub fn to_json(&self) -> Result<Vec<u8>, EncodeError> {
        serde_json::to_vec(self).map_err(|e| EncodeError::RecordFailed(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Index an image, exactly when it has at most 256 colors.
pub fn quantize(image: &RgbImage) -> PaletteImage {
    let (width, height) = image.dimensions();
    let mut lookup: HashMap<[u8; 3], u8> = HashMap::new();
    let mut palette: Vec<[u8; 3]> = Vec::new();
    let mut indices = Vec::with_capacity((width as usize) * (height as usize));

    for pixel in image.pixels() {
        let color = pixel.0;
        let index = match lookup.get(&color) {
            Some(&index) => index,
            None => {
                if palette.len() == MAX_PALETTE_COLORS {
                    return median_cut(image);
                }
                let index = palette.len() as u8;
                palette.push(color);
                lookup.insert(color, index);
                index
            }
        };
        indices.push(index);
    }

    PaletteImage {
        width,
        height,
        palette,
        indices,
    }
}

#[derive(Debug, Clone, Copy)]
struct ColorCount {
    rgb: [u8; 3],
    count: u32,
}

struct ColorBox {
    colors: Vec<ColorCount>,
}

impl ColorBox {
    /// Widest channel and its extent.
    fn widest_channel(&self) -> (usize, u8) {
        let mut best = (0, 0);
        for channel in 0..3 {
            let (lo, hi) = self
                .colors
                .iter()
                .fold((u8::MAX, u8::MIN), |(lo, hi), c| {
                    (lo.min(c.rgb[channel]), hi.max(c.rgb[channel]))
                });
            let range = hi.saturating_sub(lo);
            if range > best.1 {
                best = (channel, range);
            }
        }
        best
    }

    fn can_split(&self) -> bool {
        self.colors.len() > 1
    }

    /// Split at the population median along the widest channel.
    fn split(mut self) -> (ColorBox, ColorBox) {
        let (channel, _) = self.widest_channel();
        // Stable sort keeps the pre-sorted key order for ties.
        self.colors.sort_by_key(|c| c.rgb[channel]);
        let total: u64 = self.colors.iter().map(|c| u64::from(c.count)).sum();
        let mut acc = 0u64;
        let mut cut = self.colors.len() / 2;
        for (i, c) in self.colors.iter().enumerate() {
            acc += u64::from(c.count);
            if acc * 2 >= total {
                cut = i + 1;
                break;
            }
        }
        let cut = cut.clamp(1, self.colors.len() - 1);
        let right = self.colors.split_off(cut);
        (self, ColorBox { colors: right })
    }

    /// Population-weighted mean color.
    fn mean(&self) -> [u8; 3] {
        let mut sums = [0u64; 3];
        let mut total = 0u64;
        for c in &self.colors {
            let n = u64::from(c.count);
            for channel in 0..3 {
                sums[channel] += u64::from(c.rgb[channel]) * n;
            }
            total += n;
        }
        let total = total.max(1);
        [
            ((sums[0] + total / 2) / total) as u8,
            ((sums[1] + total / 2) / total) as u8,
            ((sums[2] + total / 2) / total) as u8,
        ]
    }
}

fn median_cut(image: &RgbImage) -> PaletteImage {
    let (width, height) = image.dimensions();

    let mut histogram: HashMap<[u8; 3], u32> = HashMap::new();
    for pixel in image.pixels() {
        *histogram.entry(pixel.0).or_insert(0) += 1;
    }
    let mut colors: Vec<ColorCount> = histogram
        .into_iter()
        .map(|(rgb, count)| ColorCount { rgb, count })
        .collect();
    colors.sort_unstable_by_key(|c| c.rgb);

    let mut boxes = vec![ColorBox { colors }];
    while boxes.len() < MAX_PALETTE_COLORS {
        let candidate = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.can_split())
            .max_by_key(|(i, b)| (b.widest_channel().1, std::cmp::Reverse(*i)))
            .map(|(i, _)| i);
        let Some(idx) = candidate else {
            break;
        };
        let (left, right) = boxes.remove(idx).split();
        boxes.push(left);
        boxes.push(right);
    }

    let mut lookup: HashMap<[u8; 3], u8> = HashMap::new();
    let mut palette = Vec::with_capacity(boxes.len());
    for (slot, color_box) in boxes.iter().enumerate() {
        palette.push(color_box.mean());
        for c in &color_box.colors {
            lookup.insert(c.rgb, slot as u8);
        }
    }

    let indices = image.pixels().map(|p| lookup[&p.0]).collect();

    PaletteImage {
        width,
        height,
        palette,
        indices,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use image::Rgb;
    use proptest::prelude::*;

    /// Strategy: a small image drawn from a palette of at most 16 colors.
    fn few_color_image() -> impl Strategy<Value = RgbImage> {
        (1u32..=24, 1u32..=24, prop::collection::vec(any::<[u8; 3]>(), 1..=16)).prop_flat_map(
            |(w, h, colors)| {
                let n = colors.len();
                prop::collection::vec(0..n, (w * h) as usize).prop_map(move |picks| {
                    let mut raw = Vec::with_capacity(picks.len() * 3);
                    for p in picks {
                        raw.extend_from_slice(&colors[p]);
                    }
                    RgbImage::from_raw(w, h, raw).unwrap()
                })
            },
        )
    }

    proptest! {
        /// Property: images with at most 256 colors reconstruct pixel-exactly.
        #[test]
        fn prop_few_colors_lossless(img in few_color_image()) {
            let decoded = quantize(&img).to_decoded().unwrap();
            prop_assert_eq!(decoded.pixels, img.into_raw());
        }

        /// Property: any image keeps its dimensions and a palette of at most 256.
        #[test]
        fn prop_dimensions_preserved(
            (w, h) in (1u32..=40, 1u32..=40),
            seed in any::<u32>(),
        ) {
            let img = RgbImage::from_fn(w, h, |x, y| {
                let v = (x.wrapping_mul(2654435761) ^ y.wrapping_mul(40503) ^ seed).to_le_bytes();
                Rgb([v[0], v[1], v[2]])
            });
            let indexed = quantize(&img);
            prop_assert!(indexed.palette_len() <= MAX_PALETTE_COLORS);
            let decoded = indexed.to_decoded().unwrap();
            prop_assert_eq!((decoded.width, decoded.height), (w, h));
        }
    }
}
