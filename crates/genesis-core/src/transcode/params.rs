//! Transcoding parameters and output naming.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::container::EncodingParams;

/// Default constant rate factor.
pub const DEFAULT_CRF: u8 = 28;

/// Accepted constant rate factor range.
pub const CRF_RANGE: std::ops::RangeInclusive<u8> = 18..=36;

/// Default video codec.
pub const DEFAULT_CODEC: &str = "libx265";

/// Default audio bitrate.
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Encoder speed/size trade-off. Slower presets give smaller files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    #[default]
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl Preset {
    pub const ALL: [Preset; 9] = [
        Preset::Ultrafast,
        Preset::Superfast,
        Preset::Veryfast,
        Preset::Faster,
        Preset::Fast,
        Preset::Medium,
        Preset::Slow,
        Preset::Slower,
        Preset::Veryslow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Ultrafast => "ultrafast",
            Preset::Superfast => "superfast",
            Preset::Veryfast => "veryfast",
            Preset::Faster => "faster",
            Preset::Fast => "fast",
            Preset::Medium => "medium",
            Preset::Slow => "slow",
            Preset::Slower => "slower",
            Preset::Veryslow => "veryslow",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown preset {s:?}"))
    }
}

/// Flat parameter set handed to the transcoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeParams {
    /// Video codec name.
    pub codec: String,
    /// Constant rate factor (lower = better quality, larger file). Clamped to 18-36.
    pub crf: u8,
    pub preset: Preset,
    /// Target frame rate; `None` keeps the source.
    pub target_fps: Option<u32>,
    /// Long-side resolution cap; `None` keeps the source.
    pub max_resolution: Option<u32>,
    /// Audio bitrate, e.g. "128k".
    pub audio_bitrate: String,
}

impl Default for TranscodeParams {
    fn default() -> Self {
        Self {
            codec: DEFAULT_CODEC.to_string(),
            crf: DEFAULT_CRF,
            preset: Preset::default(),
            target_fps: None,
            max_resolution: None,
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
        }
    }
}

impl TranscodeParams {
    /// CRF clamped into the accepted range.
    pub fn effective_crf(&self) -> u8 {
        self.crf.clamp(*CRF_RANGE.start(), *CRF_RANGE.end())
    }

    /// Video filter chain: long-side scale cap, then frame rate, or `null`.
    pub fn video_filter(&self) -> String {
        let mut parts = Vec::new();
        if let Some(res) = self.max_resolution.filter(|&r| r > 0) {
            parts.push(format!(
                "scale='if(gt(iw,ih),{res},-2)':'if(gt(ih,iw),{res},-2)':force_original_aspect_ratio=decrease"
            ));
        }
        if let Some(fps) = self.target_fps.filter(|&f| f > 0) {
            parts.push(format!("fps={fps}"));
        }
        if parts.is_empty() {
            "null".to_string()
        } else {
            parts.join(",")
        }
    }

    /// Container metadata view of these parameters.
    pub fn to_encoding_params(&self) -> EncodingParams {
        EncodingParams {
            codec: Some(self.codec.clone()),
            crf: Some(u32::from(self.effective_crf())),
            preset: Some(self.preset.to_string()),
            target_fps: self.target_fps.filter(|&f| f > 0),
            max_resolution: self.max_resolution.filter(|&r| r > 0),
            ..Default::default()
        }
    }
}

/// Output file name encoding the parameters, e.g. `clip_crf28_fpsSRC_r720.mp4`.
pub fn unique_name(
    stem: &str,
    crf: u8,
    fps: Option<u32>,
    res: Option<u32>,
    ext: &str,
) -> String {
    let fps = match fps.filter(|&f| f > 0) {
        Some(f) => format!("fps{f}"),
        None => "fpsSRC".to_string(),
    };
    let res = match res.filter(|&r| r > 0) {
        Some(r) => format!("r{r}"),
        None => "rSRC".to_string(),
    };
    format!("{stem}_crf{crf}_{fps}_{res}.{ext}")
}
