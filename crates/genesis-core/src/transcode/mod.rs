//! Video transcoding contract.
//!
//! The engine itself is external. [`Transcoder`] is the seam; [`Ffmpeg`]
//! drives the `ffmpeg` executable. [`package_video`] transcodes and then frames
//! the result into a `.genesisvid` container.

mod ffmpeg;
mod params;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::container::{pack_file, ContainerError, ContainerMetadata};

pub use ffmpeg::{Ffmpeg, DEFAULT_TIMEOUT};
pub use params::{
    unique_name, Preset, TranscodeParams, CRF_RANGE, DEFAULT_AUDIO_BITRATE, DEFAULT_CODEC,
    DEFAULT_CRF,
};

/// Extension used for packaged video containers.
pub const CONTAINER_EXTENSION: &str = "genesisvid";

/// Errors from running a transcoder.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The engine could not be started.
    #[error("failed to spawn `{cmd}`: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran and exited unsuccessfully.
    #[error("transcoder exited with status {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },

    #[error("transcoder timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from [`package_video`].
#[derive(Debug, Error)]
pub enum PackageError {
    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error(transparent)]
    Container(#[from] ContainerError),
}

/// Result of a successful transcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutcome {
    pub output: PathBuf,
    pub output_size: u64,
    pub elapsed: Duration,
}

/// A video transcoding engine.
pub trait Transcoder {
    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        params: &TranscodeParams,
    ) -> Result<TranscodeOutcome, TranscodeError>;
}

/// Transcode `input` to `output_mp4`, then frame it into `container_path`
/// with `params` and `original_name` recorded.
pub fn package_video<T: Transcoder + ?Sized>(
    transcoder: &T,
    input: &Path,
    output_mp4: &Path,
    container_path: &Path,
    original_name: &str,
    params: &TranscodeParams,
) -> Result<(TranscodeOutcome, ContainerMetadata), PackageError> {
    let outcome = transcoder.transcode(input, output_mp4, params)?;
    let metadata = ContainerMetadata::new(original_name).with_params(params.to_encoding_params());
    let metadata = pack_file(output_mp4, container_path, metadata)?;
    info!(
        container = %container_path.display(),
        original = original_name,
        "video packaged"
    );
    Ok((outcome, metadata))
}
