//! External `ffmpeg` process backend.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use super::{TranscodeError, TranscodeOutcome, TranscodeParams, Transcoder};

/// Default wall-clock limit for one transcode.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Runs the `ffmpeg` executable with a fixed argument list. No shell is involved.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
    timeout: Duration,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Ffmpeg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Argument vector for one run, excluding the program name.
    pub fn args(input: &Path, output: &Path, params: &TranscodeParams) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input.into()];
        args.extend(
            [
                "-vf".to_string(),
                params.video_filter(),
                "-c:v".to_string(),
                params.codec.clone(),
                "-preset".to_string(),
                params.preset.to_string(),
                "-crf".to_string(),
                params.effective_crf().to_string(),
                "-c:a".to_string(),
                "aac".to_string(),
                "-b:a".to_string(),
                params.audio_bitrate.clone(),
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(output.into());
        args
    }

    fn command_line(&self, args: &[OsString]) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(args.iter().map(OsString::as_os_str))
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Transcoder for Ffmpeg {
    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        params: &TranscodeParams,
    ) -> Result<TranscodeOutcome, TranscodeError> {
        let args = Self::args(input, output, params);
        let cmd = self.command_line(&args);
        debug!(%cmd, "spawning transcoder");

        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                cmd: cmd.clone(),
                source,
            })?;

        // Drained on its own thread so a chatty encoder cannot fill the pipe and stall.
        let stderr = child.stderr.take();
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf);
            }
            String::from_utf8_lossy(&buf).into_owned()
        });

        let status = match child.wait_timeout(self.timeout)? {
            Some(status) => status,
            None => {
                warn!(%cmd, timeout = ?self.timeout, "transcoder timed out, killing");
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                return Err(TranscodeError::TimedOut {
                    after: self.timeout,
                });
            }
        };
        let stderr = reader.join().unwrap_or_default();

        if !status.success() {
            return Err(TranscodeError::Failed {
                status: status.code(),
                stderr,
            });
        }

        let elapsed = started.elapsed();
        let output_size = std::fs::metadata(output)?.len();
        info!(
            input = %input.display(),
            output = %output.display(),
            output_size,
            elapsed = ?elapsed,
            "transcode finished"
        );
        Ok(TranscodeOutcome {
            output: output.to_path_buf(),
            output_size,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::Preset;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_args_default() {
        let args = Ffmpeg::args(
            Path::new("in.mov"),
            Path::new("out.mp4"),
            &TranscodeParams::default(),
        );
        assert_eq!(
            strings(&args),
            [
                "-y", "-i", "in.mov", "-vf", "null", "-c:v", "libx265", "-preset", "medium",
                "-crf", "28", "-c:a", "aac", "-b:a", "128k", "out.mp4",
            ]
        );
    }

    #[test]
    fn test_args_with_scaling_and_fps() {
        let params = TranscodeParams {
            crf: 99,
            preset: Preset::Veryslow,
            target_fps: Some(30),
            max_resolution: Some(1080),
            ..Default::default()
        };
        let args = strings(&Ffmpeg::args(Path::new("a b.mov"), Path::new("o.mp4"), &params));
        // Paths with spaces stay a single argument
        assert_eq!(args[2], "a b.mov");
        assert_eq!(
            args[4],
            "scale='if(gt(iw,ih),1080,-2)':'if(gt(ih,iw),1080,-2)':force_original_aspect_ratio=decrease,fps=30"
        );
        assert_eq!(args[8], "veryslow");
        assert_eq!(args[10], "36");
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = Ffmpeg::new(dir.path().join("no-such-ffmpeg"));
        let result = ffmpeg.transcode(
            &dir.path().join("in.mov"),
            &dir.path().join("out.mp4"),
            &TranscodeParams::default(),
        );
        match result {
            Err(TranscodeError::Spawn { cmd, .. }) => assert!(cmd.contains("no-such-ffmpeg")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_failed() {
        let ffmpeg = Ffmpeg::new("false");
        let dir = tempfile::tempdir().unwrap();
        let result = ffmpeg.transcode(
            &dir.path().join("in.mov"),
            &dir.path().join("out.mp4"),
            &TranscodeParams::default(),
        );
        assert!(matches!(result, Err(TranscodeError::Failed { status: Some(1), .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_transcoder_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let stub = dir.path().join("slow-ffmpeg");
        std::fs::write(&stub, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let ffmpeg = Ffmpeg::new(&stub).with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let result = ffmpeg.transcode(
            &dir.path().join("in.mov"),
            &dir.path().join("out.mp4"),
            &TranscodeParams::default(),
        );
        match result {
            Err(TranscodeError::TimedOut { after }) => {
                assert_eq!(after, Duration::from_millis(200))
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_run_keeps_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let stub = dir.path().join("broken-ffmpeg");
        std::fs::write(&stub, "#!/bin/sh\necho 'Unknown encoder' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let result = Ffmpeg::new(&stub).transcode(
            &dir.path().join("in.mov"),
            &dir.path().join("out.mp4"),
            &TranscodeParams::default(),
        );
        match result {
            Err(TranscodeError::Failed { status, stderr }) => {
                assert_eq!(status, Some(3));
                assert!(stderr.contains("Unknown encoder"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let ffmpeg = Ffmpeg::default();
        assert_eq!(ffmpeg.program(), Path::new("ffmpeg"));
        assert_eq!(ffmpeg.timeout(), DEFAULT_TIMEOUT);
        let short = ffmpeg.with_timeout(Duration::from_secs(5));
        assert_eq!(short.timeout(), Duration::from_secs(5));
    }
}
