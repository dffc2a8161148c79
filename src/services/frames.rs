use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

/// Reports a video's duration and extracts single raster frames at arbitrary
/// timestamps. Codec internals are opaque to the rest of the system.
#[async_trait]
pub trait FrameSampler: Send + Sync {
    /// Total duration of the video in seconds.
    async fn probe_duration(&self, video: &Path) -> Result<f64, FrameError>;

    /// Write one frame at `at` to `dest` as an image file.
    async fn grab_frame(&self, video: &Path, at: Duration, dest: &Path)
        -> Result<(), FrameError>;
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Frame sampler shelling out to `ffprobe`/`ffmpeg`.
pub struct FfmpegFrameSampler {
    width: u32,
    height: u32,
}

impl FfmpegFrameSampler {
    /// Fixed 640x480 target raster; plenty for QR grids, cheap to decode.
    pub fn new() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

impl Default for FfmpegFrameSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSampler for FfmpegFrameSampler {
    async fn probe_duration(&self, video: &Path) -> Result<f64, FrameError> {
        let output = Command::new("ffprobe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(video)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(FrameError::Spawn)?;

        if !output.status.success() {
            return Err(FrameError::Probe {
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let probe: FfprobeOutput =
            serde_json::from_slice(&output.stdout).map_err(FrameError::Parse)?;

        probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .ok_or(FrameError::MissingDuration)
    }

    async fn grab_frame(
        &self,
        video: &Path,
        at: Duration,
        dest: &Path,
    ) -> Result<(), FrameError> {
        let output = Command::new("ffmpeg")
            .args(["-ss", &format!("{:.3}", at.as_secs_f64()), "-i"])
            .arg(video)
            .args([
                "-frames:v",
                "1",
                "-vf",
                &format!("scale={}:{}", self.width, self.height),
                "-y",
            ])
            .arg(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(FrameError::Spawn)?;

        if !output.status.success() {
            return Err(FrameError::Snapshot {
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        // Seeking past the last frame exits cleanly without writing anything.
        if !dest.exists() {
            return Err(FrameError::NoFrame);
        }

        Ok(())
    }
}

/// Removes a per-frame scratch file when dropped, on success and failure
/// paths alike.
pub struct TempFrame {
    path: PathBuf,
}

impl TempFrame {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFrame {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("failed to spawn ffmpeg/ffprobe: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("ffprobe failed: {stderr}")]
    Probe { stderr: String },

    #[error("ffmpeg snapshot failed: {stderr}")]
    Snapshot { stderr: String },

    #[error("failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("ffprobe reported no duration")]
    MissingDuration,

    #[error("no frame produced at requested timestamp")]
    NoFrame,
}
