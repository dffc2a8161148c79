use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::frames::{FrameError, FrameSampler, TempFrame};
use crate::services::qr::{BarcodeDecoder, DecodeError};

/// One contiguous run of consecutive one-second samples decoding to the same
/// QR payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrInterval {
    pub start_seconds: u64,
    pub content: String,
    pub duration_seconds: u32,
}

/// Seam for the worker: scan a video into its QR timeline.
#[async_trait]
pub trait VideoScanner: Send + Sync {
    async fn scan(&self, video: &Path) -> Result<Vec<QrInterval>, ScanError>;
}

/// Samples a video once per second, decodes each frame, and coalesces
/// consecutive identical detections into timestamped intervals.
pub struct QrTimelineExtractor<S, D> {
    sampler: S,
    decoder: D,
    scratch_dir: PathBuf,
}

impl<S: FrameSampler, D: BarcodeDecoder> QrTimelineExtractor<S, D> {
    pub fn new(sampler: S, decoder: D, scratch_dir: PathBuf) -> Self {
        Self {
            sampler,
            decoder,
            scratch_dir,
        }
    }

    /// Scan the whole video. Samples every integer second `t < duration`
    /// (so `ceil(duration)` frames; a zero-duration video samples nothing).
    ///
    /// A second that fails to sample or decode counts as "no code" and the
    /// scan continues. That makes the output noise-sensitive: one failed
    /// second inside an otherwise continuous code closes the open interval
    /// and a new one starts at the next readable second. Intentionally not
    /// smoothed.
    pub async fn extract_timeline(&self, video: &Path) -> Result<Vec<QrInterval>, ScanError> {
        let duration = self
            .sampler
            .probe_duration(video)
            .await
            .map_err(ScanError::Probe)?;
        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        debug!(video = %video.display(), duration, "scanning video for QR codes");

        let mut intervals = Vec::new();
        let mut open: Option<QrInterval> = None;
        let mut second: u64 = 0;

        while (second as f64) < duration {
            let content = self.decode_second(video, second).await;

            let extends_open = matches!(
                (&open, &content),
                (Some(interval), Some(text)) if interval.content == *text
            );

            if extends_open {
                if let Some(interval) = open.as_mut() {
                    interval.duration_seconds += 1;
                }
            } else {
                if let Some(closed) = open.take() {
                    intervals.push(closed);
                }
                if let Some(text) = content {
                    open = Some(QrInterval {
                        start_seconds: second,
                        content: text,
                        duration_seconds: 1,
                    });
                }
            }

            second += 1;
        }

        if let Some(closed) = open.take() {
            intervals.push(closed);
        }

        Ok(intervals)
    }

    /// Decode one sampled second. Every failure is demoted to "no detection"
    /// here; the scratch frame is removed on all paths.
    async fn decode_second(&self, video: &Path, second: u64) -> Option<String> {
        let frame = TempFrame::new(
            self.scratch_dir
                .join(format!("frame_{}.png", Uuid::new_v4())),
        );

        match self.sample_and_decode(video, second, frame.path()).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    video = %video.display(),
                    second,
                    error = %e,
                    "frame extraction failed, continuing scan"
                );
                None
            }
        }
    }

    async fn sample_and_decode(
        &self,
        video: &Path,
        second: u64,
        dest: &Path,
    ) -> Result<Option<String>, FrameDecodeError> {
        self.sampler
            .grab_frame(video, Duration::from_secs(second), dest)
            .await?;
        Ok(self.decoder.decode_frame(dest)?)
    }
}

#[async_trait]
impl<S: FrameSampler, D: BarcodeDecoder> VideoScanner for QrTimelineExtractor<S, D> {
    async fn scan(&self, video: &Path) -> Result<Vec<QrInterval>, ScanError> {
        self.extract_timeline(video).await
    }
}

/// Errors that abort a scan. Per-frame failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("video probe failed: {0}")]
    Probe(#[source] FrameError),

    #[error("scratch directory unavailable: {0}")]
    Scratch(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
enum FrameDecodeError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// What the scripted video shows at a given second.
    #[derive(Clone, Copy)]
    enum Frame {
        Code(&'static str),
        Blank,
        Fail,
    }

    type SampledSeconds = Arc<Mutex<Vec<u64>>>;

    /// Fake sampler writing the scripted payload text into the scratch file;
    /// `TextDecoder` reads it back. Seconds past the script are blank.
    struct ScriptedSampler {
        duration: f64,
        frames: Vec<Frame>,
        sampled: SampledSeconds,
        probe_fails: bool,
    }

    impl ScriptedSampler {
        fn new(duration: f64, frames: Vec<Frame>) -> (Self, SampledSeconds) {
            let sampled = SampledSeconds::default();
            let sampler = Self {
                duration,
                frames,
                sampled: Arc::clone(&sampled),
                probe_fails: false,
            };
            (sampler, sampled)
        }
    }

    #[async_trait]
    impl FrameSampler for ScriptedSampler {
        async fn probe_duration(&self, _video: &Path) -> Result<f64, FrameError> {
            if self.probe_fails {
                return Err(FrameError::MissingDuration);
            }
            Ok(self.duration)
        }

        async fn grab_frame(
            &self,
            _video: &Path,
            at: Duration,
            dest: &Path,
        ) -> Result<(), FrameError> {
            let second = at.as_secs();
            self.sampled.lock().unwrap().push(second);

            match self.frames.get(second as usize).copied().unwrap_or(Frame::Blank) {
                Frame::Code(text) => std::fs::write(dest, text).map_err(FrameError::Spawn),
                Frame::Blank => std::fs::write(dest, "").map_err(FrameError::Spawn),
                Frame::Fail => Err(FrameError::NoFrame),
            }
        }
    }

    struct TextDecoder;

    impl BarcodeDecoder for TextDecoder {
        fn decode_frame(&self, frame: &Path) -> Result<Option<String>, DecodeError> {
            let text = std::fs::read_to_string(frame).unwrap_or_default();
            if text.is_empty() {
                Ok(None)
            } else {
                Ok(Some(text))
            }
        }
    }

    fn extractor(
        sampler: ScriptedSampler,
        scratch: &tempfile::TempDir,
    ) -> QrTimelineExtractor<ScriptedSampler, TextDecoder> {
        QrTimelineExtractor::new(sampler, TextDecoder, scratch.path().to_path_buf())
    }

    fn interval(start: u64, content: &str, duration: u32) -> QrInterval {
        QrInterval {
            start_seconds: start,
            content: content.to_string(),
            duration_seconds: duration,
        }
    }

    #[tokio::test]
    async fn fractional_duration_samples_ceil_seconds() {
        let (sampler, sampled) = ScriptedSampler::new(3.5, vec![Frame::Blank; 4]);
        let scratch = tempfile::tempdir().unwrap();

        let result = extractor(sampler, &scratch)
            .extract_timeline(Path::new("clip.mp4"))
            .await
            .unwrap();

        assert!(result.is_empty());
        assert_eq!(*sampled.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn integral_duration_samples_exactly_that_many_seconds() {
        let (sampler, sampled) = ScriptedSampler::new(3.0, vec![Frame::Blank; 3]);
        let scratch = tempfile::tempdir().unwrap();

        extractor(sampler, &scratch)
            .extract_timeline(Path::new("clip.mp4"))
            .await
            .unwrap();

        assert_eq!(*sampled.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn zero_duration_video_yields_empty_timeline() {
        let (sampler, sampled) = ScriptedSampler::new(0.0, vec![]);
        let scratch = tempfile::tempdir().unwrap();

        let result = extractor(sampler, &scratch)
            .extract_timeline(Path::new("clip.mp4"))
            .await
            .unwrap();

        assert!(result.is_empty());
        assert!(sampled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn code_spanning_whole_video_yields_one_interval() {
        let (sampler, _) = ScriptedSampler::new(4.0, vec![Frame::Code("A"); 4]);
        let scratch = tempfile::tempdir().unwrap();

        let result = extractor(sampler, &scratch)
            .extract_timeline(Path::new("clip.mp4"))
            .await
            .unwrap();

        assert_eq!(result, vec![interval(0, "A", 4)]);
    }

    #[tokio::test]
    async fn back_to_back_codes_yield_adjacent_intervals() {
        let frames = vec![
            Frame::Code("A"),
            Frame::Code("A"),
            Frame::Code("A"),
            Frame::Code("B"),
            Frame::Code("B"),
            Frame::Code("B"),
        ];
        let (sampler, _) = ScriptedSampler::new(6.0, frames);
        let scratch = tempfile::tempdir().unwrap();

        let result = extractor(sampler, &scratch)
            .extract_timeline(Path::new("clip.mp4"))
            .await
            .unwrap();

        assert_eq!(result, vec![interval(0, "A", 3), interval(3, "B", 3)]);
    }

    #[tokio::test]
    async fn codes_separated_by_blank_seconds() {
        // First code over [0,3), nothing, second code over [5,8).
        let frames = vec![
            Frame::Code("A"),
            Frame::Code("A"),
            Frame::Code("A"),
            Frame::Blank,
            Frame::Blank,
            Frame::Code("B"),
            Frame::Code("B"),
            Frame::Code("B"),
        ];
        let (sampler, _) = ScriptedSampler::new(8.0, frames);
        let scratch = tempfile::tempdir().unwrap();

        let result = extractor(sampler, &scratch)
            .extract_timeline(Path::new("clip.mp4"))
            .await
            .unwrap();

        assert_eq!(result, vec![interval(0, "A", 3), interval(5, "B", 3)]);
    }

    #[tokio::test]
    async fn failed_second_splits_an_otherwise_continuous_interval() {
        let frames = vec![
            Frame::Code("A"),
            Frame::Code("A"),
            Frame::Fail,
            Frame::Code("A"),
            Frame::Code("A"),
        ];
        let (sampler, _) = ScriptedSampler::new(5.0, frames);
        let scratch = tempfile::tempdir().unwrap();

        let result = extractor(sampler, &scratch)
            .extract_timeline(Path::new("clip.mp4"))
            .await
            .unwrap();

        assert_eq!(result, vec![interval(0, "A", 2), interval(3, "A", 2)]);
    }

    #[tokio::test]
    async fn repeated_scans_are_identical() {
        let frames = vec![
            Frame::Code("A"),
            Frame::Fail,
            Frame::Code("B"),
            Frame::Code("B"),
            Frame::Blank,
            Frame::Code("A"),
        ];
        let (sampler, _) = ScriptedSampler::new(6.0, frames);
        let scratch = tempfile::tempdir().unwrap();
        let extractor = extractor(sampler, &scratch);

        let first = extractor
            .extract_timeline(Path::new("clip.mp4"))
            .await
            .unwrap();
        let second = extractor
            .extract_timeline(Path::new("clip.mp4"))
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn consecutive_intervals_never_overlap() {
        let frames = vec![
            Frame::Code("A"),
            Frame::Code("A"),
            Frame::Code("B"),
            Frame::Blank,
            Frame::Code("C"),
            Frame::Code("C"),
            Frame::Fail,
            Frame::Code("C"),
        ];
        let (sampler, _) = ScriptedSampler::new(8.0, frames);
        let scratch = tempfile::tempdir().unwrap();

        let result = extractor(sampler, &scratch)
            .extract_timeline(Path::new("clip.mp4"))
            .await
            .unwrap();

        for pair in result.windows(2) {
            assert!(
                pair[0].start_seconds + u64::from(pair[0].duration_seconds)
                    <= pair[1].start_seconds,
                "intervals overlap: {:?}",
                pair
            );
        }
    }

    #[tokio::test]
    async fn scratch_frames_are_removed_after_the_scan() {
        let frames = vec![Frame::Code("A"), Frame::Fail, Frame::Blank];
        let (sampler, _) = ScriptedSampler::new(3.0, frames);
        let scratch = tempfile::tempdir().unwrap();

        extractor(sampler, &scratch)
            .extract_timeline(Path::new("clip.mp4"))
            .await
            .unwrap();

        let leftover = std::fs::read_dir(scratch.path()).unwrap().count();
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn probe_failure_aborts_the_scan() {
        let (mut sampler, sampled) = ScriptedSampler::new(5.0, vec![Frame::Code("A"); 5]);
        sampler.probe_fails = true;
        let scratch = tempfile::tempdir().unwrap();

        let result = extractor(sampler, &scratch)
            .extract_timeline(Path::new("clip.mp4"))
            .await;

        assert!(matches!(result, Err(ScanError::Probe(_))));
        assert!(sampled.lock().unwrap().is_empty());
    }
}
