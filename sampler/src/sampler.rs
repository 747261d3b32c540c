use std::time::Duration;

use frame_overlay_common::frame::Frame;
use frame_overlay_common::progress::{percent, ProgressSink};
use tracing::{debug, info, warn};

use crate::source::{SourceError, VideoSource};

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("video source unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),
    #[error("samples per second must be non-zero")]
    InvalidRate,
}

/// Number of frames sampled from a video of `duration_ms` at
/// `samples_per_second`. Only whole seconds count.
pub fn sample_count(duration_ms: i64, samples_per_second: u32) -> usize {
    if duration_ms <= 0 {
        return 0;
    }
    samples_per_second as usize * (duration_ms / 1000) as usize
}

/// Timestamp in microseconds of sample `index`.
pub fn sample_timestamp_us(index: usize, samples_per_second: u32) -> i64 {
    index as i64 * (1_000_000 / samples_per_second.max(1) as i64)
}

/// Pulls one frame per sampling interval out of a [`VideoSource`].
pub struct FrameSampler {
    frame_timeout: Duration,
}

impl FrameSampler {
    pub fn new(frame_timeout: Duration) -> Self {
        Self { frame_timeout }
    }

    /// Extract every sample eagerly, in timestamp order.
    ///
    /// Only a source that cannot be opened is an error. A video shorter than
    /// one sampling interval yields `Ok` with no frames. A single frame that
    /// fails to decode, or exceeds the per-frame timeout, is still emitted
    /// (without an image) so the output stays index-aligned.
    pub async fn extract_frames(
        &self,
        source: &dyn VideoSource,
        samples_per_second: u32,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Frame>, SampleError> {
        if samples_per_second == 0 {
            return Err(SampleError::InvalidRate);
        }

        let duration_ms = source
            .duration_ms()
            .await
            .map_err(SampleError::SourceUnavailable)?;
        let count = sample_count(duration_ms, samples_per_second);

        info!(
            source = source.describe(),
            duration_ms,
            samples_per_second,
            count,
            "extracting frames"
        );

        let mut frames = Vec::with_capacity(count);
        for index in 0..count {
            let timestamp_us = sample_timestamp_us(index, samples_per_second);
            let timestamp_ms = timestamp_us / 1000;

            let frame = match self.extract_one(source, timestamp_us).await {
                Ok(image) => {
                    debug!(
                        index,
                        timestamp_ms,
                        width = image.width(),
                        height = image.height(),
                        "extracted frame"
                    );
                    Frame::new(index, timestamp_ms, image)
                }
                Err(e) => {
                    warn!(error = %e, index, timestamp_ms, "frame extraction failed, keeping empty slot");
                    Frame::missing(index, timestamp_ms)
                }
            };
            frames.push(frame);

            progress.report(&format!(
                "Extracted frames: {}%",
                percent(index + 1, count)
            ));
        }

        progress.report(&format!(
            "Frames extracted successfully! {count} frames found."
        ));
        Ok(frames)
    }

    async fn extract_one(
        &self,
        source: &dyn VideoSource,
        timestamp_us: i64,
    ) -> Result<image::RgbImage, SourceError> {
        match tokio::time::timeout(self.frame_timeout, source.frame_at(timestamp_us)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(self.frame_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::RgbImage;
    use std::sync::Mutex;

    struct FakeSource {
        duration: Result<i64, ()>,
        failing: Vec<i64>,
        hanging: Vec<i64>,
        requested: Mutex<Vec<i64>>,
    }

    impl FakeSource {
        fn with_duration(duration_ms: i64) -> Self {
            Self {
                duration: Ok(duration_ms),
                failing: Vec::new(),
                hanging: Vec::new(),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<i64> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VideoSource for FakeSource {
        async fn duration_ms(&self) -> Result<i64, SourceError> {
            self.duration
                .map_err(|_| SourceError::NotFound("fake.mp4".into()))
        }

        async fn frame_at(&self, timestamp_us: i64) -> Result<RgbImage, SourceError> {
            self.requested.lock().unwrap().push(timestamp_us);
            if self.hanging.contains(&timestamp_us) {
                std::future::pending::<()>().await;
            }
            if self.failing.contains(&timestamp_us) {
                return Err(SourceError::NoFrame(timestamp_us));
            }
            Ok(RgbImage::new(4, 4))
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ProgressSink for Recorder {
        fn report(&self, status: &str) {
            self.0.lock().unwrap().push(status.to_string());
        }
    }

    fn sampler() -> FrameSampler {
        FrameSampler::new(Duration::from_secs(2))
    }

    #[test]
    fn count_uses_whole_seconds() {
        assert_eq!(sample_count(5500, 1), 5);
        assert_eq!(sample_count(10_000, 1), 10);
        assert_eq!(sample_count(2500, 2), 4);
        assert_eq!(sample_count(999, 1), 0);
        assert_eq!(sample_count(-1, 1), 0);
    }

    #[test]
    fn timestamps_follow_interval() {
        assert_eq!(sample_timestamp_us(0, 1), 0);
        assert_eq!(sample_timestamp_us(3, 1), 3_000_000);
        assert_eq!(sample_timestamp_us(3, 2), 1_500_000);
    }

    #[tokio::test]
    async fn extracts_one_frame_per_second() {
        let source = FakeSource::with_duration(5500);
        let progress = Recorder::default();

        let frames = sampler()
            .extract_frames(&source, 1, &progress)
            .await
            .unwrap();

        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert_eq!(frame.timestamp_ms, i as i64 * 1000);
            assert!(frame.image.is_some());
        }
        assert_eq!(
            source.requested(),
            vec![0, 1_000_000, 2_000_000, 3_000_000, 4_000_000]
        );

        let lines = progress.0.lock().unwrap();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "Extracted frames: 20%");
        assert_eq!(lines[4], "Extracted frames: 100%");
        assert_eq!(lines[5], "Frames extracted successfully! 5 frames found.");
    }

    #[tokio::test]
    async fn short_video_is_empty_success() {
        let source = FakeSource::with_duration(400);
        let frames = sampler()
            .extract_frames(&source, 1, &Recorder::default())
            .await
            .unwrap();
        assert!(frames.is_empty());
        assert!(source.requested().is_empty());
    }

    #[tokio::test]
    async fn unopenable_source_is_distinct_error() {
        let source = FakeSource {
            duration: Err(()),
            ..FakeSource::with_duration(0)
        };
        let err = sampler()
            .extract_frames(&source, 1, &Recorder::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SampleError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn zero_rate_is_rejected() {
        let source = FakeSource::with_duration(5000);
        let err = sampler()
            .extract_frames(&source, 0, &Recorder::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SampleError::InvalidRate));
    }

    #[tokio::test]
    async fn failed_frame_keeps_its_slot() {
        let source = FakeSource {
            failing: vec![2_000_000],
            ..FakeSource::with_duration(4000)
        };
        let frames = sampler()
            .extract_frames(&source, 1, &Recorder::default())
            .await
            .unwrap();
        assert_eq!(frames.len(), 4);
        assert!(frames[2].image.is_none());
        assert_eq!(frames[2].index, 2);
        assert!(frames[3].image.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_frame_times_out() {
        let source = FakeSource {
            hanging: vec![1_000_000],
            ..FakeSource::with_duration(3000)
        };
        let frames = sampler()
            .extract_frames(&source, 1, &Recorder::default())
            .await
            .unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames[0].image.is_some());
        assert!(frames[1].image.is_none());
        assert!(frames[2].image.is_some());
    }
}
