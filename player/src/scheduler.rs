use std::time::Duration;

use frame_overlay_common::frame::ScaledDetection;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::ui::{Liveness, PlaybackEnd, UiCommand, UiHandle};

/// How a playback pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every detection was shown, its time slice elapsed and the video
    /// played to its end.
    Completed { ticks: usize },
    /// The view was torn down first.
    Interrupted { ticks: usize },
}

impl PlaybackOutcome {
    pub fn ticks(&self) -> usize {
        match self {
            PlaybackOutcome::Completed { ticks } | PlaybackOutcome::Interrupted { ticks } => *ticks,
        }
    }
}

/// Per-pass state, alive only while `play` runs.
struct PlaybackSession {
    started_at: Instant,
    current_detection_index: usize,
}

/// Starts the video and, once per sampling interval, swaps the overlay to
/// the next detection.
pub struct OverlayScheduler {
    interval: Duration,
    ui: UiHandle,
    liveness: Liveness,
}

impl OverlayScheduler {
    pub fn new(interval: Duration, ui: UiHandle, liveness: Liveness) -> Self {
        Self {
            interval,
            ui,
            liveness,
        }
    }

    /// Sampling interval for a given rate, in whole microseconds so ticks
    /// line up with sample timestamps.
    pub fn interval_for(samples_per_second: u32) -> Duration {
        Duration::from_micros(1_000_000 / samples_per_second.max(1) as u64)
    }

    /// Tick `k` fires `k` intervals after playback starts and shows
    /// detection `k`. Once the last detection's slice has elapsed the overlay
    /// is left as the final tick set it, and the pass completes when the
    /// surface reports the end of the video.
    pub async fn play(&mut self, detections: &[ScaledDetection]) -> PlaybackOutcome {
        if !self.liveness.is_alive() {
            return PlaybackOutcome::Interrupted { ticks: 0 };
        }

        info!(
            detections = detections.len(),
            interval_ms = self.interval.as_millis() as u64,
            "play complete video"
        );
        let (end, ended) = PlaybackEnd::channel();
        self.ui.dispatch(UiCommand::StartPlayback(end));

        let mut session = PlaybackSession {
            started_at: Instant::now(),
            current_detection_index: 0,
        };
        let mut ticker = tokio::time::interval_at(session.started_at, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.liveness.deactivated() => {
                    return self.interrupt(&session);
                }
                _ = ticker.tick() => {
                    let Some(detection) = detections.get(session.current_detection_index) else {
                        break;
                    };
                    debug!(
                        tick = session.current_detection_index,
                        frame = detection.frame_index,
                        elapsed_ms = session.started_at.elapsed().as_millis() as u64,
                        matched = detection.is_match(),
                        "replacing object"
                    );
                    self.ui.dispatch(UiCommand::ShowOverlay {
                        tick: session.current_detection_index,
                        rect: detection.rect,
                    });
                    session.current_detection_index += 1;
                }
            }
        }

        info!(
            ticks = session.current_detection_index,
            elapsed_ms = session.started_at.elapsed().as_millis() as u64,
            "overlay schedule finished, waiting for end of video"
        );
        tokio::select! {
            biased;
            _ = self.liveness.deactivated() => return self.interrupt(&session),
            ended = ended => {
                if ended.is_err() {
                    debug!("playback ended without reaching the end of the video");
                }
            }
        }

        info!(
            elapsed_ms = session.started_at.elapsed().as_millis() as u64,
            "playback complete"
        );
        PlaybackOutcome::Completed {
            ticks: session.current_detection_index,
        }
    }

    fn interrupt(&self, session: &PlaybackSession) -> PlaybackOutcome {
        info!(
            ticks = session.current_detection_index,
            "playback torn down, releasing overlay"
        );
        self.ui.dispatch(UiCommand::ClearOverlay);
        PlaybackOutcome::Interrupted {
            ticks: session.current_detection_index,
        }
    }
}
