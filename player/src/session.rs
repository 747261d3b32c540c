//! One background worker per active view.
//!
//! [`Session::activate`] spawns the worker; [`Session::deactivate`] stops it
//! and waits for it. The worker runs the sequential pipeline
//! sample → detect → play for one request at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use frame_overlay_common::frame::{DisplaySize, ScaleFactors};
use frame_overlay_detector::DetectionPipeline;
use frame_overlay_sampler::{FrameSampler, SampleError, VideoSource};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::scheduler::{OverlayScheduler, PlaybackOutcome};
use crate::ui::{Lifecycle, Liveness, UiHandle};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("sampling failed: {0}")]
    SourceUnavailable(#[source] SampleError),
    #[error("view torn down during run")]
    TeardownDuringRun,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a run is already in progress")]
    Busy,
    #[error("session is not active")]
    Inactive,
    #[error("classifier could not be initialized")]
    ClassifierUnavailable,
}

pub type RunResult = Result<PlaybackOutcome, RunError>;

/// Everything one run needs besides the view.
pub struct Runner {
    source: Arc<dyn VideoSource>,
    sampler: FrameSampler,
    samples_per_second: u32,
    detection: DetectionPipeline,
}

impl Runner {
    pub fn new(
        source: Arc<dyn VideoSource>,
        sampler: FrameSampler,
        samples_per_second: u32,
        detection: DetectionPipeline,
    ) -> Self {
        Self {
            source,
            sampler,
            samples_per_second,
            detection,
        }
    }

    fn scale_for(&self, display: DisplaySize) -> ScaleFactors {
        let (width, height) = self.detection.classifier().input_size();
        ScaleFactors::from_display(display, width, height)
    }

    async fn run(
        &self,
        scale: ScaleFactors,
        ui: &UiHandle,
        liveness: &mut Liveness,
    ) -> RunResult {
        info!("processing ....");
        let started = Instant::now();

        let frames = tokio::select! {
            biased;
            _ = liveness.deactivated() => return Err(RunError::TeardownDuringRun),
            frames = self.sampler.extract_frames(self.source.as_ref(), self.samples_per_second, ui) => {
                frames.map_err(RunError::SourceUnavailable)?
            }
        };
        info!(count = frames.len(), "frames count");

        let detections = tokio::select! {
            biased;
            _ = liveness.deactivated() => return Err(RunError::TeardownDuringRun),
            detections = self.detection.detect(frames, scale, ui) => detections,
        };
        info!(count = detections.len(), "detected objects");

        ui.status(format!(
            "Processing time: {} seconds",
            started.elapsed().as_secs()
        ));

        let mut scheduler = OverlayScheduler::new(
            OverlayScheduler::interval_for(self.samples_per_second),
            ui.clone(),
            liveness.clone(),
        );
        match scheduler.play(&detections).await {
            PlaybackOutcome::Interrupted { .. } => Err(RunError::TeardownDuringRun),
            outcome => Ok(outcome),
        }
    }
}

/// Clears the in-flight flag when the job is done with, however it ends.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Job {
    runner: Arc<Runner>,
    scale: ScaleFactors,
    reply: oneshot::Sender<RunResult>,
    busy: BusyGuard,
}

pub struct Session {
    lifecycle: Lifecycle,
    jobs: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    busy: Arc<AtomicBool>,
    /// `None` when the classifier failed to initialize.
    runner: Option<Arc<Runner>>,
    ui: UiHandle,
    display: watch::Receiver<DisplaySize>,
}

impl Session {
    /// Start the background worker. The session takes over `lifecycle`;
    /// deactivating the session deactivates the view with it. Without a
    /// runner (classifier unavailable) every process request is refused.
    pub fn activate(
        runner: Option<Runner>,
        ui: UiHandle,
        display: watch::Receiver<DisplaySize>,
        lifecycle: Lifecycle,
    ) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel(1);
        let worker = tokio::spawn(run_worker(jobs_rx, ui.clone(), lifecycle.liveness()));
        info!("inference worker started");

        Self {
            lifecycle,
            jobs: Some(jobs_tx),
            worker: Some(worker),
            busy: Arc::new(AtomicBool::new(false)),
            runner: runner.map(Arc::new),
            ui,
            display,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Queue one sample → detect → play run. Scale factors are taken from the
    /// display size as it is right now. Returns a receiver resolving to the
    /// run's result; a second request while one is in flight is refused.
    pub fn process(&self) -> Result<oneshot::Receiver<RunResult>, SessionError> {
        let jobs = match &self.jobs {
            Some(jobs) if self.lifecycle.is_active() => jobs,
            _ => return Err(SessionError::Inactive),
        };

        let Some(runner) = &self.runner else {
            self.ui.status("Classifier could not be initialized");
            return Err(SessionError::ClassifierUnavailable);
        };
        let scale = runner.scale_for(*self.display.borrow());

        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("process requested while a run is in flight, rejecting");
            return Err(SessionError::Busy);
        }
        let busy = BusyGuard(Arc::clone(&self.busy));

        let (reply, result) = oneshot::channel();
        let job = Job {
            runner: Arc::clone(runner),
            scale,
            reply,
            busy,
        };
        jobs.try_send(job).map_err(|e| {
            debug!(error = %e, "job queue refused request");
            match e {
                mpsc::error::TrySendError::Full(_) => SessionError::Busy,
                mpsc::error::TrySendError::Closed(_) => SessionError::Inactive,
            }
        })?;

        debug!(
            width_multiplier = scale.width_multiplier,
            height_multiplier = scale.height_multiplier,
            "run queued"
        );
        Ok(result)
    }

    /// Deactivate the view, stop accepting work and join the worker. An
    /// in-flight run is abandoned at its next suspension point.
    pub async fn deactivate(mut self) {
        self.lifecycle.deactivate();
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!(error = %e, "inference worker panicked");
            }
        }
        info!("inference worker stopped");
    }
}

async fn run_worker(
    mut jobs: mpsc::Receiver<Job>,
    ui: UiHandle,
    mut liveness: Liveness,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = liveness.deactivated() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let Job {
            runner,
            scale,
            reply,
            busy,
        } = job;

        let result = runner.run(scale, &ui, &mut liveness).await;
        match &result {
            Ok(outcome) => info!(ticks = outcome.ticks(), "run complete"),
            Err(RunError::SourceUnavailable(e)) => {
                error!(error = %e, "could not open video source");
                ui.status(format!("Video could not be opened: {e}"));
            }
            Err(RunError::TeardownDuringRun) => info!("run abandoned, view torn down"),
        }
        drop(busy);
        // The requester may have stopped waiting.
        let _ = reply.send(result);
    }
    debug!("inference worker exiting");
}
