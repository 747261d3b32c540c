use frame_overlay_common::config::Config;
use frame_overlay_detector::{Classifier, CommandClassifier, DetectionPipeline};
use frame_overlay_player::session::{Runner, Session};
use frame_overlay_player::surface::TerminalSurface;
use frame_overlay_player::ui::{visual_context, Lifecycle};
use frame_overlay_sampler::{FfmpegSource, FrameSampler};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        video = %config.video.path.display(),
        samples_per_second = config.video.samples_per_second,
        detector = config.detector.command,
        target = config.detector.target_label,
        "starting frame-overlay player"
    );

    let surface = match TerminalSurface::new(&config.playback, &config.video.path) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to open overlay track");
            std::process::exit(1);
        }
    };

    let lifecycle = Lifecycle::new();
    let (context, ui, display) =
        visual_context(surface, config.display.size(), lifecycle.liveness());
    let view = tokio::spawn(context.run());

    let detection = match CommandClassifier::new(
        &config.detector.command,
        config.detector.args.clone(),
        config.detector.input_size,
    ) {
        Ok(classifier) => {
            info!("detector successfully init");
            let classifier: Arc<dyn Classifier> = Arc::new(classifier);
            Some(DetectionPipeline::new(
                classifier,
                config.detector.target_label.clone(),
                config.detector.timeout(),
            ))
        }
        Err(e) => {
            error!(error = %e, "classifier could not be initialized");
            None
        }
    };

    let runner = detection.map(|detection| {
        Runner::new(
            Arc::new(FfmpegSource::new(&config.video.path)),
            FrameSampler::new(config.video.frame_timeout()),
            config.video.samples_per_second,
            detection,
        )
    });
    let session = Session::activate(runner, ui.clone(), display, lifecycle);

    let mut exit_code = ExitCode::SUCCESS;
    match session.process() {
        Ok(done) => {
            tokio::select! {
                result = done => match result {
                    Ok(Ok(outcome)) => info!(ticks = outcome.ticks(), "playback finished"),
                    Ok(Err(e)) => {
                        error!(error = %e, "run failed");
                        exit_code = ExitCode::FAILURE;
                    }
                    Err(_) => warn!("worker dropped the run"),
                },
                _ = tokio::signal::ctrl_c() => info!("interrupted, tearing down"),
            }
        }
        Err(e) => {
            error!(error = %e, "could not start processing");
            exit_code = ExitCode::FAILURE;
        }
    }

    session.deactivate().await;
    drop(ui);
    if let Err(e) = view.await {
        error!(error = %e, "visual context panicked");
    }
    // Returning drops the runtime, and with it any player still running.
    exit_code
}
