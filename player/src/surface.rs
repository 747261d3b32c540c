//! Headless [`ViewSurface`]: the video plays in an external player window,
//! status lines go to stdout and overlay changes go to the log. Optionally
//! every overlay change is also appended to a JSON-lines track file.
//!
//! The player runs with `-autoexit`, so its exit marks the end of the video.

use chrono::Utc;
use frame_overlay_common::config::PlaybackConfig;
use frame_overlay_common::frame::Rect;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::ui::{PlaybackEnd, ViewSurface};

#[derive(Debug, Serialize)]
struct TrackRecord {
    /// `None` when the overlay was removed.
    tick: Option<usize>,
    shown_at_ms: i64,
    rect: Option<Rect>,
}

struct OverlayTrack {
    path: PathBuf,
    out: LineWriter<File>,
}

impl OverlayTrack {
    fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: LineWriter::new(file),
        })
    }

    fn append(&mut self, tick: Option<usize>, rect: Option<Rect>) {
        let record = TrackRecord {
            tick,
            shown_at_ms: Utc::now().timestamp_millis(),
            rect,
        };
        let result = serde_json::to_string(&record)
            .map_err(std::io::Error::other)
            .and_then(|line| writeln!(self.out, "{line}"));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "failed to append overlay track");
        }
    }
}

pub struct TerminalSurface {
    player: String,
    video: PathBuf,
    /// Stops the running player, if any.
    stop: Option<oneshot::Sender<()>>,
    track: Option<OverlayTrack>,
}

impl TerminalSurface {
    pub fn new(config: &PlaybackConfig, video: &Path) -> std::io::Result<Self> {
        let track = match &config.overlay_track {
            Some(path) => Some(OverlayTrack::create(path)?),
            None => None,
        };
        Ok(Self {
            player: config.player.clone(),
            video: video.to_path_buf(),
            stop: None,
            track,
        })
    }
}

impl ViewSurface for TerminalSurface {
    fn set_status(&mut self, text: &str) {
        println!("{text}");
    }

    fn start_playback(&mut self, end: PlaybackEnd) {
        if self.stop.as_ref().is_some_and(|stop| !stop.is_closed()) {
            debug!("playback already running");
            return;
        }
        let spawned = Command::new(&self.player)
            .args(["-autoexit", "-loglevel", "error"])
            .arg(&self.video)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        match spawned {
            Ok(child) => {
                info!(player = self.player, video = %self.video.display(), "playback started");
                let (stop_tx, stop_rx) = oneshot::channel();
                tokio::spawn(supervise(child, stop_rx, end));
                self.stop = Some(stop_tx);
            }
            Err(e) => {
                warn!(player = self.player, error = %e, "could not start player, continuing without video");
            }
        }
    }

    fn stop_playback(&mut self) {
        if let Some(stop) = self.stop.take() {
            // Already gone if the video ran to its end.
            let _ = stop.send(());
        }
    }

    fn show_overlay(&mut self, tick: usize, rect: Rect) {
        info!(
            tick,
            x = rect.left,
            y = rect.top,
            width = rect.width(),
            height = rect.height(),
            "overlay shown"
        );
        if let Some(track) = &mut self.track {
            track.append(Some(tick), Some(rect));
        }
    }

    fn clear_overlay(&mut self) {
        debug!("overlay cleared");
        if let Some(track) = &mut self.track {
            track.append(None, None);
        }
    }
}

/// Wait for the player to exit on its own, or kill it when asked to stop.
async fn supervise(mut child: Child, stop: oneshot::Receiver<()>, end: PlaybackEnd) {
    tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) => info!(%status, "player exited"),
                Err(e) => warn!(error = %e, "lost track of player"),
            }
            end.notify();
        }
        _ = stop => {
            if let Err(e) = child.kill().await {
                debug!(error = %e, "player already exited");
            }
            info!("playback stopped");
        }
    }
}
