//! The visual context: the single owner of everything visible.
//!
//! Other tasks never touch the [`ViewSurface`] directly. They post
//! [`UiCommand`]s through a cloneable [`UiHandle`]; the context drains them
//! in order on its own task. Posting never blocks, and posting to a context
//! that has already gone away is a silent no-op.

use frame_overlay_common::frame::{DisplaySize, Rect};
use frame_overlay_common::progress::ProgressSink;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

/// Handed to the surface with each playback start. The surface fires it
/// once the video has played to its end. Dropping it unfired means the
/// video will not reach its end (the player failed or was stopped).
#[derive(Debug)]
pub struct PlaybackEnd(oneshot::Sender<()>);

impl PlaybackEnd {
    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    pub fn notify(self) {
        // Nobody waiting is fine.
        let _ = self.0.send(());
    }
}

#[derive(Debug)]
pub enum UiCommand {
    Status(String),
    StartPlayback(PlaybackEnd),
    /// Replace whatever overlay is showing. A zero-area rect leaves the
    /// overlay slot empty.
    ShowOverlay { tick: usize, rect: Rect },
    ClearOverlay,
    Resize(DisplaySize),
}

/// Rendering surface owned by the visual context.
pub trait ViewSurface: Send {
    fn set_status(&mut self, text: &str);
    fn start_playback(&mut self, end: PlaybackEnd);
    fn stop_playback(&mut self);
    fn show_overlay(&mut self, tick: usize, rect: Rect);
    fn clear_overlay(&mut self);
}

/// Active/inactive switch of the visual context. Dropping it counts as
/// deactivation.
pub struct Lifecycle {
    tx: watch::Sender<bool>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx }
    }

    pub fn liveness(&self) -> Liveness {
        Liveness(self.tx.subscribe())
    }

    pub fn is_active(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn deactivate(&self) {
        self.tx.send_replace(false);
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of a [`Lifecycle`].
#[derive(Clone)]
pub struct Liveness(watch::Receiver<bool>);

impl Liveness {
    pub fn is_alive(&self) -> bool {
        self.0.has_changed().is_ok() && *self.0.borrow()
    }

    /// Resolves once the lifecycle is deactivated (or dropped). Cancel-safe.
    pub async fn deactivated(&mut self) {
        loop {
            if !*self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }
}

#[derive(Clone)]
pub struct UiHandle {
    tx: mpsc::UnboundedSender<UiCommand>,
}

impl UiHandle {
    /// Post a command to the visual context. Returns `false` if the context
    /// is gone and the command was dropped.
    pub fn dispatch(&self, command: UiCommand) -> bool {
        match self.tx.send(command) {
            Ok(()) => true,
            Err(mpsc::error::SendError(command)) => {
                debug!(?command, "visual context gone, dropping command");
                false
            }
        }
    }

    pub fn status(&self, text: impl Into<String>) {
        let text = text.into();
        info!(status = %text, "status");
        self.dispatch(UiCommand::Status(text));
    }
}

impl ProgressSink for UiHandle {
    fn report(&self, status: &str) {
        self.status(status);
    }
}

/// Bare command channel, for code that stands in for the visual context.
pub fn channel() -> (UiHandle, mpsc::UnboundedReceiver<UiCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiHandle { tx }, rx)
}

pub struct VisualContext<S: ViewSurface> {
    rx: mpsc::UnboundedReceiver<UiCommand>,
    surface: S,
    display: watch::Sender<DisplaySize>,
    liveness: Liveness,
    overlay_visible: bool,
}

/// Build a visual context around `surface`. The returned receiver tracks the
/// current display size.
pub fn visual_context<S: ViewSurface>(
    surface: S,
    display: DisplaySize,
    liveness: Liveness,
) -> (VisualContext<S>, UiHandle, watch::Receiver<DisplaySize>) {
    let (ui, rx) = channel();
    let (display_tx, display_rx) = watch::channel(display);
    let context = VisualContext {
        rx,
        surface,
        display: display_tx,
        liveness,
        overlay_visible: false,
    };
    (context, ui, display_rx)
}

impl<S: ViewSurface> VisualContext<S> {
    /// Process commands until every handle is dropped or the lifecycle is
    /// deactivated. Hands the surface back afterwards.
    pub async fn run(mut self) -> S {
        let mut liveness = self.liveness.clone();
        loop {
            tokio::select! {
                biased;
                _ = liveness.deactivated() => {
                    debug!("visual context deactivated");
                    break;
                }
                command = self.rx.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
            }
        }

        // Anything still queued targets a torn-down view.
        self.rx.close();
        if self.overlay_visible {
            self.surface.clear_overlay();
            self.overlay_visible = false;
        }
        self.surface.stop_playback();
        self.surface
    }

    fn apply(&mut self, command: UiCommand) {
        if !self.liveness.is_alive() {
            debug!(?command, "view inactive, dropping command");
            return;
        }
        match command {
            UiCommand::Status(text) => self.surface.set_status(&text),
            UiCommand::StartPlayback(end) => self.surface.start_playback(end),
            UiCommand::ShowOverlay { tick, rect } => {
                if self.overlay_visible {
                    self.surface.clear_overlay();
                    self.overlay_visible = false;
                }
                if !rect.is_empty() {
                    self.surface.show_overlay(tick, rect);
                    self.overlay_visible = true;
                }
            }
            UiCommand::ClearOverlay => {
                if self.overlay_visible {
                    self.surface.clear_overlay();
                    self.overlay_visible = false;
                }
            }
            UiCommand::Resize(size) => {
                debug!(width = size.width, height = size.height, "display resized");
                self.display.send_replace(size);
            }
        }
    }
}
