//! Classifier backed by an external detection program.
//!
//! For every frame the program is spawned once, the frame is written to its
//! stdin as PNG, and a JSON array of detections is read back from stdout:
//!
//! ```json
//! [{"label": "person", "confidence": 0.87,
//!   "box": {"top": 12.0, "left": 40.5, "bottom": 280.0, "right": 130.0}}]
//! ```

use async_trait::async_trait;
use frame_overlay_common::frame::Detection;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::traits::{Classifier, ClassifierError};

pub struct CommandClassifier {
    program: PathBuf,
    args: Vec<String>,
    input_size: u32,
    name: String,
}

impl CommandClassifier {
    /// Resolve `command` on PATH. Fails with [`ClassifierError::Unavailable`]
    /// when the program cannot be found, so no run is ever started against a
    /// missing detector.
    pub fn new(command: &str, args: Vec<String>, input_size: u32) -> Result<Self, ClassifierError> {
        let program = which::which(command)
            .map_err(|e| ClassifierError::Unavailable(format!("{command}: {e}")))?;
        if input_size == 0 {
            return Err(ClassifierError::Unavailable("input size must be non-zero".into()));
        }
        info!(program = %program.display(), input_size, "detector command resolved");
        Ok(Self {
            program,
            args,
            input_size,
            name: command.to_string(),
        })
    }
}

#[async_trait]
impl Classifier for CommandClassifier {
    fn input_size(&self) -> (u32, u32) {
        (self.input_size, self.input_size)
    }

    async fn recognize(&self, image: &RgbImage) -> Result<Vec<Detection>, ClassifierError> {
        let png = encode_png(image)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClassifierError::Failed(format!("spawn {}: {e}", self.name)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClassifierError::Failed("could not get stdin handle".into()))?;
        stdin
            .write_all(&png)
            .await
            .map_err(|e| ClassifierError::Failed(format!("write frame: {e}")))?;
        // Close stdin so the detector sees end of input.
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ClassifierError::Failed(format!("wait: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(stderr = %stderr, "detector exited with error");
            return Err(ClassifierError::Failed(format!(
                "{} exited with {}",
                self.name, output.status
            )));
        }

        let detections = parse_detections(&output.stdout)?;
        debug!(count = detections.len(), "detector returned objects");
        Ok(detections)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>, ClassifierError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| ClassifierError::Failed(format!("encode frame: {e}")))?;
    Ok(buf.into_inner())
}

fn parse_detections(stdout: &[u8]) -> Result<Vec<Detection>, ClassifierError> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(stdout)
        .map_err(|e| ClassifierError::Failed(format!("bad detector output: {e}")))
}
