use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::DisplaySize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub video: VideoConfig,
    pub detector: DetectorConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoConfig {
    pub path: PathBuf,
    #[serde(default = "default_samples_per_second")]
    pub samples_per_second: u32,
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_target_label")]
    pub target_label: String,
    #[serde(default = "default_detector_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_display_width")]
    pub width: u32,
    #[serde(default = "default_display_height")]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_player")]
    pub player: String,
    /// JSON-lines record of every overlay change, if set.
    #[serde(default)]
    pub overlay_track: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_display_width(),
            height: default_display_height(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            player: default_player(),
            overlay_track: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.video.samples_per_second;
        if rate == 0 || rate > MAX_SAMPLES_PER_SECOND {
            return Err(ConfigError::Invalid(format!(
                "video.samples_per_second must be within 1..={MAX_SAMPLES_PER_SECOND}, got {rate}"
            )));
        }
        if self.detector.input_size == 0 {
            return Err(ConfigError::Invalid("detector.input_size must be non-zero".into()));
        }
        if self.detector.target_label.trim().is_empty() {
            return Err(ConfigError::Invalid("detector.target_label must not be empty".into()));
        }
        if self.display.width == 0 || self.display.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "display size must be non-zero, got {}x{}",
                self.display.width, self.display.height
            )));
        }
        Ok(())
    }
}

impl VideoConfig {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

impl DetectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl DisplayConfig {
    pub fn size(&self) -> DisplaySize {
        DisplaySize::new(self.width, self.height)
    }
}

/// Upper bound keeps the per-sample interval at one millisecond or more.
pub const MAX_SAMPLES_PER_SECOND: u32 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_samples_per_second() -> u32 {
    1
}
fn default_frame_timeout_ms() -> u64 {
    10_000
}
fn default_input_size() -> u32 {
    300
}
fn default_target_label() -> String {
    "person".into()
}
fn default_detector_timeout_ms() -> u64 {
    5_000
}
fn default_display_width() -> u32 {
    1280
}
fn default_display_height() -> u32 {
    720
}
fn default_player() -> String {
    "ffplay".into()
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[video]
path = "assets/video_sample.mp4"

[detector]
command = "detect-objects"
"#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.video.samples_per_second, 1);
        assert_eq!(config.video.frame_timeout(), Duration::from_secs(10));
        assert_eq!(config.detector.input_size, 300);
        assert_eq!(config.detector.target_label, "person");
        assert!(config.detector.args.is_empty());
        assert_eq!(config.display.size(), DisplaySize::new(1280, 720));
        assert_eq!(config.playback.player, "ffplay");
        assert!(config.playback.overlay_track.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn rejects_zero_rate() {
        let toml = MINIMAL.replace(
            "path = \"assets/video_sample.mp4\"",
            "path = \"v.mp4\"\nsamples_per_second = 0",
        );
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_target_label() {
        let toml = format!("{MINIMAL}target_label = \"  \"\n");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_detector_section_is_parse_error() {
        let err = Config::from_toml("[video]\npath = \"v.mp4\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{MINIMAL}\n[display]\nwidth = 600\nheight = 900\n\n[playback]\noverlay_track = \"track.jsonl\"\n"
        )
        .unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.display.size(), DisplaySize::new(600, 900));
        assert_eq!(
            config.playback.overlay_track.as_deref(),
            Some(Path::new("track.jsonl"))
        );
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let err = Config::load(Path::new("/nonexistent/frame-overlay.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile(..)));
    }
}
