use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::trim::DEFAULT_MIN_GAP_SECONDS;

/// Grace period between a graceful stop request and a forced kill.
pub const DEFAULT_CANCEL_GRACE_MS: u64 = 5_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Engine settings, loadable from a JSON file. Missing keys take defaults.
///
/// # Example
/// ```
/// use trim_engine::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{ "min_gap_seconds": 0.25 }"#)
///     .expect("valid config");
/// assert_eq!(config.min_gap_seconds, 0.25);
/// assert_eq!(config.cancel_grace_ms, 5_000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub min_gap_seconds: f64,
    pub cancel_grace_ms: u64,
    pub poll_interval_ms: u64,
    /// Copies streams instead of re-encoding the trimmed window.
    pub stream_copy: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from(media_ffmpeg::DEFAULT_FFMPEG),
            ffprobe_path: PathBuf::from(media_ffmpeg::DEFAULT_FFPROBE),
            min_gap_seconds: DEFAULT_MIN_GAP_SECONDS,
            cancel_grace_ms: DEFAULT_CANCEL_GRACE_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stream_copy: true,
        }
    }
}

impl EngineConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&text).map_err(|source| EngineError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), ?config, "config loaded");
        config.validate()
    }

    /// Parses and validates config from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|source| EngineError::ConfigParse {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        config.validate()
    }

    pub fn validate(self) -> Result<Self> {
        if !self.min_gap_seconds.is_finite() || self.min_gap_seconds <= 0.0 {
            return Err(EngineError::InvalidConfig {
                reason: "min_gap_seconds must be positive",
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "poll_interval_ms must be positive",
            });
        }
        if self.ffmpeg_path.as_os_str().is_empty() || self.ffprobe_path.as_os_str().is_empty() {
            return Err(EngineError::InvalidConfig {
                reason: "tool paths must not be empty",
            });
        }
        Ok(self)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
