use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use serde::Serialize;

use crate::supervisor::JobId;

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by session commands, trim edits and trim jobs.
#[derive(Debug)]
pub enum EngineError {
    NoClipLoaded,
    InvalidAsset {
        path: PathBuf,
        duration_seconds: f64,
    },
    InvalidRange {
        in_time: f64,
        out_time: f64,
        duration_seconds: f64,
    },
    InvalidPath(PathBuf),
    MissingDuration(PathBuf),
    JobAlreadyInFlight {
        job_id: JobId,
    },
    NoJobRunning,
    WaitTimedOut {
        job_id: JobId,
    },
    PreconditionFailed {
        path: PathBuf,
        reason: &'static str,
    },
    ExternalTool {
        reason: String,
    },
    OutputNotCreated(PathBuf),
    OutputEmpty(PathBuf),
    Cancelled {
        job_id: JobId,
    },
    Io {
        context: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    InvalidConfig {
        reason: &'static str,
    },
    Media(media_ffmpeg::MediaFfmpegError),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoClipLoaded => write!(f, "no clip is loaded"),
            Self::InvalidAsset {
                path,
                duration_seconds,
            } => write!(
                f,
                "asset has no usable duration ({duration_seconds}s): {}",
                path.display()
            ),
            Self::InvalidRange {
                in_time,
                out_time,
                duration_seconds,
            } => write!(
                f,
                "invalid trim range {in_time}..{out_time} for a {duration_seconds}s clip"
            ),
            Self::InvalidPath(path) => {
                write!(f, "path has no file stem or extension: {}", path.display())
            }
            Self::MissingDuration(path) => {
                write!(f, "media duration is missing: {}", path.display())
            }
            Self::JobAlreadyInFlight { job_id } => {
                write!(f, "trim job {job_id} is still in flight")
            }
            Self::NoJobRunning => write!(f, "no trim job is running"),
            Self::WaitTimedOut { job_id } => {
                write!(f, "timed out waiting for trim job {job_id}")
            }
            Self::PreconditionFailed { path, reason } => {
                write!(f, "{reason}: {}", path.display())
            }
            Self::ExternalTool { reason } => write!(f, "external media tool failed: {reason}"),
            Self::OutputNotCreated(path) => {
                write!(f, "trim output was not created: {}", path.display())
            }
            Self::OutputEmpty(path) => write!(f, "trim output is empty: {}", path.display()),
            Self::Cancelled { job_id } => write!(f, "trim job {job_id} was cancelled"),
            Self::Io {
                context,
                path,
                source,
            } => write!(f, "{context}: {} ({source})", path.display()),
            Self::ConfigIo { path, source } => {
                write!(f, "failed to read config {} ({source})", path.display())
            }
            Self::ConfigParse { path, source } => {
                write!(f, "failed to parse config {} ({source})", path.display())
            }
            Self::InvalidConfig { reason } => write!(f, "invalid config: {reason}"),
            Self::Media(err) => write!(f, "media backend error: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::ConfigIo { source, .. } => Some(source),
            Self::ConfigParse { source, .. } => Some(source),
            Self::Media(err) => Some(err),
            _ => None,
        }
    }
}

impl From<media_ffmpeg::MediaFfmpegError> for EngineError {
    fn from(value: media_ffmpeg::MediaFfmpegError) -> Self {
        Self::Media(value)
    }
}

/// Coarse error classification shared with UIs and job records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineErrorKind {
    NoClipLoaded,
    InvalidAsset,
    InvalidRange,
    InvalidPath,
    JobAlreadyInFlight,
    NoJobRunning,
    PreconditionFailed,
    ExternalTool,
    OutputNotCreated,
    OutputEmpty,
    Cancelled,
    Other,
}

impl From<&EngineError> for EngineErrorKind {
    fn from(value: &EngineError) -> Self {
        match value {
            EngineError::NoClipLoaded => Self::NoClipLoaded,
            EngineError::InvalidAsset { .. } | EngineError::MissingDuration(_) => {
                Self::InvalidAsset
            }
            EngineError::InvalidRange { .. } => Self::InvalidRange,
            EngineError::InvalidPath(_) => Self::InvalidPath,
            EngineError::JobAlreadyInFlight { .. } => Self::JobAlreadyInFlight,
            EngineError::NoJobRunning => Self::NoJobRunning,
            EngineError::PreconditionFailed { .. } => Self::PreconditionFailed,
            EngineError::ExternalTool { .. } | EngineError::Media(_) => Self::ExternalTool,
            EngineError::OutputNotCreated(_) => Self::OutputNotCreated,
            EngineError::OutputEmpty(_) => Self::OutputEmpty,
            EngineError::Cancelled { .. } => Self::Cancelled,
            _ => Self::Other,
        }
    }
}
