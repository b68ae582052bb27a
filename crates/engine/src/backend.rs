use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Filesystem metadata the engine needs about a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size_bytes: u64,
    pub modified: Option<SystemTime>,
}

/// Filesystem operations required by the engine.
pub trait Filesystem {
    fn exists(&self, path: &Path) -> bool;

    /// Returns whether the file can be opened for reading.
    fn is_readable(&self, path: &Path) -> bool;

    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// Result of probing one media file.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProbedMedia {
    pub duration_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Arguments handed to the external trim tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub start_time_seconds: f64,
    pub duration_seconds: f64,
}

/// Exit report of the external trim tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExit {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stderr: String,
}

impl ToolExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Handle on one running external trim process.
pub trait ToolProcess: Send {
    /// Polls for completion without blocking.
    fn try_wait(&mut self) -> Result<Option<ToolExit>>;

    /// Asks the process to stop gracefully.
    fn terminate(&mut self) -> Result<()>;

    /// Forcibly stops the process.
    fn kill(&mut self) -> Result<()>;

    /// Seconds of output written so far, when the tool reports it.
    fn progress_seconds(&self) -> Option<f64> {
        None
    }
}

/// Media operations required by the engine.
pub trait MediaTool {
    /// Probes duration and dimensions for import.
    fn probe(&self, path: &Path) -> Result<ProbedMedia>;

    /// Probes only the duration; `None` when it cannot be determined.
    fn probe_duration(&self, path: &Path) -> Option<f64> {
        self.probe(path)
            .ok()
            .and_then(|probed| probed.duration_seconds)
            .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
    }

    /// Starts the external trim without waiting for it.
    fn spawn_trim(&self, request: &ToolRequest) -> Result<Box<dyn ToolProcess>>;
}

/// `std::fs`-backed filesystem used by production wiring.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFilesystem;

impl Filesystem for LocalFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_readable(&self, path: &Path) -> bool {
        fs::File::open(path).is_ok()
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let metadata = fs::metadata(path)?;
        Ok(FileStat {
            size_bytes: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// FFmpeg CLI-backed tool used by production wiring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegTool {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub stream_copy: bool,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from(media_ffmpeg::DEFAULT_FFMPEG),
            ffprobe_path: PathBuf::from(media_ffmpeg::DEFAULT_FFPROBE),
            stream_copy: true,
        }
    }
}

impl FfmpegTool {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            stream_copy: config.stream_copy,
        }
    }
}

impl MediaTool for FfmpegTool {
    fn probe(&self, path: &Path) -> Result<ProbedMedia> {
        let info = media_ffmpeg::probe_media_with(&self.ffprobe_path, path)?;
        let video = info.first_video();
        Ok(ProbedMedia {
            duration_seconds: info.best_duration_seconds(),
            width: video.and_then(|stream| stream.width),
            height: video.and_then(|stream| stream.height),
        })
    }

    fn probe_duration(&self, path: &Path) -> Option<f64> {
        match media_ffmpeg::probe_duration_seconds(&self.ffprobe_path, path) {
            Ok(seconds) => Some(seconds),
            Err(error) => {
                debug!(path = %path.display(), %error, "duration probe failed");
                None
            }
        }
    }

    fn spawn_trim(&self, request: &ToolRequest) -> Result<Box<dyn ToolProcess>> {
        let process = media_ffmpeg::spawn_trim(
            &self.ffmpeg_path,
            &media_ffmpeg::TrimRequest {
                input_path: request.input_path.clone(),
                output_path: request.output_path.clone(),
                start_seconds: request.start_time_seconds,
                duration_seconds: request.duration_seconds,
                stream_copy: self.stream_copy,
            },
        )?;
        Ok(Box::new(process))
    }
}

impl ToolProcess for media_ffmpeg::TrimProcess {
    fn try_wait(&mut self) -> Result<Option<ToolExit>> {
        let exit = media_ffmpeg::TrimProcess::try_wait(self)?;
        Ok(exit.map(|exit| ToolExit {
            code: exit.status.code(),
            stderr: exit.stderr,
        }))
    }

    fn terminate(&mut self) -> Result<()> {
        self.request_stop().map_err(EngineError::from)
    }

    fn kill(&mut self) -> Result<()> {
        media_ffmpeg::TrimProcess::kill(self).map_err(EngineError::from)
    }

    fn progress_seconds(&self) -> Option<f64> {
        media_ffmpeg::TrimProcess::progress_seconds(self)
    }
}
