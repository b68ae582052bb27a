use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use crate::error::{MediaFfmpegError, Result};

/// Default `ffprobe` executable resolved through `PATH`.
pub const DEFAULT_FFPROBE: &str = "ffprobe";

/// Stream kind discovered by probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Other,
}

/// Stream metadata read from `ffprobe`.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub index: u32,
    pub kind: StreamKind,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<f64>,
}

/// Media probe result.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub format_name: Option<String>,
    pub size_bytes: Option<u64>,
    pub duration_seconds: Option<f64>,
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    /// Returns the first video stream.
    ///
    /// # Example
    /// ```no_run
    /// use media_ffmpeg::probe_media;
    ///
    /// let info = probe_media("sample.mp4").expect("probe should succeed");
    /// let _video = info.first_video().expect("video stream exists");
    /// ```
    pub fn first_video(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|stream| stream.kind == StreamKind::Video)
    }

    /// Returns the container duration, falling back to the longest stream.
    pub fn best_duration_seconds(&self) -> Option<f64> {
        let container = self
            .duration_seconds
            .filter(|seconds| seconds.is_finite() && *seconds > 0.0);
        if container.is_some() {
            return container;
        }

        self.streams
            .iter()
            .filter_map(|stream| stream.duration_seconds)
            .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
            .fold(None, |best: Option<f64>, seconds| {
                Some(best.map_or(seconds, |current| current.max(seconds)))
            })
    }
}

#[derive(Debug, Deserialize)]
struct RawProbe {
    #[serde(default)]
    streams: Vec<RawStream>,
    format: Option<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

/// Probes a media file via the `ffprobe` found on `PATH`.
///
/// # Example
/// ```no_run
/// use media_ffmpeg::probe_media;
///
/// let info = probe_media("sample.mp4").expect("probe should succeed");
/// assert!(!info.streams.is_empty());
/// ```
pub fn probe_media(path: impl AsRef<Path>) -> Result<MediaInfo> {
    probe_media_with(Path::new(DEFAULT_FFPROBE), path)
}

/// Probes a media file with an explicit `ffprobe` executable.
pub fn probe_media_with(ffprobe: &Path, path: impl AsRef<Path>) -> Result<MediaInfo> {
    let path = path.as_ref();

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_entries",
            "stream=index,codec_type,codec_name,width,height,duration:format=format_name,duration,size",
        ])
        .arg(path)
        .output()
        .map_err(|source| MediaFfmpegError::Io {
            context: "run ffprobe",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: format!("ffprobe {}", path.display()),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let info = parse_probe_json(path, &output.stdout)?;
    debug!(
        path = %path.display(),
        streams = info.streams.len(),
        duration_seconds = ?info.duration_seconds,
        "probe finished"
    );
    Ok(info)
}

/// Probes only the playable duration of a file.
pub fn probe_duration_seconds(ffprobe: &Path, path: impl AsRef<Path>) -> Result<f64> {
    let path = path.as_ref();
    probe_media_with(ffprobe, path)?
        .best_duration_seconds()
        .ok_or_else(|| MediaFfmpegError::MissingDuration(path.to_path_buf()))
}

fn parse_probe_json(path: &Path, stdout: &[u8]) -> Result<MediaInfo> {
    let raw: RawProbe = serde_json::from_slice(stdout).map_err(|source| MediaFfmpegError::Json {
        context: "ffprobe output",
        source,
    })?;

    let mut streams = Vec::with_capacity(raw.streams.len());
    for stream in raw.streams {
        let kind = match stream.codec_type.as_deref() {
            Some("video") => StreamKind::Video,
            Some("audio") => StreamKind::Audio,
            _ => StreamKind::Other,
        };
        streams.push(StreamInfo {
            index: stream.index,
            kind,
            codec_name: stream.codec_name,
            width: stream.width,
            height: stream.height,
            duration_seconds: parse_optional(stream.duration.as_deref(), "stream duration")?,
        });
    }

    let (format_name, duration_seconds, size_bytes) = match raw.format {
        Some(format) => (
            format.format_name,
            parse_optional(format.duration.as_deref(), "format duration")?,
            parse_optional(format.size.as_deref(), "format size")?,
        ),
        None => (None, None, None),
    };

    Ok(MediaInfo {
        path: path.to_path_buf(),
        format_name,
        size_bytes,
        duration_seconds,
        streams,
    })
}

fn parse_optional<T>(value: Option<&str>, context: &'static str) -> Result<Option<T>>
where
    T: std::str::FromStr,
{
    let Some(raw) = value else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() || raw == "N/A" {
        return Ok(None);
    }

    raw.parse::<T>()
        .map(Some)
        .map_err(|_| MediaFfmpegError::Parse {
            context,
            value: raw.to_string(),
        })
}
