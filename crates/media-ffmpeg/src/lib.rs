//! Thin wrappers around the `ffprobe` and `ffmpeg` command-line tools.

mod error;
mod probe;
mod trim;

pub use error::{MediaFfmpegError, Result};
pub use probe::{
    DEFAULT_FFPROBE, MediaInfo, StreamInfo, StreamKind, probe_duration_seconds, probe_media,
    probe_media_with,
};
pub use trim::{DEFAULT_FFMPEG, TrimExit, TrimProcess, TrimRequest, build_trim_args, spawn_trim};
