use std::ffi::OsString;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use crate::error::{MediaFfmpegError, Result};

/// Default `ffmpeg` executable resolved through `PATH`.
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

const STDERR_TAIL_BYTES: usize = 8 * 1024;
const PROGRESS_UNKNOWN: u64 = u64::MAX;

/// Request payload for a single time-range extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub start_seconds: f64,
    pub duration_seconds: f64,
    /// Copies streams instead of re-encoding. Cuts then snap to keyframes.
    pub stream_copy: bool,
}

/// Exit report of a finished trim process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimExit {
    pub status: ExitStatus,
    pub stderr: String,
}

/// A running `ffmpeg` trim invocation.
///
/// Stdout carries `-progress` key/value lines and stderr is kept as a bounded
/// tail; both are drained on background threads so the child never blocks on
/// a full pipe.
#[derive(Debug)]
pub struct TrimProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    progress_us: Arc<AtomicU64>,
    stderr_tail: Arc<Mutex<String>>,
    readers: Vec<JoinHandle<()>>,
}

/// Builds the `ffmpeg` argument list for `request`.
///
/// # Example
/// ```
/// use std::path::PathBuf;
/// use media_ffmpeg::{TrimRequest, build_trim_args};
///
/// let args = build_trim_args(&TrimRequest {
///     input_path: PathBuf::from("in.mp4"),
///     output_path: PathBuf::from("out.mp4"),
///     start_seconds: 1.5,
///     duration_seconds: 2.0,
///     stream_copy: true,
/// });
/// assert!(args.iter().any(|arg| arg == "-ss"));
/// ```
pub fn build_trim_args(request: &TrimRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-v", "error", "-nostats", "-y", "-ss"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(format_seconds(request.start_seconds).into());
    args.push("-i".into());
    args.push(request.input_path.clone().into_os_string());
    args.push("-t".into());
    args.push(format_seconds(request.duration_seconds).into());
    if request.stream_copy {
        args.extend(["-c", "copy"].map(OsString::from));
    } else {
        args.extend(
            ["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac"].map(OsString::from),
        );
    }
    args.extend(["-avoid_negative_ts", "make_zero", "-progress", "pipe:1"].map(OsString::from));
    args.push(request.output_path.clone().into_os_string());
    args
}

/// Spawns `ffmpeg` for `request` without waiting for it.
pub fn spawn_trim(ffmpeg: &Path, request: &TrimRequest) -> Result<TrimProcess> {
    validate_request(request)?;

    let mut child = Command::new(ffmpeg)
        .args(build_trim_args(request))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| MediaFfmpegError::Io {
            context: "spawn ffmpeg trim",
            source,
        })?;

    let stdin = child.stdin.take();
    let progress_us = Arc::new(AtomicU64::new(PROGRESS_UNKNOWN));
    let stderr_tail = Arc::new(Mutex::new(String::new()));
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_progress_reader(stdout, Arc::clone(&progress_us)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_stderr_reader(stderr, Arc::clone(&stderr_tail)));
    }

    info!(
        pid = child.id(),
        input = %request.input_path.display(),
        output = %request.output_path.display(),
        start_seconds = request.start_seconds,
        duration_seconds = request.duration_seconds,
        "ffmpeg trim spawned"
    );

    Ok(TrimProcess {
        child,
        stdin,
        progress_us,
        stderr_tail,
        readers,
    })
}

impl TrimProcess {
    /// OS process id of the child.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Polls the child without blocking.
    pub fn try_wait(&mut self) -> Result<Option<TrimExit>> {
        let status = self.child.try_wait().map_err(|source| MediaFfmpegError::Io {
            context: "poll ffmpeg trim",
            source,
        })?;
        let Some(status) = status else {
            return Ok(None);
        };

        for reader in self.readers.drain(..) {
            let _ = reader.join();
        }
        let stderr = self
            .stderr_tail
            .lock()
            .map(|tail| tail.clone())
            .unwrap_or_default();
        debug!(pid = self.child.id(), %status, "ffmpeg trim exited");
        Ok(Some(TrimExit { status, stderr }))
    }

    /// Asks ffmpeg to finish gracefully by sending `q` on stdin.
    pub fn request_stop(&mut self) -> Result<()> {
        let Some(mut stdin) = self.stdin.take() else {
            return Ok(());
        };
        match stdin.write_all(b"q").and_then(|()| stdin.flush()) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::BrokenPipe => Ok(()),
            Err(source) => Err(MediaFfmpegError::Io {
                context: "send quit to ffmpeg",
                source,
            }),
        }
    }

    /// Forcibly terminates the child.
    pub fn kill(&mut self) -> Result<()> {
        match self.child.kill() {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::InvalidInput => Ok(()),
            Err(source) => Err(MediaFfmpegError::Io {
                context: "kill ffmpeg trim",
                source,
            }),
        }
    }

    /// Seconds of output written so far, once ffmpeg reported any progress.
    pub fn progress_seconds(&self) -> Option<f64> {
        match self.progress_us.load(Ordering::Relaxed) {
            PROGRESS_UNKNOWN => None,
            micros => Some(micros as f64 / 1_000_000.0),
        }
    }
}

fn validate_request(request: &TrimRequest) -> Result<()> {
    if !request.start_seconds.is_finite() || request.start_seconds < 0.0 {
        return Err(MediaFfmpegError::InvalidTrimRequest {
            reason: "start must be a non-negative number of seconds",
        });
    }
    if !request.duration_seconds.is_finite() || request.duration_seconds <= 0.0 {
        return Err(MediaFfmpegError::InvalidTrimRequest {
            reason: "duration must be positive",
        });
    }
    if request.input_path == request.output_path {
        return Err(MediaFfmpegError::InvalidTrimRequest {
            reason: "output path must differ from input path",
        });
    }
    Ok(())
}

fn format_seconds(seconds: f64) -> String {
    format!("{seconds:.6}")
}

fn spawn_progress_reader<R>(reader: R, progress_us: Arc<AtomicU64>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let reader = BufReader::new(reader);
        for line in reader.lines() {
            let Ok(line) = line else {
                break;
            };
            if let Some(micros) = parse_progress_line(&line) {
                progress_us.store(micros, Ordering::Relaxed);
            }
        }
    })
}

fn spawn_stderr_reader<R>(mut reader: R, tail: Arc<Mutex<String>>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0_u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(read) => {
                    let Ok(mut tail) = tail.lock() else {
                        break;
                    };
                    tail.push_str(&String::from_utf8_lossy(&buf[..read]));
                    if tail.len() > STDERR_TAIL_BYTES {
                        let mut cut = tail.len() - STDERR_TAIL_BYTES;
                        while !tail.is_char_boundary(cut) {
                            cut += 1;
                        }
                        tail.drain(..cut);
                    }
                }
            }
        }
    })
}

/// Parses `out_time_us=` (or the legacy, also microsecond, `out_time_ms=`).
fn parse_progress_line(line: &str) -> Option<u64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value.parse::<i64>().ok().map(|v| v.max(0) as u64),
        _ => None,
    }
}
