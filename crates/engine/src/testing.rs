//! In-memory filesystem and scripted trim tool for unit tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use media_ffmpeg::MediaFfmpegError;

use crate::backend::{
    FileStat, Filesystem, MediaTool, ProbedMedia, ToolExit, ToolProcess, ToolRequest,
};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeFilesystem {
    files: Arc<Mutex<HashMap<PathBuf, u64>>>,
    unreadable: Arc<Mutex<HashSet<PathBuf>>>,
    removed: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeFilesystem {
    pub(crate) fn with_file(self, path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        self.insert(path, size_bytes);
        self
    }

    pub(crate) fn insert(&self, path: impl Into<PathBuf>, size_bytes: u64) {
        lock(&self.files).insert(path.into(), size_bytes);
    }

    pub(crate) fn mark_unreadable(&self, path: impl Into<PathBuf>) {
        lock(&self.unreadable).insert(path.into());
    }

    pub(crate) fn contains(&self, path: &Path) -> bool {
        lock(&self.files).contains_key(path)
    }

    pub(crate) fn removed(&self) -> Vec<PathBuf> {
        lock(&self.removed).clone()
    }
}

impl Filesystem for FakeFilesystem {
    fn exists(&self, path: &Path) -> bool {
        self.contains(path)
    }

    fn is_readable(&self, path: &Path) -> bool {
        self.contains(path) && !lock(&self.unreadable).contains(path)
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        lock(&self.files)
            .get(path)
            .map(|size_bytes| FileStat {
                size_bytes: *size_bytes,
                modified: None,
            })
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        if lock(&self.files).remove(path).is_none() {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        lock(&self.removed).push(path.to_path_buf());
        Ok(())
    }
}

/// What the scripted tool does once spawned.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FakeRun {
    /// Writes `size` bytes to the output and exits 0.
    WriteOutput { size: u64 },
    /// Exits 0 without writing anything.
    ExitWithoutOutput,
    Fail { code: i32, stderr: &'static str },
    /// Runs until stopped, optionally leaving a partial output behind.
    Hang {
        honor_terminate: bool,
        partial_bytes: u64,
    },
    /// Never exits; a stop request blocks for `stall` before returning.
    Wedged { stall: Duration },
    SpawnError,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeTool {
    fs: FakeFilesystem,
    run: Arc<Mutex<FakeRun>>,
    probed: Arc<Mutex<ProbedMedia>>,
    output_duration: Arc<Mutex<Option<f64>>>,
    requests: Arc<Mutex<Vec<ToolRequest>>>,
    pub(crate) terminate_count: Arc<AtomicUsize>,
    pub(crate) kill_count: Arc<AtomicUsize>,
}

impl FakeTool {
    pub(crate) fn new(fs: FakeFilesystem, run: FakeRun) -> Self {
        Self {
            fs,
            run: Arc::new(Mutex::new(run)),
            probed: Arc::new(Mutex::new(ProbedMedia::default())),
            output_duration: Arc::new(Mutex::new(None)),
            requests: Arc::new(Mutex::new(Vec::new())),
            terminate_count: Arc::new(AtomicUsize::new(0)),
            kill_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn set_probe(&self, probed: ProbedMedia) {
        *lock(&self.probed) = probed;
    }

    pub(crate) fn set_output_duration(&self, seconds: Option<f64>) {
        *lock(&self.output_duration) = seconds;
    }

    pub(crate) fn requests(&self) -> Vec<ToolRequest> {
        lock(&self.requests).clone()
    }
}

impl MediaTool for FakeTool {
    fn probe(&self, _path: &Path) -> Result<ProbedMedia> {
        Ok(*lock(&self.probed))
    }

    fn probe_duration(&self, _path: &Path) -> Option<f64> {
        *lock(&self.output_duration)
    }

    fn spawn_trim(&self, request: &ToolRequest) -> Result<Box<dyn ToolProcess>> {
        lock(&self.requests).push(request.clone());
        let run = lock(&self.run).clone();
        match run {
            FakeRun::SpawnError => {
                return Err(EngineError::Media(MediaFfmpegError::Io {
                    context: "spawn ffmpeg trim",
                    source: io::Error::new(io::ErrorKind::NotFound, "ffmpeg not found"),
                }));
            }
            FakeRun::Hang { partial_bytes, .. } if partial_bytes > 0 => {
                self.fs.insert(request.output_path.clone(), partial_bytes);
            }
            _ => {}
        }
        Ok(Box::new(FakeProcess {
            run,
            fs: self.fs.clone(),
            output_path: request.output_path.clone(),
            terminated: false,
            killed: false,
            terminate_count: Arc::clone(&self.terminate_count),
            kill_count: Arc::clone(&self.kill_count),
        }))
    }
}

struct FakeProcess {
    run: FakeRun,
    fs: FakeFilesystem,
    output_path: PathBuf,
    terminated: bool,
    killed: bool,
    terminate_count: Arc<AtomicUsize>,
    kill_count: Arc<AtomicUsize>,
}

impl ToolProcess for FakeProcess {
    fn try_wait(&mut self) -> Result<Option<ToolExit>> {
        let exit = match &self.run {
            FakeRun::WriteOutput { size } => {
                self.fs.insert(self.output_path.clone(), *size);
                Some(exit_with(Some(0), ""))
            }
            FakeRun::ExitWithoutOutput | FakeRun::SpawnError => Some(exit_with(Some(0), "")),
            FakeRun::Fail { code, stderr } => Some(exit_with(Some(*code), stderr)),
            FakeRun::Hang {
                honor_terminate, ..
            } => {
                if self.killed {
                    Some(exit_with(None, ""))
                } else if self.terminated && *honor_terminate {
                    Some(exit_with(Some(255), "Exiting normally, received signal 2."))
                } else {
                    None
                }
            }
            FakeRun::Wedged { .. } => None,
        };
        Ok(exit)
    }

    fn terminate(&mut self) -> Result<()> {
        self.terminated = true;
        self.terminate_count.fetch_add(1, Ordering::SeqCst);
        if let FakeRun::Wedged { stall } = self.run {
            thread::sleep(stall);
        }
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        self.killed = true;
        self.kill_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn progress_seconds(&self) -> Option<f64> {
        matches!(self.run, FakeRun::Hang { .. }).then_some(0.5)
    }
}

fn exit_with(code: Option<i32>, stderr: &str) -> ToolExit {
    ToolExit {
        code,
        stderr: stderr.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
