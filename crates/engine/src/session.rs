use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::SessionSnapshot;
use crate::asset::VideoAsset;
use crate::backend::{FfmpegTool, Filesystem, LocalFilesystem, MediaTool};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::supervisor::{
    JobCompletion, JobId, JobProgress, JobState, JobUpdate, SupervisorPhase, SupervisorSettings,
    TrimJob, TrimSupervisor,
};
use crate::trim::{TrimEdge, TrimRange};

/// The clip currently loaded in the editor, its trim range and the trim job
/// running against it.
///
/// While a job is in flight the asset cannot be replaced or discarded, but
/// the range stays editable; the job keeps the window it was started with.
/// A successful trim rebinds the session to the produced clip.
///
/// # Example
/// ```no_run
/// use trim_engine::{ClipSession, EngineConfig, TrimEdge};
///
/// let mut session = ClipSession::with_ffmpeg(&EngineConfig::default());
/// session.import_path("take.mp4")?;
/// session.update_trim(TrimEdge::Out, 4.0)?;
/// let trimmed = session.apply_trim_blocking()?;
/// println!("wrote {}", trimmed.path.display());
/// # Ok::<(), trim_engine::EngineError>(())
/// ```
#[derive(Debug)]
pub struct ClipSession<T, F>
where
    T: MediaTool,
    F: Filesystem,
{
    asset: Option<VideoAsset>,
    range: Option<TrimRange>,
    min_gap: f64,
    supervisor: TrimSupervisor<T, F>,
}

impl ClipSession<FfmpegTool, LocalFilesystem> {
    /// Creates a session backed by the FFmpeg CLI and the local disk.
    pub fn with_ffmpeg(config: &EngineConfig) -> Self {
        Self::new(FfmpegTool::from_config(config), LocalFilesystem, config)
    }
}

impl<T, F> ClipSession<T, F>
where
    T: MediaTool,
    F: Filesystem,
{
    pub fn new(tool: T, fs: F, config: &EngineConfig) -> Self {
        Self {
            asset: None,
            range: None,
            min_gap: config.min_gap_seconds,
            supervisor: TrimSupervisor::new(tool, fs, SupervisorSettings::from(config)),
        }
    }

    pub fn asset(&self) -> Option<&VideoAsset> {
        self.asset.as_ref()
    }

    pub fn trim_range(&self) -> Option<&TrimRange> {
        self.range.as_ref()
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.supervisor.phase()
    }

    /// The in-flight job, else the most recently resolved one.
    pub fn current_job(&self) -> Option<&TrimJob> {
        self.supervisor
            .active_job()
            .or_else(|| self.supervisor.last_job())
    }

    /// The most recently resolved job.
    pub fn last_job(&self) -> Option<&TrimJob> {
        self.supervisor.last_job()
    }

    pub fn job_state(&self) -> Option<JobState> {
        self.current_job().map(|job| job.state)
    }

    pub fn job_progress(&self) -> Option<JobProgress> {
        self.supervisor.progress()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            asset: self.asset.clone(),
            trim: self.range,
            phase: self.phase(),
            job: self.current_job().cloned(),
            progress: self.job_progress(),
        }
    }

    /// Probes `path` and binds the resulting asset.
    pub fn import_path(&mut self, path: impl Into<PathBuf>) -> Result<VideoAsset> {
        let path = path.into();
        self.ensure_idle()?;
        let fs = self.supervisor.filesystem();
        if !fs.exists(&path) {
            return Err(EngineError::PreconditionFailed {
                path,
                reason: "input file does not exist",
            });
        }
        let stat = fs.stat(&path).map_err(|source| EngineError::Io {
            context: "stat imported clip",
            path: path.clone(),
            source,
        })?;

        let probed = self.supervisor.tool().probe(&path)?;
        let duration_seconds = probed
            .duration_seconds
            .ok_or_else(|| EngineError::MissingDuration(path.clone()))?;
        let asset = VideoAsset::new(path, duration_seconds)
            .with_size(stat.size_bytes)
            .with_dimensions(probed.width, probed.height);

        self.bind_asset(asset.clone())?;
        Ok(asset)
    }

    /// Replaces the current clip and resets the range to cover all of it.
    ///
    /// An asset without a positive duration is rejected and leaves the
    /// session unchanged.
    pub fn bind_asset(&mut self, asset: VideoAsset) -> Result<()> {
        self.ensure_idle()?;
        self.install(asset)?;
        self.supervisor.clear_last_job();
        Ok(())
    }

    /// Moves one trim handle and returns the resulting range.
    pub fn update_trim(&mut self, edge: TrimEdge, value: f64) -> Result<TrimRange> {
        let range = self.range.as_mut().ok_or(EngineError::NoClipLoaded)?;
        let stored = range.set_edge(edge, value);
        debug!(?edge, requested = value, stored, "trim handle moved");
        Ok(*range)
    }

    /// Starts trimming the current clip to the current range.
    pub fn apply_trim(&mut self) -> Result<JobId> {
        let (Some(asset), Some(range)) = (self.asset.as_ref(), self.range.as_ref()) else {
            return Err(EngineError::NoClipLoaded);
        };
        self.supervisor.start(asset, range)
    }

    /// Collects job updates without blocking; a success rebinds the session.
    pub fn poll_job(&mut self) -> Vec<JobUpdate> {
        let updates = self.supervisor.poll();
        for update in &updates {
            if let JobUpdate::Finished(completion) = update {
                self.absorb(completion);
            }
        }
        updates
    }

    /// Blocks until the in-flight job resolves and returns the produced clip.
    pub fn wait_for_job(&mut self, timeout: Option<Duration>) -> Result<VideoAsset> {
        let completion = self.supervisor.wait(timeout)?;
        self.absorb(&completion);
        completion.outcome
    }

    /// Starts a trim and waits for it.
    pub fn apply_trim_blocking(&mut self) -> Result<VideoAsset> {
        self.apply_trim()?;
        self.wait_for_job(None)
    }

    /// Cancels the in-flight job. The current clip stays bound.
    pub fn cancel_job(&mut self) -> Result<TrimJob> {
        self.supervisor.cancel()
    }

    /// Drops the current clip, its range and the last job record.
    pub fn discard_clip(&mut self) -> Result<()> {
        self.ensure_idle()?;
        if let Some(asset) = self.asset.take() {
            info!(path = %asset.path.display(), "clip discarded");
        }
        self.range = None;
        self.supervisor.clear_last_job();
        Ok(())
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.supervisor.active_job() {
            Some(job) => Err(EngineError::JobAlreadyInFlight { job_id: job.job_id }),
            None => Ok(()),
        }
    }

    fn install(&mut self, asset: VideoAsset) -> Result<()> {
        let invalid = || EngineError::InvalidAsset {
            path: asset.path.clone(),
            duration_seconds: asset.duration_seconds,
        };
        if !asset.is_usable() {
            return Err(invalid());
        }
        let range = TrimRange::new(asset.duration_seconds, self.min_gap).map_err(|_| invalid())?;

        info!(
            path = %asset.path.display(),
            duration_seconds = asset.duration_seconds,
            "clip bound"
        );
        self.asset = Some(asset);
        self.range = Some(range);
        Ok(())
    }

    fn absorb(&mut self, completion: &JobCompletion) {
        if let Ok(produced) = &completion.outcome {
            if let Err(error) = self.install(produced.clone()) {
                warn!(job_id = completion.job.job_id, %error, "trimmed clip could not be bound");
            }
        }
    }
}
