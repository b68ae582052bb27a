use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::asset::{VideoAsset, display_name, mime_type_for_path};
use crate::backend::{Filesystem, MediaTool, ToolExit, ToolProcess, ToolRequest};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineErrorKind, Result};
use crate::output::resolve_output_path;
use crate::trim::TrimRange;

/// Opaque identifier for trim jobs.
pub type JobId = u64;

/// Extra time allowed for a killed tool to be reaped.
const KILL_SETTLE: Duration = Duration::from_secs(1);
const STDERR_TAIL_CHARS: usize = 512;

/// Lifecycle state of one trim job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// What the supervisor is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SupervisorPhase {
    Idle,
    Running,
}

/// Error recorded on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobError {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl From<&EngineError> for JobError {
    fn from(value: &EngineError) -> Self {
        Self {
            kind: EngineErrorKind::from(value),
            message: value.to_string(),
        }
    }
}

/// One execution of the external trim tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrimJob {
    pub job_id: JobId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub in_time: f64,
    pub duration_seconds: f64,
    pub state: JobState,
    /// Present iff `state == Failed`.
    pub error: Option<JobError>,
    /// Present iff `state == Succeeded`.
    pub result_asset: Option<VideoAsset>,
}

impl TrimJob {
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|error| error.message.as_str())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Succeeded | JobState::Failed)
    }
}

/// Progress of the running job in seconds of output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JobProgress {
    pub job_id: JobId,
    pub done_seconds: f64,
    pub total_seconds: f64,
}

impl JobProgress {
    /// Completed share in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total_seconds > 0.0 {
            (self.done_seconds / self.total_seconds).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Terminal record of a job plus the outcome handed to its waiter.
#[derive(Debug)]
pub struct JobCompletion {
    pub job: TrimJob,
    pub outcome: Result<VideoAsset>,
}

/// Incremental job information collected by [`TrimSupervisor::poll`].
#[derive(Debug)]
pub enum JobUpdate {
    Progress(JobProgress),
    Finished(JobCompletion),
}

/// Timing knobs of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Wait between a graceful stop request and a forced kill.
    pub cancel_grace: Duration,
    /// How often the watcher polls the tool.
    pub poll_interval: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for SupervisorSettings {
    fn from(value: &EngineConfig) -> Self {
        Self {
            cancel_grace: value.cancel_grace(),
            poll_interval: value.poll_interval(),
        }
    }
}

enum WatchSignal {
    Cancel,
}

#[derive(Debug)]
enum WatchMessage {
    Progress(f64),
    Exited(ToolExit),
    Stopped { forced: bool },
    WaitFailed(String),
}

#[derive(Debug)]
enum Termination {
    Exited(ToolExit),
    Stopped { forced: bool },
    WaitFailed(String),
    WatcherLost,
}

#[derive(Debug)]
struct ActiveJob {
    job: TrimJob,
    source: VideoAsset,
    signals: Sender<WatchSignal>,
    messages: Receiver<WatchMessage>,
    progress_seconds: Option<f64>,
    started_at: Instant,
    cancel_requested: bool,
}

impl ActiveJob {
    fn progress(&self) -> JobProgress {
        JobProgress {
            job_id: self.job.job_id,
            done_seconds: self
                .progress_seconds
                .unwrap_or(0.0)
                .min(self.job.duration_seconds),
            total_seconds: self.job.duration_seconds,
        }
    }
}

/// Runs at most one external trim at a time and turns the tool's process
/// level outcome into a [`TrimJob`] state.
///
/// The tool runs out of process; a watcher thread polls it and reports over
/// a channel, so the owner only blocks in [`wait`](Self::wait) and
/// [`cancel`](Self::cancel). Dropping the supervisor cancels a running job
/// the same way, including removal of its partial output.
#[derive(Debug)]
pub struct TrimSupervisor<T, F>
where
    T: MediaTool,
    F: Filesystem,
{
    tool: T,
    fs: F,
    settings: SupervisorSettings,
    next_job_id: JobId,
    active: Option<ActiveJob>,
    last_job: Option<TrimJob>,
}

impl<T, F> TrimSupervisor<T, F>
where
    T: MediaTool,
    F: Filesystem,
{
    pub fn new(tool: T, fs: F, settings: SupervisorSettings) -> Self {
        Self {
            tool,
            fs,
            settings,
            next_job_id: 1,
            active: None,
            last_job: None,
        }
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    pub fn phase(&self) -> SupervisorPhase {
        if self.active.is_some() {
            SupervisorPhase::Running
        } else {
            SupervisorPhase::Idle
        }
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// The in-flight job, if any.
    pub fn active_job(&self) -> Option<&TrimJob> {
        self.active.as_ref().map(|active| &active.job)
    }

    /// The most recent resolved job, if any.
    pub fn last_job(&self) -> Option<&TrimJob> {
        self.last_job.as_ref()
    }

    pub fn clear_last_job(&mut self) {
        self.last_job = None;
    }

    pub fn progress(&self) -> Option<JobProgress> {
        self.active.as_ref().map(ActiveJob::progress)
    }

    /// Validates preconditions and dispatches the external tool.
    ///
    /// Precondition failures return before any job is created. A launch
    /// failure is recorded as a failed job and returned.
    pub fn start(&mut self, asset: &VideoAsset, range: &TrimRange) -> Result<JobId> {
        if let Some(active) = &self.active {
            warn!(
                job_id = active.job.job_id,
                "trim rejected: job already in flight"
            );
            return Err(EngineError::JobAlreadyInFlight {
                job_id: active.job.job_id,
            });
        }
        if !asset.is_usable() {
            return Err(EngineError::InvalidAsset {
                path: asset.path.clone(),
                duration_seconds: asset.duration_seconds,
            });
        }
        if !range.is_valid() || range.out_time() > asset.duration_seconds {
            return Err(EngineError::InvalidRange {
                in_time: range.in_time(),
                out_time: range.out_time(),
                duration_seconds: asset.duration_seconds,
            });
        }
        if !self.fs.exists(&asset.path) {
            return Err(EngineError::PreconditionFailed {
                path: asset.path.clone(),
                reason: "input file does not exist",
            });
        }
        if !self.fs.is_readable(&asset.path) {
            return Err(EngineError::PreconditionFailed {
                path: asset.path.clone(),
                reason: "input file is not readable",
            });
        }

        let output_path = resolve_output_path(&asset.path, range.in_time(), range.out_time())?;
        // An identical earlier trim leaves a file at the same path.
        self.clear_stale_output(&output_path)?;
        let job_id = self.allocate_job_id();
        let mut job = TrimJob {
            job_id,
            input_path: asset.path.clone(),
            output_path,
            in_time: range.in_time(),
            duration_seconds: range.trim_duration(),
            state: JobState::Pending,
            error: None,
            result_asset: None,
        };

        let request = ToolRequest {
            input_path: job.input_path.clone(),
            output_path: job.output_path.clone(),
            start_time_seconds: job.in_time,
            duration_seconds: job.duration_seconds,
        };
        let process = match self.tool.spawn_trim(&request) {
            Ok(process) => process,
            Err(error) => {
                let error = EngineError::ExternalTool {
                    reason: error.to_string(),
                };
                warn!(job_id, %error, "trim dispatch failed");
                job.state = JobState::Failed;
                job.error = Some(JobError::from(&error));
                self.last_job = Some(job);
                return Err(error);
            }
        };

        job.state = JobState::Running;
        let (signal_tx, signal_rx) = mpsc::channel();
        let (message_tx, message_rx) = mpsc::channel();
        let settings = self.settings;
        thread::spawn(move || watch_process(process, signal_rx, message_tx, settings));

        info!(
            job_id,
            input = %job.input_path.display(),
            output = %job.output_path.display(),
            in_time = job.in_time,
            duration_seconds = job.duration_seconds,
            "trim job dispatched"
        );

        self.active = Some(ActiveJob {
            job,
            source: asset.clone(),
            signals: signal_tx,
            messages: message_rx,
            progress_seconds: None,
            started_at: Instant::now(),
            cancel_requested: false,
        });
        Ok(job_id)
    }

    /// Collects progress and completion without blocking.
    pub fn poll(&mut self) -> Vec<JobUpdate> {
        let mut updates = Vec::new();
        let Some(active) = self.active.as_mut() else {
            return updates;
        };

        let termination = loop {
            match active.messages.try_recv() {
                Ok(WatchMessage::Progress(seconds)) => {
                    active.progress_seconds = Some(seconds);
                    updates.push(JobUpdate::Progress(active.progress()));
                }
                Ok(WatchMessage::Exited(exit)) => break Some(Termination::Exited(exit)),
                Ok(WatchMessage::Stopped { forced }) => break Some(Termination::Stopped { forced }),
                Ok(WatchMessage::WaitFailed(reason)) => break Some(Termination::WaitFailed(reason)),
                Err(TryRecvError::Empty) => break None,
                Err(TryRecvError::Disconnected) => break Some(Termination::WatcherLost),
            }
        };

        if let Some(termination) = termination {
            if let Some(active) = self.active.take() {
                updates.push(JobUpdate::Finished(self.finish(active, termination)));
            }
        }
        updates
    }

    /// Blocks until the in-flight job resolves or `timeout` elapses.
    ///
    /// A timeout leaves the job running and returns `WaitTimedOut`.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<JobCompletion> {
        // A deadline past the clock's range waits without bound.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        loop {
            let Some(active) = self.active.as_mut() else {
                return Err(EngineError::NoJobRunning);
            };
            let message = match deadline {
                Some(deadline) => active
                    .messages
                    .recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => active
                    .messages
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            let termination = match message {
                Ok(WatchMessage::Progress(seconds)) => {
                    active.progress_seconds = Some(seconds);
                    continue;
                }
                Ok(WatchMessage::Exited(exit)) => Termination::Exited(exit),
                Ok(WatchMessage::Stopped { forced }) => Termination::Stopped { forced },
                Ok(WatchMessage::WaitFailed(reason)) => Termination::WaitFailed(reason),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(EngineError::WaitTimedOut {
                        job_id: active.job.job_id,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => Termination::WatcherLost,
            };

            let Some(active) = self.active.take() else {
                return Err(EngineError::NoJobRunning);
            };
            return Ok(self.finish(active, termination));
        }
    }

    /// Stops the running job and records it as cancelled.
    ///
    /// The tool gets a graceful stop request, then a kill once the grace
    /// period has passed. Returns the failed job record.
    pub fn cancel(&mut self) -> Result<TrimJob> {
        let Some(active) = self.active.as_mut() else {
            return Err(EngineError::NoJobRunning);
        };
        if active.job.state != JobState::Running {
            return Err(EngineError::NoJobRunning);
        }

        active.cancel_requested = true;
        let job_id = active.job.job_id;
        info!(job_id, "cancelling trim job");
        if active.signals.send(WatchSignal::Cancel).is_err() {
            debug!(job_id, "watcher already finished before cancel");
        }

        let bound = self
            .settings
            .cancel_grace
            .saturating_add(KILL_SETTLE)
            .saturating_add(self.settings.poll_interval);
        match self.wait(Some(bound)) {
            Ok(completion) => Ok(completion.job),
            Err(EngineError::WaitTimedOut { .. }) => {
                warn!(job_id, "trim tool did not stop in time; abandoning it");
                let Some(active) = self.active.take() else {
                    return Err(EngineError::NoJobRunning);
                };
                Ok(self.finish(active, Termination::Stopped { forced: true }).job)
            }
            Err(error) => Err(error),
        }
    }

    fn finish(&mut self, active: ActiveJob, termination: Termination) -> JobCompletion {
        let ActiveJob {
            mut job,
            source,
            started_at,
            cancel_requested,
            ..
        } = active;
        let job_id = job.job_id;

        let outcome = if cancel_requested {
            Err(EngineError::Cancelled { job_id })
        } else {
            match termination {
                Termination::Exited(exit) if exit.success() => self.verify_output(&job, &source),
                Termination::Exited(exit) => Err(EngineError::ExternalTool {
                    reason: describe_exit(&exit),
                }),
                Termination::Stopped { .. } => Err(EngineError::Cancelled { job_id }),
                Termination::WaitFailed(reason) => Err(EngineError::ExternalTool { reason }),
                Termination::WatcherLost => Err(EngineError::ExternalTool {
                    reason: "job watcher exited unexpectedly".to_string(),
                }),
            }
        };

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        match &outcome {
            Ok(asset) => {
                info!(
                    job_id,
                    elapsed_ms,
                    output = %asset.path.display(),
                    size_bytes = asset.size_bytes,
                    "trim job succeeded"
                );
                job.state = JobState::Succeeded;
                job.result_asset = Some(asset.clone());
            }
            Err(error) => {
                warn!(job_id, elapsed_ms, %error, "trim job failed");
                job.state = JobState::Failed;
                job.error = Some(JobError::from(error));
                self.discard_partial_output(&job.output_path);
            }
        }

        self.last_job = Some(job.clone());
        JobCompletion { job, outcome }
    }

    fn verify_output(&self, job: &TrimJob, source: &VideoAsset) -> Result<VideoAsset> {
        let path = &job.output_path;
        if !self.fs.exists(path) {
            return Err(EngineError::OutputNotCreated(path.clone()));
        }
        let stat = self.fs.stat(path).map_err(|source| EngineError::Io {
            context: "stat trim output",
            path: path.clone(),
            source,
        })?;
        if stat.size_bytes == 0 {
            return Err(EngineError::OutputEmpty(path.clone()));
        }

        let duration_seconds = self
            .tool
            .probe_duration(path)
            .unwrap_or(job.duration_seconds);
        Ok(VideoAsset {
            path: path.clone(),
            name: display_name(path),
            size_bytes: stat.size_bytes,
            mime_type: mime_type_for_path(path).to_string(),
            duration_seconds,
            width: source.width,
            height: source.height,
        })
    }

    fn clear_stale_output(&self, path: &Path) -> Result<()> {
        if !self.fs.exists(path) {
            return Ok(());
        }
        self.fs
            .remove_file(path)
            .map_err(|source| EngineError::Io {
                context: "remove previous trim output",
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "removed previous trim output");
        Ok(())
    }

    fn discard_partial_output(&self, path: &Path) {
        if !self.fs.exists(path) {
            return;
        }
        match self.fs.remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed partial trim output"),
            Err(error) => warn!(path = %path.display(), %error, "failed to remove partial trim output"),
        }
    }

    fn allocate_job_id(&mut self) -> JobId {
        let id = self.next_job_id;
        self.next_job_id += 1;
        id
    }
}

impl<T, F> Drop for TrimSupervisor<T, F>
where
    T: MediaTool,
    F: Filesystem,
{
    fn drop(&mut self) {
        if self.active.is_none() {
            return;
        }
        match self.cancel() {
            Ok(job) => debug!(job_id = job.job_id, "in-flight trim cancelled on drop"),
            Err(error) => warn!(%error, "failed to cancel trim on drop"),
        }
    }
}

fn watch_process(
    mut process: Box<dyn ToolProcess>,
    signals: Receiver<WatchSignal>,
    messages: Sender<WatchMessage>,
    settings: SupervisorSettings,
) {
    let mut reported = None;
    loop {
        match process.try_wait() {
            Ok(Some(exit)) => {
                let _ = messages.send(WatchMessage::Exited(exit));
                return;
            }
            Ok(None) => {}
            Err(error) => {
                let _ = process.kill();
                let _ = messages.send(WatchMessage::WaitFailed(error.to_string()));
                return;
            }
        }

        if let Some(seconds) = process.progress_seconds() {
            if reported != Some(seconds) {
                reported = Some(seconds);
                let _ = messages.send(WatchMessage::Progress(seconds));
            }
        }

        match signals.recv_timeout(settings.poll_interval) {
            Ok(WatchSignal::Cancel) => {
                let forced = stop_process(process.as_mut(), settings);
                let _ = messages.send(WatchMessage::Stopped { forced });
                return;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("supervisor dropped; stopping trim tool");
                stop_process(process.as_mut(), settings);
                return;
            }
        }
    }
}

/// Returns `true` when the tool had to be killed.
fn stop_process(process: &mut dyn ToolProcess, settings: SupervisorSettings) -> bool {
    if let Err(error) = process.terminate() {
        debug!(%error, "graceful stop request failed");
    }
    if wait_for_exit(process, settings.cancel_grace, settings.poll_interval) {
        return false;
    }

    warn!(
        grace_ms = settings.cancel_grace.as_millis() as u64,
        "trim tool ignored stop request; killing"
    );
    if let Err(error) = process.kill() {
        warn!(%error, "failed to kill trim tool");
    }
    wait_for_exit(process, KILL_SETTLE, settings.poll_interval);
    true
}

fn wait_for_exit(process: &mut dyn ToolProcess, limit: Duration, poll_interval: Duration) -> bool {
    let deadline = Instant::now().checked_add(limit);
    loop {
        match process.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            Err(_) => return false,
        }
        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                poll_interval.min(deadline - now)
            }
            None => poll_interval,
        };
        thread::sleep(pause);
    }
}

fn describe_exit(exit: &ToolExit) -> String {
    let status = match exit.code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    };
    let stderr = exit.stderr.trim();
    if stderr.is_empty() {
        return status;
    }

    let skip = stderr.chars().count().saturating_sub(STDERR_TAIL_CHARS);
    let tail: String = stderr.chars().skip(skip).collect();
    format!("{status}: {tail}")
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::{
        JobState, JobUpdate, SupervisorPhase, SupervisorSettings, TrimSupervisor, describe_exit,
    };
    use crate::asset::VideoAsset;
    use crate::backend::ToolExit;
    use crate::error::{EngineError, EngineErrorKind};
    use crate::output::resolve_output_path;
    use crate::testing::{FakeFilesystem, FakeRun, FakeTool};
    use crate::trim::TrimRange;

    const WAIT: Option<Duration> = Some(Duration::from_secs(5));

    fn settings(cancel_grace_ms: u64) -> SupervisorSettings {
        SupervisorSettings {
            cancel_grace: Duration::from_millis(cancel_grace_ms),
            poll_interval: Duration::from_millis(5),
        }
    }

    fn setup(run: FakeRun) -> (TrimSupervisor<FakeTool, FakeFilesystem>, FakeTool, FakeFilesystem) {
        let fs = FakeFilesystem::default().with_file("/v/a.mp4", 50_000);
        let tool = FakeTool::new(fs.clone(), run);
        let supervisor = TrimSupervisor::new(tool.clone(), fs.clone(), settings(2_000));
        (supervisor, tool, fs)
    }

    fn asset() -> VideoAsset {
        VideoAsset::new("/v/a.mp4", 10.0)
            .with_size(50_000)
            .with_dimensions(Some(1280), Some(720))
    }

    fn range(in_time: f64, out_time: f64) -> TrimRange {
        let mut range = TrimRange::new(10.0, 0.1).expect("valid");
        range.set_out_time(out_time);
        range.set_in_time(in_time);
        range
    }

    #[test]
    fn successful_run_produces_asset_at_resolved_path() {
        let (mut supervisor, tool, _fs) = setup(FakeRun::WriteOutput { size: 1_000 });

        let job_id = supervisor
            .start(&asset(), &range(0.0, 4.0))
            .expect("start should succeed");
        assert_eq!(supervisor.phase(), SupervisorPhase::Running);
        let completion = supervisor.wait(WAIT).expect("job should resolve");

        let produced = completion.outcome.expect("trim should succeed");
        let expected = resolve_output_path("/v/a.mp4", 0.0, 4.0).expect("valid");
        assert_eq!(produced.path, expected);
        assert_eq!(produced.name, "a_trim_0.00-4.00.mp4");
        assert_eq!(produced.size_bytes, 1_000);
        assert_eq!(produced.duration_seconds, 4.0);
        assert_eq!(produced.width, Some(1280));
        assert_eq!(completion.job.job_id, job_id);
        assert_eq!(completion.job.state, JobState::Succeeded);
        assert_eq!(completion.job.result_asset.as_ref(), Some(&produced));
        assert_eq!(supervisor.phase(), SupervisorPhase::Idle);

        let requests = tool.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].start_time_seconds, 0.0);
        assert_eq!(requests[0].duration_seconds, 4.0);
        assert_eq!(requests[0].output_path, expected);
    }

    #[test]
    fn reprobed_duration_replaces_range_duration() {
        let (mut supervisor, tool, _fs) = setup(FakeRun::WriteOutput { size: 1_000 });
        tool.set_output_duration(Some(3.98));

        supervisor
            .start(&asset(), &range(1.0, 5.0))
            .expect("start should succeed");
        let produced = supervisor
            .wait(WAIT)
            .expect("job should resolve")
            .outcome
            .expect("trim should succeed");

        assert_eq!(produced.duration_seconds, 3.98);
    }

    #[test]
    fn zero_exit_without_output_is_not_trusted() {
        let (mut supervisor, _tool, _fs) = setup(FakeRun::ExitWithoutOutput);

        supervisor
            .start(&asset(), &range(0.0, 4.0))
            .expect("start should succeed");
        let completion = supervisor.wait(WAIT).expect("job should resolve");

        assert!(matches!(
            completion.outcome,
            Err(EngineError::OutputNotCreated(_))
        ));
        assert_eq!(completion.job.state, JobState::Failed);
        let recorded = supervisor.last_job().expect("job is recorded");
        assert_eq!(
            recorded.error.as_ref().map(|error| error.kind),
            Some(EngineErrorKind::OutputNotCreated)
        );
        assert!(recorded.result_asset.is_none());
    }

    #[test]
    fn empty_output_fails_and_is_removed() {
        let (mut supervisor, _tool, fs) = setup(FakeRun::WriteOutput { size: 0 });

        supervisor
            .start(&asset(), &range(0.0, 4.0))
            .expect("start should succeed");
        let completion = supervisor.wait(WAIT).expect("job should resolve");

        assert!(matches!(completion.outcome, Err(EngineError::OutputEmpty(_))));
        assert!(!fs.contains(&completion.job.output_path));
        assert_eq!(fs.removed(), vec![completion.job.output_path.clone()]);
    }

    #[test]
    fn non_zero_exit_reports_stderr() {
        let (mut supervisor, _tool, _fs) = setup(FakeRun::Fail {
            code: 1,
            stderr: "Invalid data found when processing input",
        });

        supervisor
            .start(&asset(), &range(0.0, 4.0))
            .expect("start should succeed");
        let completion = supervisor.wait(WAIT).expect("job should resolve");

        let Err(EngineError::ExternalTool { reason }) = completion.outcome else {
            panic!("expected an external tool error");
        };
        assert!(reason.contains("exit code 1"));
        assert!(reason.contains("Invalid data found"));
    }

    #[test]
    fn launch_failure_records_failed_job() {
        let (mut supervisor, _tool, _fs) = setup(FakeRun::SpawnError);

        let result = supervisor.start(&asset(), &range(0.0, 4.0));

        assert!(matches!(result, Err(EngineError::ExternalTool { .. })));
        assert!(!supervisor.is_busy());
        let recorded = supervisor.last_job().expect("job is recorded");
        assert_eq!(recorded.state, JobState::Failed);
        assert!(recorded.error_message().is_some());
    }

    #[test]
    fn second_start_while_running_is_rejected_without_dispatch() {
        let (mut supervisor, tool, _fs) = setup(FakeRun::Hang {
            honor_terminate: true,
            partial_bytes: 0,
        });

        let first = supervisor
            .start(&asset(), &range(0.0, 4.0))
            .expect("first start should succeed");
        for _ in 0..3 {
            let second = supervisor.start(&asset(), &range(1.0, 2.0));
            assert!(matches!(
                second,
                Err(EngineError::JobAlreadyInFlight { job_id }) if job_id == first
            ));
        }
        assert_eq!(tool.requests().len(), 1);

        supervisor.cancel().expect("cancel should succeed");
    }

    #[test]
    fn preconditions_fail_before_dispatch() {
        let (mut supervisor, tool, fs) = setup(FakeRun::WriteOutput { size: 1 });

        let missing = VideoAsset::new("/v/missing.mp4", 10.0);
        assert!(matches!(
            supervisor.start(&missing, &range(0.0, 4.0)),
            Err(EngineError::PreconditionFailed {
                reason: "input file does not exist",
                ..
            })
        ));

        fs.mark_unreadable("/v/a.mp4");
        assert!(matches!(
            supervisor.start(&asset(), &range(0.0, 4.0)),
            Err(EngineError::PreconditionFailed {
                reason: "input file is not readable",
                ..
            })
        ));

        let unusable = VideoAsset::new("/v/a.mp4", 0.0);
        assert!(matches!(
            supervisor.start(&unusable, &range(0.0, 4.0)),
            Err(EngineError::InvalidAsset { .. })
        ));

        let short = VideoAsset::new("/v/a.mp4", 3.0);
        assert!(matches!(
            supervisor.start(&short, &range(0.0, 4.0)),
            Err(EngineError::InvalidRange { .. })
        ));

        assert!(tool.requests().is_empty());
        assert!(supervisor.last_job().is_none());
    }

    #[test]
    fn cancel_stops_tool_gracefully_and_discards_partial_output() {
        let (mut supervisor, tool, fs) = setup(FakeRun::Hang {
            honor_terminate: true,
            partial_bytes: 512,
        });
        supervisor
            .start(&asset(), &range(0.0, 4.0))
            .expect("start should succeed");
        let output = supervisor
            .active_job()
            .map(|job| job.output_path.clone())
            .expect("job is active");
        assert!(fs.contains(&output));

        let started = Instant::now();
        let job = supervisor.cancel().expect("cancel should succeed");

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(
            job.error.as_ref().map(|error| error.kind),
            Some(EngineErrorKind::Cancelled)
        );
        assert!(job.result_asset.is_none());
        assert!(!fs.contains(&output));
        assert_eq!(tool.terminate_count.load(Ordering::SeqCst), 1);
        assert_eq!(tool.kill_count.load(Ordering::SeqCst), 0);
        assert_eq!(supervisor.phase(), SupervisorPhase::Idle);
    }

    #[test]
    fn cancel_kills_tool_that_ignores_stop_request() {
        let fs = FakeFilesystem::default().with_file("/v/a.mp4", 50_000);
        let tool = FakeTool::new(
            fs.clone(),
            FakeRun::Hang {
                honor_terminate: false,
                partial_bytes: 0,
            },
        );
        let mut supervisor = TrimSupervisor::new(tool.clone(), fs, settings(50));
        supervisor
            .start(&asset(), &range(0.0, 4.0))
            .expect("start should succeed");

        let job = supervisor.cancel().expect("cancel should succeed");

        assert_eq!(
            job.error.as_ref().map(|error| error.kind),
            Some(EngineErrorKind::Cancelled)
        );
        assert!(tool.kill_count.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn cancel_without_running_job_is_rejected() {
        let (mut supervisor, _tool, _fs) = setup(FakeRun::WriteOutput { size: 1 });
        assert!(matches!(supervisor.cancel(), Err(EngineError::NoJobRunning)));
        assert!(matches!(supervisor.wait(WAIT), Err(EngineError::NoJobRunning)));
    }

    #[test]
    fn wait_timeout_leaves_job_running() {
        let (mut supervisor, _tool, _fs) = setup(FakeRun::Hang {
            honor_terminate: true,
            partial_bytes: 0,
        });
        let job_id = supervisor
            .start(&asset(), &range(0.0, 4.0))
            .expect("start should succeed");

        let result = supervisor.wait(Some(Duration::from_millis(20)));

        assert!(matches!(result, Err(EngineError::WaitTimedOut { job_id: id }) if id == job_id));
        assert!(supervisor.is_busy());
        supervisor.cancel().expect("cancel should succeed");
    }

    #[test]
    fn poll_reports_progress_then_completion() {
        let (mut supervisor, _tool, _fs) = setup(FakeRun::Hang {
            honor_terminate: true,
            partial_bytes: 0,
        });
        supervisor
            .start(&asset(), &range(0.0, 4.0))
            .expect("start should succeed");

        let deadline = Instant::now() + Duration::from_secs(2);
        let progress = loop {
            let progress = supervisor.poll().into_iter().find_map(|update| match update {
                JobUpdate::Progress(progress) => Some(progress),
                JobUpdate::Finished(_) => None,
            });
            if let Some(progress) = progress {
                break progress;
            }
            assert!(Instant::now() < deadline, "no progress reported");
            thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(progress.done_seconds, 0.5);
        assert_eq!(progress.fraction(), 0.125);

        supervisor.cancel().expect("cancel should succeed");
        assert!(supervisor.poll().is_empty());
    }

    #[test]
    fn dropping_supervisor_stops_running_tool() {
        let (mut supervisor, tool, _fs) = setup(FakeRun::Hang {
            honor_terminate: true,
            partial_bytes: 0,
        });
        supervisor
            .start(&asset(), &range(0.0, 4.0))
            .expect("start should succeed");

        drop(supervisor);

        let deadline = Instant::now() + Duration::from_secs(2);
        while tool.terminate_count.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() < deadline, "tool was not stopped");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn dropping_supervisor_removes_partial_output() {
        let (mut supervisor, _tool, fs) = setup(FakeRun::Hang {
            honor_terminate: true,
            partial_bytes: 256,
        });
        supervisor
            .start(&asset(), &range(0.0, 4.0))
            .expect("start should succeed");
        let output = resolve_output_path("/v/a.mp4", 0.0, 4.0).expect("valid");
        assert!(fs.contains(&output));

        drop(supervisor);

        assert!(!fs.contains(&output));
        assert_eq!(fs.removed(), vec![output]);
    }

    #[test]
    fn output_left_by_identical_earlier_trim_is_not_trusted() {
        let (mut supervisor, _tool, fs) = setup(FakeRun::ExitWithoutOutput);
        let previous = resolve_output_path("/v/a.mp4", 0.0, 4.0).expect("valid");
        fs.insert(previous.clone(), 1_000);

        supervisor
            .start(&asset(), &range(0.0, 4.0))
            .expect("start should succeed");
        let completion = supervisor.wait(WAIT).expect("job should resolve");

        assert!(matches!(
            completion.outcome,
            Err(EngineError::OutputNotCreated(ref path)) if *path == previous
        ));
        assert_eq!(completion.job.state, JobState::Failed);
        assert!(!fs.contains(&previous));
    }

    #[test]
    fn wait_with_unrepresentable_deadline_blocks_until_done() {
        let (mut supervisor, _tool, _fs) = setup(FakeRun::WriteOutput { size: 1_000 });
        supervisor
            .start(&asset(), &range(0.0, 4.0))
            .expect("start should succeed");

        let completion = supervisor
            .wait(Some(Duration::MAX))
            .expect("job should resolve");

        assert!(completion.outcome.is_ok());
    }

    #[test]
    fn cancel_gives_up_on_tool_that_never_stops() {
        let fs = FakeFilesystem::default().with_file("/v/a.mp4", 50_000);
        let tool = FakeTool::new(
            fs.clone(),
            FakeRun::Wedged {
                stall: Duration::from_secs(5),
            },
        );
        let mut supervisor = TrimSupervisor::new(tool, fs, settings(20));
        supervisor
            .start(&asset(), &range(0.0, 4.0))
            .expect("start should succeed");

        let started = Instant::now();
        let job = supervisor.cancel().expect("cancel should resolve");

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(
            job.error.as_ref().map(|error| error.kind),
            Some(EngineErrorKind::Cancelled)
        );
        assert_eq!(supervisor.phase(), SupervisorPhase::Idle);
        assert_eq!(supervisor.last_job(), Some(&job));
    }

    #[test]
    fn job_ids_increase_across_runs() {
        let (mut supervisor, _tool, _fs) = setup(FakeRun::WriteOutput { size: 10 });
        let first = supervisor.start(&asset(), &range(0.0, 4.0)).expect("start");
        supervisor.wait(WAIT).expect("resolve");
        let second = supervisor.start(&asset(), &range(0.0, 4.0)).expect("start");
        supervisor.wait(WAIT).expect("resolve");
        assert!(second > first);
    }

    #[test]
    fn describe_exit_keeps_stderr_tail() {
        let exit = ToolExit {
            code: Some(234),
            stderr: format!("{}END", "x".repeat(2_000)),
        };
        let message = describe_exit(&exit);
        assert!(message.starts_with("exit code 234: "));
        assert!(message.ends_with("END"));
        assert!(message.len() < 600);

        let killed = ToolExit {
            code: None,
            stderr: "  \n".to_string(),
        };
        assert_eq!(describe_exit(&killed), "terminated by signal");
    }

    #[test]
    fn output_path_is_never_the_input() {
        let (mut supervisor, tool, _fs) = setup(FakeRun::WriteOutput { size: 10 });
        supervisor.start(&asset(), &range(0.0, 10.0)).expect("start");
        supervisor.wait(WAIT).expect("resolve");
        assert_ne!(tool.requests()[0].output_path, PathBuf::from("/v/a.mp4"));
        assert!(Path::new(&tool.requests()[0].output_path).starts_with("/v"));
    }
}
