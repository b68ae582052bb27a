use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use crate::asset::VideoAsset;
use crate::backend::{Filesystem, MediaTool};
use crate::error::{EngineError, EngineErrorKind, Result};
use crate::session::ClipSession;
use crate::supervisor::{JobId, JobProgress, JobUpdate, SupervisorPhase, TrimJob};
use crate::trim::{TrimEdge, TrimRange};

/// Commands accepted by a [`ClipSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Import {
        path: PathBuf,
    },
    /// Binds an already described clip, e.g. a fresh recording.
    BindAsset {
        asset: VideoAsset,
    },
    /// Moves one trim handle.
    UpdateTrim {
        edge: TrimEdge,
        value: f64,
    },
    ApplyTrim,
    CancelJob,
    DiscardClip,
}

/// Events emitted by a [`ClipSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SessionChanged(SessionSnapshot),
    TrimChanged(TrimRange),
    JobStarted { job_id: JobId, output_path: PathBuf },
    JobProgress(JobProgress),
    /// Terminal job record, either succeeded or failed.
    JobFinished(TrimJob),
    Error(EngineErrorEvent),
}

/// User-facing error payload emitted as an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineErrorEvent {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineErrorEvent {
    pub fn from_error(error: &EngineError) -> Self {
        Self {
            kind: EngineErrorKind::from(error),
            message: error.to_string(),
        }
    }
}

/// Immutable session state consumed by UIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub asset: Option<VideoAsset>,
    pub trim: Option<TrimRange>,
    pub phase: SupervisorPhase,
    /// In-flight job, else the last resolved one.
    pub job: Option<TrimJob>,
    pub progress: Option<JobProgress>,
}

impl<T, F> ClipSession<T, F>
where
    T: MediaTool,
    F: Filesystem,
{
    /// Applies one command and returns the events it produced.
    ///
    /// # Example
    /// ```no_run
    /// use trim_engine::{ClipSession, Command, EngineConfig, TrimEdge};
    ///
    /// let mut session = ClipSession::with_ffmpeg(&EngineConfig::default());
    /// session.handle_command(Command::Import {
    ///     path: "demo.mp4".into(),
    /// })?;
    /// let events = session.handle_command(Command::UpdateTrim {
    ///     edge: TrimEdge::Out,
    ///     value: 4.0,
    /// })?;
    /// assert_eq!(events.len(), 1);
    /// # Ok::<(), trim_engine::EngineError>(())
    /// ```
    pub fn handle_command(&mut self, command: Command) -> Result<Vec<Event>> {
        debug!(?command, "handling session command");
        match command {
            Command::Import { path } => {
                self.import_path(path)?;
                Ok(vec![Event::SessionChanged(self.snapshot())])
            }
            Command::BindAsset { asset } => {
                self.bind_asset(asset)?;
                Ok(vec![Event::SessionChanged(self.snapshot())])
            }
            Command::UpdateTrim { edge, value } => {
                let range = self.update_trim(edge, value)?;
                Ok(vec![Event::TrimChanged(range)])
            }
            Command::ApplyTrim => {
                let job_id = self.apply_trim()?;
                let output_path = self
                    .current_job()
                    .map(|job| job.output_path.clone())
                    .unwrap_or_default();
                Ok(vec![
                    Event::JobStarted {
                        job_id,
                        output_path,
                    },
                    Event::SessionChanged(self.snapshot()),
                ])
            }
            Command::CancelJob => {
                let job = self.cancel_job()?;
                Ok(vec![
                    Event::JobFinished(job),
                    Event::SessionChanged(self.snapshot()),
                ])
            }
            Command::DiscardClip => {
                self.discard_clip()?;
                Ok(vec![Event::SessionChanged(self.snapshot())])
            }
        }
    }

    /// Drains job progress and completion as events without blocking.
    pub fn poll_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        for update in self.poll_job() {
            match update {
                JobUpdate::Progress(progress) => events.push(Event::JobProgress(progress)),
                JobUpdate::Finished(completion) => {
                    if let Err(error) = &completion.outcome {
                        events.push(Event::Error(EngineErrorEvent::from_error(error)));
                    }
                    events.push(Event::JobFinished(completion.job));
                    events.push(Event::SessionChanged(self.snapshot()));
                }
            }
        }
        events
    }
}
