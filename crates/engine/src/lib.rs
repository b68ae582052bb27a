//! UI-agnostic timeline and trim engine for a single-clip video editor.

pub mod api;
pub mod asset;
pub mod backend;
pub mod bridge;
pub mod config;
pub mod coords;
pub mod error;
pub mod output;
pub mod session;
pub mod supervisor;
pub mod trim;

#[cfg(test)]
mod testing;

pub use api::{Command, EngineErrorEvent, Event, SessionSnapshot};
pub use asset::VideoAsset;
pub use backend::{
    FfmpegTool, FileStat, Filesystem, LocalFilesystem, MediaTool, ProbedMedia, ToolExit,
    ToolProcess, ToolRequest,
};
pub use bridge::{
    SessionCommandSender, SessionEventReceiver, spawn_ffmpeg_bridge, spawn_session_bridge,
};
pub use config::EngineConfig;
pub use error::{EngineError, EngineErrorKind, Result};
pub use output::resolve_output_path;
pub use session::ClipSession;
pub use supervisor::{
    JobCompletion, JobError, JobId, JobProgress, JobState, JobUpdate, SupervisorPhase,
    SupervisorSettings, TrimJob, TrimSupervisor,
};
pub use trim::{DEFAULT_MIN_GAP_SECONDS, TrimEdge, TrimRange};
