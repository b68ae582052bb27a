use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::api::{Command, EngineErrorEvent, Event};
use crate::backend::{Filesystem, MediaTool};
use crate::config::EngineConfig;
use crate::session::ClipSession;

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Sender used by the UI thread to dispatch commands to the session thread.
pub type SessionCommandSender = mpsc::SyncSender<Command>;

/// Receiver used by the UI thread to read events emitted by the session thread.
pub type SessionEventReceiver = mpsc::Receiver<Event>;

/// Spawns the production bridge around an FFmpeg-backed session.
pub fn spawn_ffmpeg_bridge(config: &EngineConfig) -> (SessionCommandSender, SessionEventReceiver) {
    spawn_session_bridge(ClipSession::with_ffmpeg(config), config.poll_interval())
}

/// Moves `session` onto its own thread.
///
/// The thread applies commands in order and, between commands, polls the
/// running job every `poll_interval` so progress and completion reach the
/// event receiver without the UI asking. It exits when either channel end
/// is dropped, which also stops a running trim.
pub fn spawn_session_bridge<T, F>(
    mut session: ClipSession<T, F>,
    poll_interval: Duration,
) -> (SessionCommandSender, SessionEventReceiver)
where
    T: MediaTool + Send + 'static,
    F: Filesystem + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::sync_channel::<Command>(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::sync_channel::<Event>(EVENT_CHANNEL_CAPACITY);

    thread::spawn(move || {
        loop {
            let mut events = match command_rx.recv_timeout(poll_interval) {
                Ok(command) => match session.handle_command(command) {
                    Ok(events) => events,
                    Err(error) => vec![Event::Error(EngineErrorEvent::from_error(&error))],
                },
                Err(RecvTimeoutError::Timeout) => Vec::new(),
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("command sender dropped; session bridge exiting");
                    return;
                }
            };
            events.extend(session.poll_events());

            for event in events {
                if event_tx.send(event).is_err() {
                    debug!("event receiver dropped; session bridge exiting");
                    return;
                }
            }
        }
    });

    (command_tx, event_rx)
}
