//! The backend seam.
//!
//! The real-time audio runtime is an external collaborator; this trait is
//! the whole of its surface as seen from the control side. Implementations
//! run on the engine thread and must never be called from anywhere else.

use std::sync::mpsc::Sender;

use thiserror::Error;

use ostinato_types::message::{EngineFeedback, EngineMessage, NodeMessage};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("backend failed to start: {0}")]
    StartFailed(String),
    #[error("backend failed to stop: {0}")]
    StopFailed(String),
    #[error("backend rejected message: {0}")]
    MessageRejected(String),
}

/// Fire-and-forget telemetry path handed to a backend on start.
///
/// The queue is unbounded, so emitting never blocks the backend's audio or
/// I/O thread; a disconnected control side just drops the message.
#[derive(Clone)]
pub struct TelemetrySender {
    tx: Sender<EngineFeedback>,
}

impl TelemetrySender {
    pub(crate) fn new(tx: Sender<EngineFeedback>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, msg: NodeMessage) {
        if self.tx.send(EngineFeedback::Node(msg)).is_err() {
            log::debug!(target: "engine", "telemetry dropped: control side gone");
        }
    }
}

pub trait Backend: Send + 'static {
    /// Bring the backend up. `telemetry` stays valid until `stop` returns.
    fn start(&mut self, telemetry: TelemetrySender) -> Result<(), BackendError>;

    /// Tear the backend down. Called at most once per successful or failed
    /// start; must be safe to call after a crash.
    fn stop(&mut self) -> Result<(), BackendError>;

    /// Deliver one outbound message. Messages for the same node arrive in
    /// submission order.
    fn handle_message(&mut self, msg: &EngineMessage) -> Result<(), BackendError>;
}

/// Backend that accepts everything and produces nothing. Used when running
/// without audio, and as the base for test backends.
#[derive(Debug, Default)]
pub struct NullBackend {
    started: bool,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for NullBackend {
    fn start(&mut self, _telemetry: TelemetrySender) -> Result<(), BackendError> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.started = false;
        Ok(())
    }

    fn handle_message(&mut self, _msg: &EngineMessage) -> Result<(), BackendError> {
        Ok(())
    }
}
