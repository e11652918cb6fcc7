//! Engine thread and the control-side handle to it.
//!
//! All lifecycle transitions and backend calls happen on one dedicated
//! thread, so states form a single total order no matter how many control
//! callers there are. The control side talks to the thread over a command
//! channel and reads telemetry back over an unbounded feedback queue.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};

use ostinato_types::error::{EngineError, ListenerError};
use ostinato_types::message::{BackendState, EngineFeedback, EngineMessage, NodeMessage};

use crate::backend::{Backend, TelemetrySender};
use crate::manager::{FatalHandler, LifecycleState, Signal};

enum EngineCmd {
    Start(Arc<Signal>),
    Stop(Arc<Signal>),
    Crashed(String),
    Message(EngineMessage),
    Shutdown,
}

/// Subscription handle returned by [`EngineHandle::listen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Listener(u64);

type NodeCallback = Box<dyn FnMut(&NodeMessage) -> Result<(), String> + Send>;

/// Per-node-key fanout for messages coming back from the backend.
///
/// Listeners on the same key are invoked in registration order. A listener
/// returning an error is logged and skipped; the rest of the chain still
/// runs.
struct NodeMessageDispatcher {
    listeners: HashMap<String, Vec<(Listener, NodeCallback)>>,
    next_id: u64,
}

impl NodeMessageDispatcher {
    fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            next_id: 0,
        }
    }

    fn add(&mut self, node_key: &str, callback: NodeCallback) -> Listener {
        let id = Listener(self.next_id);
        self.next_id += 1;
        self.listeners
            .entry(node_key.to_owned())
            .or_default()
            .push((id, callback));
        id
    }

    fn remove(&mut self, listener: Listener) -> Result<(), ListenerError> {
        for (key, chain) in self.listeners.iter_mut() {
            if let Some(pos) = chain.iter().position(|(id, _)| *id == listener) {
                chain.remove(pos);
                if chain.is_empty() {
                    let key = key.clone();
                    self.listeners.remove(&key);
                }
                return Ok(());
            }
        }
        Err(ListenerError::NotRegistered(listener.0))
    }

    fn dispatch(&mut self, msg: &NodeMessage) {
        let Some(chain) = self.listeners.get_mut(&msg.node_key) else {
            return;
        };
        for (id, callback) in chain.iter_mut() {
            if let Err(err) = callback(msg) {
                log::warn!(
                    target: "engine",
                    "listener {} for node {} failed: {err}",
                    id.0,
                    msg.node_key
                );
            }
        }
    }
}

/// Control-side handle owning the engine thread.
pub struct EngineHandle {
    cmd_tx: Sender<EngineCmd>,
    feedback_rx: mpsc::Receiver<EngineFeedback>,
    lifecycle: Arc<LifecycleState>,
    dispatcher: NodeMessageDispatcher,
    start_signal: Option<Arc<Signal>>,
    stop_signal: Option<Arc<Signal>>,
    join: Option<thread::JoinHandle<()>>,
}

impl EngineHandle {
    pub fn spawn<B: Backend>(backend: B) -> Self {
        let (cmd_tx, cmd_rx) = unbounded::<EngineCmd>();
        let (feedback_tx, feedback_rx) = mpsc::channel::<EngineFeedback>();
        let lifecycle = LifecycleState::new();

        let thread_lifecycle = Arc::clone(&lifecycle);
        let join = thread::Builder::new()
            .name("ostinato-engine".into())
            .spawn(move || {
                engine_thread(backend, cmd_rx, feedback_tx, thread_lifecycle);
            })
            .unwrap_or_else(|err| panic!("failed to spawn engine thread: {err}"));

        Self {
            cmd_tx,
            feedback_rx,
            lifecycle,
            dispatcher: NodeMessageDispatcher::new(),
            start_signal: None,
            stop_signal: None,
            join: Some(join),
        }
    }

    pub fn state(&self) -> BackendState {
        self.lifecycle.get()
    }

    /// Ask the backend to come up. Only legal while stopped; completion is
    /// observed through [`wait_until_running`](Self::wait_until_running).
    pub fn start(&mut self) -> Result<(), EngineError> {
        let state = self.lifecycle.get();
        if state != BackendState::Stopped {
            return Err(EngineError::InvalidState(state));
        }
        let signal = Signal::new();
        self.start_signal = Some(Arc::clone(&signal));
        self.cmd_tx
            .send(EngineCmd::Start(signal))
            .map_err(|_| EngineError::Disconnected)
    }

    /// Ask the backend to shut down. Legal from any state; stopping an
    /// already stopped backend completes immediately.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        let signal = Signal::new();
        self.stop_signal = Some(Arc::clone(&signal));
        self.cmd_tx
            .send(EngineCmd::Stop(signal))
            .map_err(|_| EngineError::Disconnected)
    }

    /// Report that the backend died on its own. The engine thread records
    /// the crash and force-stops the backend; a failure of that forced stop
    /// goes to the fatal handler, since nobody is waiting on it.
    pub fn crashed(&self, reason: impl Into<String>) -> Result<(), EngineError> {
        self.cmd_tx
            .send(EngineCmd::Crashed(reason.into()))
            .map_err(|_| EngineError::Disconnected)
    }

    pub fn wait_until_running(&self, timeout: Duration) -> Result<(), EngineError> {
        if self.lifecycle.get() == BackendState::Running {
            return Ok(());
        }
        match &self.start_signal {
            Some(signal) => signal.wait(timeout),
            None => Err(EngineError::InvalidState(self.lifecycle.get())),
        }
    }

    pub fn wait_until_stopped(&self, timeout: Duration) -> Result<(), EngineError> {
        match &self.stop_signal {
            Some(signal) => signal.wait(timeout),
            None => {
                if self.lifecycle.get() == BackendState::Stopped {
                    Ok(())
                } else {
                    Err(EngineError::InvalidState(self.lifecycle.get()))
                }
            }
        }
    }

    pub fn set_fatal_handler(&self, handler: FatalHandler) {
        self.lifecycle.set_fatal_handler(handler);
    }

    /// Queue a message for the backend. Delivered only while running;
    /// otherwise dropped on the engine thread with a warning.
    pub fn send_message(&self, msg: EngineMessage) -> Result<(), EngineError> {
        self.cmd_tx
            .send(EngineCmd::Message(msg))
            .map_err(|_| EngineError::Disconnected)
    }

    /// Subscribe to messages from one node, addressed by its 16-hex key.
    pub fn listen<F>(&mut self, node_key: &str, callback: F) -> Listener
    where
        F: FnMut(&NodeMessage) -> Result<(), String> + Send + 'static,
    {
        self.dispatcher.add(node_key, Box::new(callback))
    }

    pub fn unlisten(&mut self, listener: Listener) -> Result<(), ListenerError> {
        self.dispatcher.remove(listener)
    }

    /// Pull everything the backend produced since the last drain, in
    /// arrival order. Node messages are fanned out to listeners along the
    /// way; the full feedback list is returned for the caller to fold into
    /// its own state.
    pub fn drain_feedback(&mut self) -> Vec<EngineFeedback> {
        let mut out = Vec::new();
        while let Ok(feedback) = self.feedback_rx.try_recv() {
            if let EngineFeedback::Node(msg) = &feedback {
                self.dispatcher.dispatch(msg);
            }
            out.push(feedback);
        }
        out
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(EngineCmd::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn engine_thread<B: Backend>(
    mut backend: B,
    cmd_rx: crossbeam_channel::Receiver<EngineCmd>,
    feedback_tx: mpsc::Sender<EngineFeedback>,
    lifecycle: Arc<LifecycleState>,
) {
    let telemetry = TelemetrySender::new(feedback_tx.clone());
    let announce = |state: BackendState| {
        lifecycle.set(state);
        let _ = feedback_tx.send(EngineFeedback::StateChanged(state));
    };

    for cmd in cmd_rx.iter() {
        match cmd {
            EngineCmd::Start(signal) => {
                if lifecycle.get() != BackendState::Stopped {
                    signal.set(Err(EngineError::InvalidState(lifecycle.get())));
                    continue;
                }
                announce(BackendState::Starting);
                match backend.start(telemetry.clone()) {
                    Ok(()) => {
                        announce(BackendState::Running);
                        signal.set(Ok(()));
                    }
                    Err(err) => {
                        log::error!(target: "engine", "backend start failed: {err}");
                        announce(BackendState::Crashed);
                        if let Err(stop_err) = backend.stop() {
                            lifecycle.report_fatal(&EngineError::Backend(stop_err.to_string()));
                        }
                        signal.set(Err(EngineError::Backend(err.to_string())));
                    }
                }
            }
            EngineCmd::Stop(signal) => {
                if lifecycle.get() == BackendState::Stopped {
                    signal.set(Ok(()));
                    continue;
                }
                announce(BackendState::Stopping);
                let result = backend.stop();
                announce(BackendState::Stopped);
                match result {
                    Ok(()) => signal.set(Ok(())),
                    Err(err) => {
                        log::error!(target: "engine", "backend stop failed: {err}");
                        signal.set(Err(EngineError::Backend(err.to_string())));
                    }
                }
            }
            EngineCmd::Crashed(reason) => {
                // A crash report is only meaningful for a running backend;
                // one arriving during or after shutdown is already handled.
                if lifecycle.get() != BackendState::Running {
                    log::debug!(
                        target: "engine",
                        "ignoring crash report in state {:?}: {reason}",
                        lifecycle.get()
                    );
                    continue;
                }
                log::error!(target: "engine", "backend crashed: {reason}");
                announce(BackendState::Crashed);
                // The crash runs the same stop sequence as an explicit
                // stop; the machine always comes back to rest in Stopped.
                announce(BackendState::Stopping);
                if let Err(err) = backend.stop() {
                    lifecycle.report_fatal(&EngineError::Backend(err.to_string()));
                }
                announce(BackendState::Stopped);
            }
            EngineCmd::Message(msg) => {
                if lifecycle.get() != BackendState::Running {
                    log::warn!(
                        target: "engine",
                        "dropping message for node {}: backend not running",
                        msg.node_key
                    );
                    continue;
                }
                if let Err(err) = backend.handle_message(&msg) {
                    log::warn!(
                        target: "engine",
                        "backend rejected message for node {}: {err}",
                        msg.node_key
                    );
                }
            }
            EngineCmd::Shutdown => break,
        }
    }

    if lifecycle.get() == BackendState::Running {
        if let Err(err) = backend.stop() {
            log::error!(target: "engine", "backend stop on shutdown failed: {err}");
        }
        lifecycle.set(BackendState::Stopped);
    }
}
