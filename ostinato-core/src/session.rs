//! One editing session: a project wired to a running engine.
//!
//! The session is the single place where commands, engine side effects and
//! engine feedback meet. Callers dispatch commands through it and pump
//! `poll_engine` from their event loop.

use ostinato_types::error::{CommandError, EngineError};
use ostinato_types::message::{BackendState, EngineFeedback, EngineMessage, EngineMessageKind};
use ostinato_types::{Command, ObjectId};

use ostinato_engine::{Backend, EngineHandle};

use crate::config::Config;
use crate::dispatch::{dispatch_command, feedback, flush_effects, EngineSideEffect};
use crate::project::Project;

pub struct Session {
    project: Project,
    engine: EngineHandle,
    effects: Vec<EngineSideEffect>,
    startup_timeout: std::time::Duration,
    shutdown_timeout: std::time::Duration,
}

impl Session {
    pub fn new(config: &Config, backend: impl Backend) -> Self {
        Self::with_project(config, Project::new(config.undo_depth()), backend)
    }

    pub fn with_project(config: &Config, project: Project, backend: impl Backend) -> Self {
        Self {
            project,
            engine: EngineHandle::spawn(backend),
            effects: Vec::new(),
            startup_timeout: config.engine_startup_timeout(),
            shutdown_timeout: config.engine_shutdown_timeout(),
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn project_mut(&mut self) -> &mut Project {
        &mut self.project
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut EngineHandle {
        &mut self.engine
    }

    pub fn start_engine(&mut self) -> Result<(), EngineError> {
        self.engine.start()?;
        self.engine.wait_until_running(self.startup_timeout)
    }

    pub fn stop_engine(&mut self) -> Result<(), EngineError> {
        self.engine.stop()?;
        self.engine.wait_until_stopped(self.shutdown_timeout)
    }

    /// Dispatch one command and push its side effects to the engine. The
    /// command's outcome is independent of the engine state; effects that
    /// cannot be delivered are dropped with a warning.
    pub fn execute(&mut self, command: Command) -> Result<(), CommandError> {
        dispatch_command(&mut self.project, command, &mut self.effects)?;
        if let Err(err) = flush_effects(&self.engine, &mut self.effects) {
            log::warn!(target: "dispatch", "engine effects dropped: {err}");
            self.effects.clear();
        }
        Ok(())
    }

    /// Audition a note on an instrument node. Preview notes go straight to
    /// the engine; they touch neither the graph nor the undo history.
    pub fn note_on(&self, node: ObjectId, pitch: u8, velocity: u8) -> Result<(), EngineError> {
        self.engine.send_message(EngineMessage {
            node_key: node.key(),
            kind: EngineMessageKind::NoteOn { pitch, velocity },
        })
    }

    pub fn note_off(&self, node: ObjectId, pitch: u8) -> Result<(), EngineError> {
        self.engine.send_message(EngineMessage {
            node_key: node.key(),
            kind: EngineMessageKind::NoteOff { pitch },
        })
    }

    /// Fold pending engine feedback into the project. Returns backend state
    /// transitions observed since the last poll, oldest first.
    pub fn poll_engine(&mut self) -> Vec<BackendState> {
        let mut states = Vec::new();
        for item in self.engine.drain_feedback() {
            match item {
                EngineFeedback::Node(msg) => {
                    feedback::process_node_message(&mut self.project, &msg);
                }
                EngineFeedback::StateChanged(state) => states.push(state),
            }
        }
        states
    }
}
