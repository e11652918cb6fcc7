//! # ostinato-core
//!
//! The control side of ostinato: the schema-typed object graph with change
//! notification, the transactional command dispatcher with undo history,
//! per-node control values with generation tie-breaking, SQLite
//! persistence, and the session gluing a project to a running engine.

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod model;
pub mod persistence;
pub mod project;
pub mod session;
pub mod undo;

pub use bus::{BusListener, CallbackRegistry, ChangeBus, ListenerId};
pub use config::Config;
pub use dispatch::{dispatch_command, flush_effects, EngineSideEffect};
pub use model::{classes::builtin_registry, Object, ObjectArena};
pub use persistence::{load_project, save_project, StorageError};
pub use project::{ControlListener, ControlValueEvent, ControlValueStore, Mutator, Project};
pub use session::Session;
pub use undo::UndoHistory;
