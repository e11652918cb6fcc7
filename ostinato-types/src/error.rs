//! Error taxonomy shared across the workspace.
//!
//! Validation and type errors are raised synchronously at the point of
//! misuse and abort the enclosing transaction without partial effect.
//! Corruption errors are fatal to the load that produced them.

use thiserror::Error;

use crate::value::ValueKind;
use crate::ObjectId;

/// Property type/nullability violations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("property '{property}' expects {expected:?}, got {got:?}")]
    WrongType {
        property: String,
        expected: ValueKind,
        got: ValueKind,
    },
    #[error("property '{property}' is not nullable")]
    NotNullable { property: String },
}

/// Structural misuse of the object graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error("no object with id {0}")]
    NoSuchObject(ObjectId),
    #[error("class '{class}' has no property '{property}'")]
    NoSuchProperty { class: &'static str, property: String },
    #[error("property '{property}' is not a {expected} property")]
    WrongPropertyKind {
        property: String,
        expected: &'static str,
    },
    #[error("index {index} out of bounds for '{property}' (len {len})")]
    IndexOutOfBounds {
        property: String,
        index: usize,
        len: usize,
    },
    #[error("object {child} is already owned by {owner}")]
    AlreadyOwned { child: ObjectId, owner: ObjectId },
    #[error("object {child} of class '{class}' is not a subclass of '{expected}'")]
    ClassMismatch {
        child: ObjectId,
        class: &'static str,
        expected: &'static str,
    },
    #[error("class '{0}' is already registered")]
    DuplicateClass(&'static str),
    #[error("unknown class '{0}'")]
    UnknownClass(String),
}

/// Malformed persisted state or broken reference resolution. Fatal to the
/// load operation; no partial project state is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CorruptionError {
    #[error("record names unknown class '{0}'")]
    UnknownClass(String),
    #[error("reference to id {0} does not resolve to a live object")]
    DanglingRef(ObjectId),
    #[error("record for class '{class}' is missing required field '{field}'")]
    MissingField { class: String, field: &'static str },
    #[error("malformed record: {0}")]
    BadRecord(String),
    #[error("project schema version {found} is newer than supported ({supported})")]
    VersionTooNew { found: i64, supported: i64 },
}

/// Command rejection or rolled-back application, always naming the command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("command '{command}' rejected: {reason}")]
    Validation { command: &'static str, reason: String },
    #[error("command '{command}' failed and was rolled back: {reason}")]
    Failed { command: &'static str, reason: String },
    #[error("a mutation scope is already active (no nested transactions)")]
    NestedTransaction,
}

impl CommandError {
    pub fn validation(command: &'static str, reason: impl Into<String>) -> Self {
        CommandError::Validation { command, reason: reason.into() }
    }
}

/// Listener registry misuse.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ListenerError {
    #[error("listener {0} is not registered (double remove?)")]
    NotRegistered(u64),
}

/// Engine boundary failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("operation illegal in state {0:?}")]
    InvalidState(crate::message::BackendState),
    #[error("engine thread disconnected")]
    Disconnected,
}
