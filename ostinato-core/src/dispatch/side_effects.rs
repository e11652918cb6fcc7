//! Side effects a command wants performed against the engine once its
//! graph mutation has committed. Collected during dispatch, flushed by the
//! caller, so a rolled-back command never talks to the engine.

use ostinato_types::error::EngineError;
use ostinato_types::message::{EngineMessage, EngineMessageKind};
use ostinato_types::ObjectId;

use ostinato_engine::EngineHandle;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineSideEffect {
    SendControlValue {
        node: ObjectId,
        name: String,
        value: f64,
        generation: u64,
    },
    NodeAdded {
        node: ObjectId,
        class: String,
    },
    NodeRemoved {
        node: ObjectId,
    },
    ConnectionAdded {
        connection: ObjectId,
    },
    ConnectionRemoved {
        connection: ObjectId,
    },
}

/// Push collected effects to the engine. Graph topology effects are only
/// logged here; the backend rebuilds its processing graph from the
/// persisted project, not incrementally.
pub fn flush_effects(
    handle: &EngineHandle,
    effects: &mut Vec<EngineSideEffect>,
) -> Result<(), EngineError> {
    for effect in effects.drain(..) {
        match effect {
            EngineSideEffect::SendControlValue {
                node,
                name,
                value,
                generation,
            } => {
                handle.send_message(EngineMessage {
                    node_key: node.key(),
                    kind: EngineMessageKind::ControlValue {
                        name,
                        value,
                        generation,
                    },
                })?;
            }
            EngineSideEffect::NodeAdded { node, class } => {
                log::debug!(target: "dispatch", "node {} added ({class})", node.key());
            }
            EngineSideEffect::NodeRemoved { node } => {
                log::debug!(target: "dispatch", "node {} removed", node.key());
            }
            EngineSideEffect::ConnectionAdded { connection } => {
                log::debug!(target: "dispatch", "connection {connection} added");
            }
            EngineSideEffect::ConnectionRemoved { connection } => {
                log::debug!(target: "dispatch", "connection {connection} removed");
            }
        }
    }
    Ok(())
}
