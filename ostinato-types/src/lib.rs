//! # ostinato-types
//!
//! Shared type definitions for the Ostinato synchronization layer.
//! This crate contains the data vocabulary used across ostinato-core and
//! ostinato-engine: ids, typed values, property schemas, change events,
//! control values, commands, and engine wire messages.

pub mod change;
pub mod command;
pub mod control_value;
pub mod error;
pub mod graph;
pub mod message;
pub mod schema;
pub mod value;

pub use change::Change;
pub use command::{Command, CommandPhase};
pub use control_value::{ControlValue, ControlValueMap, SetOutcome};
pub use error::{CommandError, CorruptionError, EngineError, ListenerError, ModelError, ValueError};
pub use graph::{ChannelType, PortDirection, PortType};
pub use message::{
    BackendState, EngineFeedback, EngineMessage, EngineMessageKind, NodeMessage, NodeMessagePayload,
};
pub use schema::{ClassRegistry, ObjectClass, PropertyDesc, PropertyKind};
pub use value::{Value, ValueKind};

/// Unique identifier for an object in the project graph.
///
/// Stable for the object's lifetime; allocated monotonically by the arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Render the 16-hex-digit key used to address this object on the
    /// engine message channel. Must stay bit-exact with the wire format.
    pub fn key(self) -> String {
        format!("{:016x}", self.0)
    }

    /// Parse a 16-hex-digit message-channel key back into an id.
    pub fn parse_key(key: &str) -> Option<Self> {
        if key.len() != 16 {
            return None;
        }
        u64::from_str_radix(key, 16).ok().map(Self)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_key_is_16_hex_digits() {
        assert_eq!(ObjectId::new(1).key(), "0000000000000001");
        assert_eq!(ObjectId::new(0xdead_beef).key(), "00000000deadbeef");
        assert_eq!(ObjectId::new(u64::MAX).key(), "ffffffffffffffff");
    }

    #[test]
    fn object_id_key_round_trips() {
        let id = ObjectId::new(42);
        assert_eq!(ObjectId::parse_key(&id.key()), Some(id));
        assert_eq!(ObjectId::parse_key("2a"), None); // wrong width
        assert_eq!(ObjectId::parse_key("000000000000002g"), None);
    }
}
