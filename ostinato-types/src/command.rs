//! Command types for the dispatch system.
//!
//! A command is a named, serializable intent: "set this control", "add a
//! channel". Optional fields mean "no change" and are never transmitted
//! when unset. Commands apply transactionally; a failure rolls the whole
//! command back.

use serde::{Deserialize, Serialize};

use crate::graph::{ChannelType, PortDirection, PortType};
use crate::ObjectId;

/// Per-command lifecycle phase, mostly useful in logs and test assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPhase {
    Received,
    Validated,
    Applying,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SetControlValue {
        node_id: ObjectId,
        name: String,
        value: f64,
    },
    ConnectPorts {
        source_node: ObjectId,
        source_port: String,
        dest_node: ObjectId,
        dest_port: String,
    },
    DisconnectPorts {
        connection_id: ObjectId,
    },
    AddNode {
        class: String,
        name: String,
    },
    DeleteNode {
        node_id: ObjectId,
    },
    AddPort {
        node_id: ObjectId,
        name: String,
        direction: PortDirection,
        port_type: PortType,
    },
    DeletePort {
        node_id: ObjectId,
        port_id: ObjectId,
    },
    SetNodeName {
        node_id: ObjectId,
        name: String,
    },
    UpdateStepSequencer {
        node_id: ObjectId,
        #[serde(skip_serializing_if = "Option::is_none")]
        set_num_steps: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        set_time_synched: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        add_channel: Option<ChannelType>,
    },
    UpdateStepSequencerChannel {
        node_id: ObjectId,
        channel_id: ObjectId,
        #[serde(skip_serializing_if = "Option::is_none")]
        set_type: Option<ChannelType>,
        #[serde(skip_serializing_if = "Option::is_none")]
        set_log_scale: Option<bool>,
    },
    DeleteStepSequencerChannel {
        node_id: ObjectId,
        channel_id: ObjectId,
    },
    UpdateStepSequencerStep {
        node_id: ObjectId,
        step_id: ObjectId,
        #[serde(skip_serializing_if = "Option::is_none")]
        set_value: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        set_enabled: Option<bool>,
    },
    Undo,
    Redo,
}

impl Command {
    /// The wire name, used in `CommandError` messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetControlValue { .. } => "set_control_value",
            Command::ConnectPorts { .. } => "connect_ports",
            Command::DisconnectPorts { .. } => "disconnect_ports",
            Command::AddNode { .. } => "add_node",
            Command::DeleteNode { .. } => "delete_node",
            Command::AddPort { .. } => "add_port",
            Command::DeletePort { .. } => "delete_port",
            Command::SetNodeName { .. } => "set_node_name",
            Command::UpdateStepSequencer { .. } => "update_step_sequencer",
            Command::UpdateStepSequencerChannel { .. } => "update_step_sequencer_channel",
            Command::DeleteStepSequencerChannel { .. } => "delete_step_sequencer_channel",
            Command::UpdateStepSequencerStep { .. } => "update_step_sequencer_step",
            Command::Undo => "undo",
            Command::Redo => "redo",
        }
    }

    /// Whether applying this command should push an undo snapshot.
    pub fn is_undoable(&self) -> bool {
        !matches!(self, Command::Undo | Command::Redo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_optional_fields_are_not_transmitted() {
        let cmd = Command::UpdateStepSequencer {
            node_id: ObjectId::new(7),
            set_num_steps: Some(16),
            set_time_synched: None,
            add_channel: None,
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["command"], "update_step_sequencer");
        assert_eq!(json["set_num_steps"], 16);
        assert!(json.get("set_time_synched").is_none());
        assert!(json.get("add_channel").is_none());
    }

    #[test]
    fn command_round_trips_through_json() {
        let cmd = Command::ConnectPorts {
            source_node: ObjectId::new(1),
            source_port: "out".into(),
            dest_node: ObjectId::new(2),
            dest_port: "in".into(),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn unknown_command_tag_fails_to_parse() {
        let err = serde_json::from_str::<Command>(r#"{"command":"frobnicate"}"#).unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn command_names_are_stable() {
        assert_eq!(
            Command::DeleteNode { node_id: ObjectId::new(1) }.name(),
            "delete_node"
        );
        assert_eq!(Command::Undo.name(), "undo");
    }
}
