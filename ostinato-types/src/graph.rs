//! Typed vocabulary for ports and sequencer channels.
//!
//! The model stores these as strings (the record format is plain strings);
//! the enums here are the parse/validate layer used at the edges.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

impl PortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortDirection::Input => "input",
            PortDirection::Output => "output",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "input" => Some(PortDirection::Input),
            "output" => Some(PortDirection::Output),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    Audio,
    KrateControl,
    ArateControl,
    Events,
}

impl PortType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortType::Audio => "audio",
            PortType::KrateControl => "krate_control",
            PortType::ArateControl => "arate_control",
            PortType::Events => "events",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "audio" => Some(PortType::Audio),
            "krate_control" => Some(PortType::KrateControl),
            "arate_control" => Some(PortType::ArateControl),
            "events" => Some(PortType::Events),
            _ => None,
        }
    }
}

/// What a step sequencer channel emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Value,
    Gate,
    Trigger,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Value => "value",
            ChannelType::Gate => "gate",
            ChannelType::Trigger => "trigger",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "value" => Some(ChannelType::Value),
            "gate" => Some(ChannelType::Gate),
            "trigger" => Some(ChannelType::Trigger),
            _ => None,
        }
    }
}
