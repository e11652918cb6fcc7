//! The built-in class schemas.
//!
//! Field tables are static; the registry built here is the single source of
//! truth for what the record format and the arena accept. Port direction,
//! port type and channel type are stored as plain strings and validated at
//! the command layer through the enums in ostinato-types.

use ostinato_types::schema::{ClassRegistry, ObjectClass, PropertyDesc};
use ostinato_types::{ModelError, Value, ValueKind};

pub static PROJECT: ObjectClass = ObjectClass {
    name: "project",
    parent: None,
    properties: &[
        PropertyDesc::scalar("name", ValueKind::Str, Some(Value::Str(String::new()))),
        PropertyDesc::child_list("nodes", "node"),
        PropertyDesc::child_list("connections", "connection"),
    ],
};

/// Base class of everything that sits in the processing graph.
pub static NODE: ObjectClass = ObjectClass {
    name: "node",
    parent: None,
    properties: &[
        PropertyDesc::scalar("name", ValueKind::Str, Some(Value::Str(String::new()))),
        PropertyDesc::list("graph_pos", ValueKind::Float),
        PropertyDesc::child_list("ports", "port"),
    ],
};

pub static MIXER_NODE: ObjectClass = ObjectClass {
    name: "mixer_node",
    parent: Some("node"),
    properties: &[],
};

pub static OSCILLOSCOPE_NODE: ObjectClass = ObjectClass {
    name: "oscilloscope_node",
    parent: Some("node"),
    properties: &[],
};

pub static CUSTOM_CSOUND_NODE: ObjectClass = ObjectClass {
    name: "custom_csound_node",
    parent: Some("node"),
    properties: &[
        PropertyDesc::scalar("orchestra", ValueKind::Str, Some(Value::Str(String::new()))),
        PropertyDesc::scalar("score", ValueKind::Str, Some(Value::Str(String::new()))),
    ],
};

pub static STEP_SEQUENCER: ObjectClass = ObjectClass {
    name: "step_sequencer",
    parent: Some("node"),
    properties: &[
        PropertyDesc::scalar("num_steps", ValueKind::Int, Some(Value::Int(8))),
        PropertyDesc::scalar("time_synched", ValueKind::Bool, Some(Value::Bool(false))),
        PropertyDesc::child_list("channels", "step_sequencer_channel"),
    ],
};

pub static STEP_SEQUENCER_CHANNEL: ObjectClass = ObjectClass {
    name: "step_sequencer_channel",
    parent: None,
    properties: &[
        PropertyDesc::scalar(
            "channel_type",
            ValueKind::Str,
            Some(Value::Str(String::new())),
        ),
        PropertyDesc::scalar("log_scale", ValueKind::Bool, Some(Value::Bool(false))),
        PropertyDesc::scalar("lower_value", ValueKind::Float, Some(Value::Float(-1.0))),
        PropertyDesc::scalar("upper_value", ValueKind::Float, Some(Value::Float(1.0))),
        PropertyDesc::child_list("steps", "step_sequencer_step"),
    ],
};

pub static STEP_SEQUENCER_STEP: ObjectClass = ObjectClass {
    name: "step_sequencer_step",
    parent: None,
    properties: &[
        PropertyDesc::scalar("value", ValueKind::Float, Some(Value::Float(0.0))),
        PropertyDesc::scalar("enabled", ValueKind::Bool, Some(Value::Bool(false))),
    ],
};

pub static PORT: ObjectClass = ObjectClass {
    name: "port",
    parent: None,
    properties: &[
        PropertyDesc::scalar("name", ValueKind::Str, Some(Value::Str(String::new()))),
        PropertyDesc::scalar("direction", ValueKind::Str, Some(Value::Str(String::new()))),
        PropertyDesc::scalar("port_type", ValueKind::Str, Some(Value::Str(String::new()))),
    ],
};

/// Endpoints are weak references; deleting either node takes the
/// connection with it at the command layer.
pub static CONNECTION: ObjectClass = ObjectClass {
    name: "connection",
    parent: None,
    properties: &[
        PropertyDesc::scalar("source_node", ValueKind::Ref, None),
        PropertyDesc::scalar("source_port", ValueKind::Ref, None),
        PropertyDesc::scalar("dest_node", ValueKind::Ref, None),
        PropertyDesc::scalar("dest_port", ValueKind::Ref, None),
    ],
};

static ALL: &[&ObjectClass] = &[
    &PROJECT,
    &NODE,
    &MIXER_NODE,
    &OSCILLOSCOPE_NODE,
    &CUSTOM_CSOUND_NODE,
    &STEP_SEQUENCER,
    &STEP_SEQUENCER_CHANNEL,
    &STEP_SEQUENCER_STEP,
    &PORT,
    &CONNECTION,
];

pub fn builtin_registry() -> ClassRegistry {
    let mut registry = ClassRegistry::new();
    for class in ALL {
        // Static tables have unique names; a clash here is a programming
        // error caught by the tests below.
        if let Err(ModelError::DuplicateClass(name)) = registry.register(*class) {
            panic!("class '{name}' registered twice");
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_contains_every_class() {
        let registry = builtin_registry();
        for class in ALL {
            assert!(registry.get(class.name).is_some(), "{} missing", class.name);
        }
    }

    #[test]
    fn node_subclasses_inherit_base_properties() {
        let registry = builtin_registry();
        for name in [
            "mixer_node",
            "oscilloscope_node",
            "custom_csound_node",
            "step_sequencer",
        ] {
            assert!(registry.is_subclass(name, "node"), "{name} not a node");
            let class = registry.get(name).unwrap();
            assert!(registry.property(class, "name").is_some());
            assert!(registry.property(class, "ports").is_some());
        }
    }

    #[test]
    fn step_sequencer_defaults_match_the_record_format() {
        let registry = builtin_registry();
        let class = registry.get("step_sequencer").unwrap();
        let desc = registry.property(class, "num_steps").unwrap();
        match &desc.kind {
            ostinato_types::PropertyKind::Scalar { default, .. } => {
                assert_eq!(default.as_ref(), Some(&Value::Int(8)));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }
}
