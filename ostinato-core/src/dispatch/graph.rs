//! Handlers for the node/port/connection command family. Each handler
//! validates against the current graph, then mutates through the
//! transaction's `Mutator`; a returned error rolls the whole command back.

use ostinato_types::error::CommandError;
use ostinato_types::{ObjectId, PortDirection, PortType, Value};

use crate::model::ObjectArena;
use crate::project::Mutator;

use super::side_effects::EngineSideEffect;

fn validation(reason: impl Into<String>, command: &'static str) -> CommandError {
    CommandError::validation(command, reason)
}

pub(super) fn require_node(
    arena: &ObjectArena,
    node: ObjectId,
    command: &'static str,
) -> Result<(), CommandError> {
    match arena.is_a(node, "node") {
        Ok(true) => Ok(()),
        Ok(false) => Err(validation(format!("object {node} is not a node"), command)),
        Err(err) => Err(validation(err.to_string(), command)),
    }
}

/// Find a port on `node` by name.
pub(super) fn find_port(arena: &ObjectArena, node: ObjectId, name: &str) -> Option<ObjectId> {
    let ports = arena.children(node, "ports").ok()?;
    ports.iter().copied().find(|port| {
        arena
            .get_scalar(*port, "name")
            .ok()
            .flatten()
            .and_then(Value::as_str)
            == Some(name)
    })
}

fn port_direction(arena: &ObjectArena, port: ObjectId) -> Option<PortDirection> {
    arena
        .get_scalar(port, "direction")
        .ok()
        .flatten()
        .and_then(Value::as_str)
        .and_then(PortDirection::parse)
}

pub(super) fn add_node(
    m: &mut Mutator<'_>,
    class: &str,
    name: &str,
    root: ObjectId,
    effects: &mut Vec<EngineSideEffect>,
) -> Result<ObjectId, CommandError> {
    const CMD: &str = "add_node";
    let registry = m.arena().registry();
    if !registry.is_subclass(class, "node") || class == "node" {
        return Err(validation(format!("'{class}' is not a node class"), CMD));
    }
    let wrap = |e: ostinato_types::ModelError| CommandError::Failed {
        command: CMD,
        reason: e.to_string(),
    };
    let node = m.create(class).map_err(wrap)?;
    m.set_scalar(node, "name", Some(Value::Str(name.to_owned())))
        .map_err(wrap)?;
    if class == "step_sequencer" {
        // New sequencers come with one value channel, fully populated.
        add_sequencer_channel(m, node, "value", CMD)?;
    }
    m.child_push(root, "nodes", node).map_err(wrap)?;
    effects.push(EngineSideEffect::NodeAdded {
        node,
        class: class.to_owned(),
    });
    Ok(node)
}

/// Create one channel on a sequencer with as many steps as the sequencer
/// currently declares. Shared by add_node and update_step_sequencer.
pub(super) fn add_sequencer_channel(
    m: &mut Mutator<'_>,
    sequencer: ObjectId,
    channel_type: &str,
    command: &'static str,
) -> Result<ObjectId, CommandError> {
    let wrap = |e: ostinato_types::ModelError| CommandError::Failed {
        command,
        reason: e.to_string(),
    };
    let num_steps = m
        .arena()
        .get_scalar(sequencer, "num_steps")
        .map_err(wrap)?
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let channel = m.create("step_sequencer_channel").map_err(wrap)?;
    m.set_scalar(
        channel,
        "channel_type",
        Some(Value::Str(channel_type.to_owned())),
    )
    .map_err(wrap)?;
    for _ in 0..num_steps {
        let step = m.create("step_sequencer_step").map_err(wrap)?;
        m.child_push(channel, "steps", step).map_err(wrap)?;
    }
    m.child_push(sequencer, "channels", channel).map_err(wrap)?;
    Ok(channel)
}

pub(super) fn delete_node(
    m: &mut Mutator<'_>,
    node: ObjectId,
    root: ObjectId,
    effects: &mut Vec<EngineSideEffect>,
) -> Result<(), CommandError> {
    const CMD: &str = "delete_node";
    require_node(m.arena(), node, CMD)?;
    let wrap = |e: ostinato_types::ModelError| CommandError::Failed {
        command: CMD,
        reason: e.to_string(),
    };
    // Connections referencing the node go first; they hold weak refs that
    // must never dangle.
    for connection in connections_touching(m.arena(), root, node) {
        m.remove_subtree(connection).map_err(wrap)?;
        effects.push(EngineSideEffect::ConnectionRemoved { connection });
    }
    m.remove_subtree(node).map_err(wrap)?;
    effects.push(EngineSideEffect::NodeRemoved { node });
    Ok(())
}

/// Connections whose source or dest node, or any port of those, references
/// the given object.
fn connections_touching(arena: &ObjectArena, root: ObjectId, target: ObjectId) -> Vec<ObjectId> {
    let Ok(connections) = arena.children(root, "connections") else {
        return Vec::new();
    };
    connections
        .iter()
        .copied()
        .filter(|conn| {
            ["source_node", "source_port", "dest_node", "dest_port"]
                .iter()
                .any(|field| {
                    arena
                        .get_scalar(*conn, field)
                        .ok()
                        .flatten()
                        .and_then(Value::as_ref_id)
                        == Some(target)
                })
        })
        .collect()
}

pub(super) fn set_node_name(
    m: &mut Mutator<'_>,
    node: ObjectId,
    name: &str,
) -> Result<(), CommandError> {
    const CMD: &str = "set_node_name";
    require_node(m.arena(), node, CMD)?;
    if name.is_empty() {
        return Err(validation("node name must not be empty", CMD));
    }
    m.set_scalar(node, "name", Some(Value::Str(name.to_owned())))
        .map_err(|e| CommandError::Failed {
            command: CMD,
            reason: e.to_string(),
        })
}

pub(super) fn add_port(
    m: &mut Mutator<'_>,
    node: ObjectId,
    name: &str,
    direction: PortDirection,
    port_type: PortType,
) -> Result<ObjectId, CommandError> {
    const CMD: &str = "add_port";
    require_node(m.arena(), node, CMD)?;
    if find_port(m.arena(), node, name).is_some() {
        return Err(validation(
            format!("node {node} already has a port named '{name}'"),
            CMD,
        ));
    }
    let wrap = |e: ostinato_types::ModelError| CommandError::Failed {
        command: CMD,
        reason: e.to_string(),
    };
    let port = m.create("port").map_err(wrap)?;
    m.set_scalar(port, "name", Some(Value::Str(name.to_owned())))
        .map_err(wrap)?;
    m.set_scalar(
        port,
        "direction",
        Some(Value::Str(direction.as_str().to_owned())),
    )
    .map_err(wrap)?;
    m.set_scalar(
        port,
        "port_type",
        Some(Value::Str(port_type.as_str().to_owned())),
    )
    .map_err(wrap)?;
    m.child_push(node, "ports", port).map_err(wrap)?;
    Ok(port)
}

pub(super) fn delete_port(
    m: &mut Mutator<'_>,
    node: ObjectId,
    port: ObjectId,
    root: ObjectId,
    effects: &mut Vec<EngineSideEffect>,
) -> Result<(), CommandError> {
    const CMD: &str = "delete_port";
    require_node(m.arena(), node, CMD)?;
    let owned = m
        .arena()
        .get(port)
        .ok()
        .and_then(|o| o.parent())
        == Some(node);
    if !owned {
        return Err(validation(
            format!("port {port} does not belong to node {node}"),
            CMD,
        ));
    }
    let wrap = |e: ostinato_types::ModelError| CommandError::Failed {
        command: CMD,
        reason: e.to_string(),
    };
    for connection in connections_touching(m.arena(), root, port) {
        m.remove_subtree(connection).map_err(wrap)?;
        effects.push(EngineSideEffect::ConnectionRemoved { connection });
    }
    m.remove_subtree(port).map_err(wrap)?;
    Ok(())
}

pub(super) fn connect_ports(
    m: &mut Mutator<'_>,
    source_node: ObjectId,
    source_port: &str,
    dest_node: ObjectId,
    dest_port: &str,
    root: ObjectId,
    effects: &mut Vec<EngineSideEffect>,
) -> Result<ObjectId, CommandError> {
    const CMD: &str = "connect_ports";
    require_node(m.arena(), source_node, CMD)?;
    require_node(m.arena(), dest_node, CMD)?;

    let src = find_port(m.arena(), source_node, source_port).ok_or_else(|| {
        validation(
            format!("node {source_node} has no port '{source_port}'"),
            CMD,
        )
    })?;
    let dst = find_port(m.arena(), dest_node, dest_port)
        .ok_or_else(|| validation(format!("node {dest_node} has no port '{dest_port}'"), CMD))?;

    if port_direction(m.arena(), src) != Some(PortDirection::Output) {
        return Err(validation(
            format!("'{source_port}' is not an output port"),
            CMD,
        ));
    }
    if port_direction(m.arena(), dst) != Some(PortDirection::Input) {
        return Err(validation(
            format!("'{dest_port}' is not an input port"),
            CMD,
        ));
    }

    let duplicate = m
        .arena()
        .children(root, "connections")
        .ok()
        .map(|connections| {
            connections.iter().any(|conn| {
                let endpoint = |field| {
                    m.arena()
                        .get_scalar(*conn, field)
                        .ok()
                        .flatten()
                        .and_then(Value::as_ref_id)
                };
                endpoint("source_port") == Some(src) && endpoint("dest_port") == Some(dst)
            })
        })
        .unwrap_or(false);
    if duplicate {
        return Err(validation("ports are already connected", CMD));
    }

    let wrap = |e: ostinato_types::ModelError| CommandError::Failed {
        command: CMD,
        reason: e.to_string(),
    };
    let connection = m.create("connection").map_err(wrap)?;
    m.set_scalar(connection, "source_node", Some(Value::Ref(source_node)))
        .map_err(wrap)?;
    m.set_scalar(connection, "source_port", Some(Value::Ref(src)))
        .map_err(wrap)?;
    m.set_scalar(connection, "dest_node", Some(Value::Ref(dest_node)))
        .map_err(wrap)?;
    m.set_scalar(connection, "dest_port", Some(Value::Ref(dst)))
        .map_err(wrap)?;
    m.child_push(root, "connections", connection).map_err(wrap)?;
    effects.push(EngineSideEffect::ConnectionAdded { connection });
    Ok(connection)
}

pub(super) fn disconnect_ports(
    m: &mut Mutator<'_>,
    connection: ObjectId,
    root: ObjectId,
    effects: &mut Vec<EngineSideEffect>,
) -> Result<(), CommandError> {
    const CMD: &str = "disconnect_ports";
    let is_connection = m
        .arena()
        .class_of(connection)
        .map(|c| c.name == "connection")
        .unwrap_or(false);
    let owned = m
        .arena()
        .get(connection)
        .ok()
        .and_then(|o| o.parent())
        == Some(root);
    if !is_connection || !owned {
        return Err(validation(
            format!("{connection} is not a connection of this project"),
            CMD,
        ));
    }
    m.remove_subtree(connection)
        .map_err(|e| CommandError::Failed {
            command: CMD,
            reason: e.to_string(),
        })?;
    effects.push(EngineSideEffect::ConnectionRemoved { connection });
    Ok(())
}
