//! Applying engine telemetry back onto the project.

use ostinato_types::control_value::SetOutcome;
use ostinato_types::message::{NodeMessage, NodeMessagePayload};
use ostinato_types::ObjectId;

use crate::project::Project;

/// Fold one node message into the project. Only control value echoes carry
/// state the project tracks; meters, logs and scope frames are a UI
/// concern and pass through untouched.
pub fn process_node_message(project: &mut Project, msg: &NodeMessage) {
    let NodeMessagePayload::ControlValueEcho {
        name,
        value,
        generation,
    } = &msg.payload
    else {
        return;
    };
    let Some(node) = ObjectId::parse_key(&msg.node_key) else {
        log::warn!(target: "dispatch", "malformed node key '{}'", msg.node_key);
        return;
    };
    match project
        .control_values_mut()
        .set(node, name, *value, *generation)
    {
        SetOutcome::Applied { .. } => {
            log::trace!(
                target: "dispatch",
                "control {}:{name} <- {value} (gen {generation})",
                msg.node_key
            );
        }
        SetOutcome::Stale => {
            // Out-of-order echo; the local edit already won.
            log::trace!(
                target: "dispatch",
                "stale control echo {}:{name} (gen {generation}) discarded",
                msg.node_key
            );
        }
        SetOutcome::Unchanged => {}
    }
}
