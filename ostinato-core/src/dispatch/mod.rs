//! Command dispatch.
//!
//! Every edit enters as a `Command` and runs as one transaction: validate
//! against the live graph, mutate through the transaction's `Mutator`, and
//! either commit (changes reach listeners, undo snapshot recorded, engine
//! side effects collected) or roll back without trace.

pub mod feedback;
mod graph;
mod sequencer;
pub mod side_effects;

pub use side_effects::{flush_effects, EngineSideEffect};

use ostinato_types::error::CommandError;
use ostinato_types::{Command, CommandPhase};

use crate::project::Project;

pub fn dispatch_command(
    project: &mut Project,
    command: Command,
    effects: &mut Vec<EngineSideEffect>,
) -> Result<(), CommandError> {
    let name = command.name();
    log::debug!(target: "dispatch", "{name}: {:?}", CommandPhase::Received);

    match command {
        Command::Undo => {
            if project.undo() {
                log::debug!(target: "dispatch", "{name}: {:?}", CommandPhase::Committed);
            } else {
                log::debug!(target: "dispatch", "{name}: nothing to undo");
            }
            return Ok(());
        }
        Command::Redo => {
            if project.redo() {
                log::debug!(target: "dispatch", "{name}: {:?}", CommandPhase::Committed);
            } else {
                log::debug!(target: "dispatch", "{name}: nothing to redo");
            }
            return Ok(());
        }
        // Control edits bypass the graph transaction and the undo history;
        // the generation counter is their conflict resolution.
        Command::SetControlValue {
            node_id,
            name: control,
            value,
        } => {
            graph::require_node(project.arena(), node_id, "set_control_value")?;
            log::debug!(target: "dispatch", "{name}: {:?}", CommandPhase::Validated);
            let generation = project.control_values_mut().bump(node_id, &control, value);
            effects.push(EngineSideEffect::SendControlValue {
                node: node_id,
                name: control,
                value,
                generation,
            });
            log::debug!(target: "dispatch", "{name}: {:?}", CommandPhase::Committed);
            return Ok(());
        }
        _ => {}
    }

    let undoable = command.is_undoable();
    let before = project.arena().clone();
    let effects_mark = effects.len();
    let root = project.root();

    log::debug!(target: "dispatch", "{name}: {:?}", CommandPhase::Applying);
    let result = project.apply_mutations(name, |m| match command {
        Command::AddNode { class, name } => {
            graph::add_node(m, &class, &name, root, effects).map(|_| ())
        }
        Command::DeleteNode { node_id } => graph::delete_node(m, node_id, root, effects),
        Command::SetNodeName { node_id, name } => graph::set_node_name(m, node_id, &name),
        Command::AddPort {
            node_id,
            name,
            direction,
            port_type,
        } => graph::add_port(m, node_id, &name, direction, port_type).map(|_| ()),
        Command::DeletePort { node_id, port_id } => {
            graph::delete_port(m, node_id, port_id, root, effects)
        }
        Command::ConnectPorts {
            source_node,
            source_port,
            dest_node,
            dest_port,
        } => graph::connect_ports(
            m,
            source_node,
            &source_port,
            dest_node,
            &dest_port,
            root,
            effects,
        )
        .map(|_| ()),
        Command::DisconnectPorts { connection_id } => {
            graph::disconnect_ports(m, connection_id, root, effects)
        }
        Command::UpdateStepSequencer {
            node_id,
            set_num_steps,
            set_time_synched,
            add_channel,
        } => sequencer::update_sequencer(m, node_id, set_num_steps, set_time_synched, add_channel),
        Command::UpdateStepSequencerChannel {
            node_id,
            channel_id,
            set_type,
            set_log_scale,
        } => sequencer::update_channel(m, node_id, channel_id, set_type, set_log_scale),
        Command::DeleteStepSequencerChannel {
            node_id,
            channel_id,
        } => sequencer::delete_channel(m, node_id, channel_id),
        Command::UpdateStepSequencerStep {
            node_id,
            step_id,
            set_value,
            set_enabled,
        } => sequencer::update_step(m, node_id, step_id, set_value, set_enabled),
        Command::SetControlValue { .. } | Command::Undo | Command::Redo => {
            unreachable!("handled above")
        }
    });

    match result {
        Ok(()) => {
            if undoable {
                project.record_undo(name, before);
            }
            // A deleted node keeps its generation counters (an undo may
            // revive it, and late echoes of pre-delete edits must still
            // lose the tie-break); only its listeners go.
            for effect in effects.iter() {
                if let EngineSideEffect::NodeRemoved { node } = effect {
                    project.control_values_mut().drop_listeners(*node);
                }
            }
            log::debug!(target: "dispatch", "{name}: {:?}", CommandPhase::Committed);
            Ok(())
        }
        Err(err) => {
            // Effects collected by the failed command must not reach the
            // engine.
            effects.truncate(effects_mark);
            log::warn!(
                target: "dispatch",
                "{name}: {:?}: {err}",
                CommandPhase::RolledBack
            );
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostinato_types::{ChannelType, ObjectId, PortDirection, PortType, Value};

    fn run(project: &mut Project, command: Command) -> Result<Vec<EngineSideEffect>, CommandError> {
        let mut effects = Vec::new();
        dispatch_command(project, command, &mut effects)?;
        Ok(effects)
    }

    fn add_node(project: &mut Project, class: &str, name: &str) -> ObjectId {
        run(
            project,
            Command::AddNode {
                class: class.into(),
                name: name.into(),
            },
        )
        .unwrap();
        *project
            .arena()
            .children(project.root(), "nodes")
            .unwrap()
            .last()
            .unwrap()
    }

    fn add_port(project: &mut Project, node: ObjectId, name: &str, direction: PortDirection) {
        run(
            project,
            Command::AddPort {
                node_id: node,
                name: name.into(),
                direction,
                port_type: PortType::Audio,
            },
        )
        .unwrap();
    }

    fn connect(
        project: &mut Project,
        source: ObjectId,
        source_port: &str,
        dest: ObjectId,
        dest_port: &str,
    ) -> Result<Vec<EngineSideEffect>, CommandError> {
        run(
            project,
            Command::ConnectPorts {
                source_node: source,
                source_port: source_port.into(),
                dest_node: dest,
                dest_port: dest_port.into(),
            },
        )
    }

    #[test]
    fn add_node_attaches_to_project_and_reports_effect() {
        let mut project = Project::new(8);
        let effects = run(
            &mut project,
            Command::AddNode {
                class: "mixer_node".into(),
                name: "main out".into(),
            },
        )
        .unwrap();

        let nodes = project.arena().children(project.root(), "nodes").unwrap();
        assert_eq!(nodes.len(), 1);
        let node = nodes[0];
        assert_eq!(
            project.arena().get_scalar(node, "name").unwrap(),
            Some(&Value::Str("main out".into()))
        );
        assert_eq!(
            effects,
            vec![EngineSideEffect::NodeAdded {
                node,
                class: "mixer_node".into()
            }]
        );
    }

    #[test]
    fn unknown_node_class_is_rejected() {
        let mut project = Project::new(8);
        let err = run(
            &mut project,
            Command::AddNode {
                class: "flanger".into(),
                name: "x".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::Validation { .. }));
        assert!(project
            .arena()
            .children(project.root(), "nodes")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn new_step_sequencer_has_one_populated_channel() {
        let mut project = Project::new(8);
        let seq = add_node(&mut project, "step_sequencer", "seq");
        let channels = project.arena().children(seq, "channels").unwrap();
        assert_eq!(channels.len(), 1);
        let steps = project.arena().children(channels[0], "steps").unwrap();
        assert_eq!(steps.len(), 8);
    }

    #[test]
    fn connect_requires_output_to_input() {
        let mut project = Project::new(8);
        let src = add_node(&mut project, "mixer_node", "src");
        let dst = add_node(&mut project, "oscilloscope_node", "dst");
        add_port(&mut project, src, "out", PortDirection::Output);
        add_port(&mut project, src, "in", PortDirection::Input);
        add_port(&mut project, dst, "in", PortDirection::Input);

        let err = connect(&mut project, src, "in", dst, "in").unwrap_err();
        assert!(matches!(err, CommandError::Validation { .. }));

        let effects = connect(&mut project, src, "out", dst, "in").unwrap();
        assert!(matches!(
            effects.as_slice(),
            [EngineSideEffect::ConnectionAdded { .. }]
        ));
        assert_eq!(
            project
                .arena()
                .children(project.root(), "connections")
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn duplicate_connection_is_rejected() {
        let mut project = Project::new(8);
        let src = add_node(&mut project, "mixer_node", "src");
        let dst = add_node(&mut project, "mixer_node", "dst");
        add_port(&mut project, src, "out", PortDirection::Output);
        add_port(&mut project, dst, "in", PortDirection::Input);

        connect(&mut project, src, "out", dst, "in").unwrap();
        let err = connect(&mut project, src, "out", dst, "in").unwrap_err();
        assert!(matches!(err, CommandError::Validation { .. }));
    }

    #[test]
    fn disconnect_removes_the_connection() {
        let mut project = Project::new(8);
        let src = add_node(&mut project, "mixer_node", "src");
        let dst = add_node(&mut project, "mixer_node", "dst");
        add_port(&mut project, src, "out", PortDirection::Output);
        add_port(&mut project, dst, "in", PortDirection::Input);
        connect(&mut project, src, "out", dst, "in").unwrap();
        let connection = project
            .arena()
            .children(project.root(), "connections")
            .unwrap()[0];

        run(
            &mut project,
            Command::DisconnectPorts {
                connection_id: connection,
            },
        )
        .unwrap();
        assert!(project
            .arena()
            .children(project.root(), "connections")
            .unwrap()
            .is_empty());
        assert!(!project.arena().contains(connection));
    }

    #[test]
    fn delete_node_takes_connections_and_control_values() {
        let mut project = Project::new(8);
        let src = add_node(&mut project, "mixer_node", "src");
        let dst = add_node(&mut project, "mixer_node", "dst");
        add_port(&mut project, src, "out", PortDirection::Output);
        add_port(&mut project, dst, "in", PortDirection::Input);
        connect(&mut project, src, "out", dst, "in").unwrap();
        run(
            &mut project,
            Command::SetControlValue {
                node_id: src,
                name: "gain".into(),
                value: 0.5,
            },
        )
        .unwrap();

        run(&mut project, Command::DeleteNode { node_id: src }).unwrap();

        assert!(!project.arena().contains(src));
        assert!(project
            .arena()
            .children(project.root(), "connections")
            .unwrap()
            .is_empty());
        // Generations outlive the node so an undo revives it with its
        // tie-break history intact.
        assert_eq!(project.control_values().generation(src, "gain"), 1);
        assert!(project.arena().contains(dst));
    }

    #[test]
    fn stale_echo_still_loses_after_delete_and_undo() {
        let mut project = Project::new(8);
        let node = add_node(&mut project, "mixer_node", "n");
        run(
            &mut project,
            Command::SetControlValue {
                node_id: node,
                name: "gain".into(),
                value: 0.3,
            },
        )
        .unwrap();
        run(
            &mut project,
            Command::SetControlValue {
                node_id: node,
                name: "gain".into(),
                value: 0.7,
            },
        )
        .unwrap();

        run(&mut project, Command::DeleteNode { node_id: node }).unwrap();
        run(&mut project, Command::Undo).unwrap();
        assert!(project.arena().contains(node));

        // An echo of the first edit arrives after the round trip; its
        // generation is behind and it must be discarded.
        feedback::process_node_message(
            &mut project,
            &ostinato_types::message::NodeMessage {
                node_key: node.key(),
                payload: ostinato_types::message::NodeMessagePayload::ControlValueEcho {
                    name: "gain".into(),
                    value: 0.3,
                    generation: 1,
                },
            },
        );
        assert_eq!(project.control_values().value(node, "gain"), 0.7);
        assert_eq!(project.control_values().generation(node, "gain"), 2);
    }

    #[test]
    fn duplicate_port_name_is_rejected() {
        let mut project = Project::new(8);
        let node = add_node(&mut project, "mixer_node", "n");
        add_port(&mut project, node, "out", PortDirection::Output);
        let err = run(
            &mut project,
            Command::AddPort {
                node_id: node,
                name: "out".into(),
                direction: PortDirection::Output,
                port_type: PortType::Audio,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::Validation { .. }));
    }

    #[test]
    fn delete_port_drops_its_connections() {
        let mut project = Project::new(8);
        let src = add_node(&mut project, "mixer_node", "src");
        let dst = add_node(&mut project, "mixer_node", "dst");
        add_port(&mut project, src, "out", PortDirection::Output);
        add_port(&mut project, dst, "in", PortDirection::Input);
        connect(&mut project, src, "out", dst, "in").unwrap();
        let port = project.arena().children(src, "ports").unwrap()[0];

        run(
            &mut project,
            Command::DeletePort {
                node_id: src,
                port_id: port,
            },
        )
        .unwrap();
        assert!(project
            .arena()
            .children(project.root(), "connections")
            .unwrap()
            .is_empty());
        assert!(!project.arena().contains(port));
    }

    #[test]
    fn set_control_value_bumps_generation_and_emits_message() {
        let mut project = Project::new(8);
        let node = add_node(&mut project, "mixer_node", "n");

        let effects = run(
            &mut project,
            Command::SetControlValue {
                node_id: node,
                name: "gain".into(),
                value: 0.8,
            },
        )
        .unwrap();
        assert_eq!(
            effects,
            vec![EngineSideEffect::SendControlValue {
                node,
                name: "gain".into(),
                value: 0.8,
                generation: 1,
            }]
        );

        let effects = run(
            &mut project,
            Command::SetControlValue {
                node_id: node,
                name: "gain".into(),
                value: 0.2,
            },
        )
        .unwrap();
        assert_eq!(
            effects,
            vec![EngineSideEffect::SendControlValue {
                node,
                name: "gain".into(),
                value: 0.2,
                generation: 2,
            }]
        );
    }

    #[test]
    fn resizing_the_sequencer_resizes_every_channel() {
        let mut project = Project::new(8);
        let seq = add_node(&mut project, "step_sequencer", "seq");
        run(
            &mut project,
            Command::UpdateStepSequencer {
                node_id: seq,
                set_num_steps: None,
                set_time_synched: None,
                add_channel: Some(ChannelType::Gate),
            },
        )
        .unwrap();

        run(
            &mut project,
            Command::UpdateStepSequencer {
                node_id: seq,
                set_num_steps: Some(16),
                set_time_synched: None,
                add_channel: None,
            },
        )
        .unwrap();
        for channel in project.arena().children(seq, "channels").unwrap() {
            assert_eq!(project.arena().children(*channel, "steps").unwrap().len(), 16);
        }

        run(
            &mut project,
            Command::UpdateStepSequencer {
                node_id: seq,
                set_num_steps: Some(4),
                set_time_synched: None,
                add_channel: None,
            },
        )
        .unwrap();
        for channel in project.arena().children(seq, "channels").unwrap() {
            assert_eq!(project.arena().children(*channel, "steps").unwrap().len(), 4);
        }
    }

    #[test]
    fn invalid_num_steps_rolls_back_the_whole_command() {
        let mut project = Project::new(8);
        let seq = add_node(&mut project, "step_sequencer", "seq");

        let err = run(
            &mut project,
            Command::UpdateStepSequencer {
                node_id: seq,
                set_num_steps: Some(1000),
                set_time_synched: Some(true),
                add_channel: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::Validation { .. }));
        // time_synched was written before num_steps failed; the rollback
        // must have taken it back out.
        assert_eq!(
            project.arena().get_scalar(seq, "time_synched").unwrap(),
            Some(&Value::Bool(false))
        );
    }

    #[test]
    fn the_last_channel_cannot_be_deleted() {
        let mut project = Project::new(8);
        let seq = add_node(&mut project, "step_sequencer", "seq");
        let channel = project.arena().children(seq, "channels").unwrap()[0];
        let err = run(
            &mut project,
            Command::DeleteStepSequencerChannel {
                node_id: seq,
                channel_id: channel,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::Validation { .. }));
    }

    #[test]
    fn step_updates_apply_only_to_steps_of_that_sequencer() {
        let mut project = Project::new(8);
        let seq = add_node(&mut project, "step_sequencer", "a");
        let other = add_node(&mut project, "step_sequencer", "b");
        let channel = project.arena().children(seq, "channels").unwrap()[0];
        let step = project.arena().children(channel, "steps").unwrap()[0];

        run(
            &mut project,
            Command::UpdateStepSequencerStep {
                node_id: seq,
                step_id: step,
                set_value: Some(0.75),
                set_enabled: Some(true),
            },
        )
        .unwrap();
        assert_eq!(
            project.arena().get_scalar(step, "value").unwrap(),
            Some(&Value::Float(0.75))
        );
        assert_eq!(
            project.arena().get_scalar(step, "enabled").unwrap(),
            Some(&Value::Bool(true))
        );

        let err = run(
            &mut project,
            Command::UpdateStepSequencerStep {
                node_id: other,
                step_id: step,
                set_value: Some(0.1),
                set_enabled: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::Validation { .. }));
    }

    #[test]
    fn undo_and_redo_travel_the_command_history() {
        let mut project = Project::new(8);
        let node = add_node(&mut project, "mixer_node", "first");
        run(
            &mut project,
            Command::SetNodeName {
                node_id: node,
                name: "renamed".into(),
            },
        )
        .unwrap();
        assert_eq!(project.undo_label(), Some("set_node_name"));

        run(&mut project, Command::Undo).unwrap();
        assert_eq!(project.redo_label(), Some("set_node_name"));
        assert_eq!(
            project.arena().get_scalar(node, "name").unwrap(),
            Some(&Value::Str("first".into()))
        );

        run(&mut project, Command::Redo).unwrap();
        assert_eq!(
            project.arena().get_scalar(node, "name").unwrap(),
            Some(&Value::Str("renamed".into()))
        );

        run(&mut project, Command::Undo).unwrap();
        run(&mut project, Command::Undo).unwrap();
        assert!(project
            .arena()
            .children(project.root(), "nodes")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn undo_on_empty_history_is_a_quiet_noop() {
        let mut project = Project::new(8);
        run(&mut project, Command::Undo).unwrap();
        run(&mut project, Command::Redo).unwrap();
        assert!(!project.is_dirty());
    }

    #[test]
    fn failed_command_leaves_no_undo_entry() {
        let mut project = Project::new(8);
        let node = add_node(&mut project, "mixer_node", "n");
        assert!(project.can_undo());
        run(&mut project, Command::Undo).unwrap();
        assert!(!project.can_undo());

        let err = run(
            &mut project,
            Command::SetNodeName {
                node_id: node,
                name: String::new(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::Validation { .. }));
        assert!(!project.can_undo());
    }
}
