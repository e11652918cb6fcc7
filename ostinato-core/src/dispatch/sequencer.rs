//! Handlers for the step sequencer command family.

use ostinato_types::error::CommandError;
use ostinato_types::{ChannelType, ModelError, ObjectId, Value};

use crate::model::ObjectArena;
use crate::project::Mutator;

use super::graph::add_sequencer_channel;

/// Step counts the engine worklets accept.
pub(super) const MIN_STEPS: i64 = 2;
pub(super) const MAX_STEPS: i64 = 128;

fn validation(reason: impl Into<String>, command: &'static str) -> CommandError {
    CommandError::validation(command, reason)
}

fn wrap(command: &'static str) -> impl Fn(ModelError) -> CommandError {
    move |e| CommandError::Failed {
        command,
        reason: e.to_string(),
    }
}

fn require_sequencer(
    arena: &ObjectArena,
    node: ObjectId,
    command: &'static str,
) -> Result<(), CommandError> {
    match arena.is_a(node, "step_sequencer") {
        Ok(true) => Ok(()),
        Ok(false) => Err(validation(
            format!("object {node} is not a step sequencer"),
            command,
        )),
        Err(err) => Err(validation(err.to_string(), command)),
    }
}

fn require_channel_of(
    arena: &ObjectArena,
    node: ObjectId,
    channel: ObjectId,
    command: &'static str,
) -> Result<(), CommandError> {
    let owned = arena.get(channel).ok().and_then(|o| o.parent()) == Some(node);
    if owned {
        Ok(())
    } else {
        Err(validation(
            format!("channel {channel} does not belong to sequencer {node}"),
            command,
        ))
    }
}

pub(super) fn update_sequencer(
    m: &mut Mutator<'_>,
    node: ObjectId,
    set_num_steps: Option<u32>,
    set_time_synched: Option<bool>,
    add_channel: Option<ChannelType>,
) -> Result<(), CommandError> {
    const CMD: &str = "update_step_sequencer";
    require_sequencer(m.arena(), node, CMD)?;

    if let Some(time_synched) = set_time_synched {
        m.set_scalar(node, "time_synched", Some(Value::Bool(time_synched)))
            .map_err(wrap(CMD))?;
    }

    if let Some(num_steps) = set_num_steps {
        let num_steps = i64::from(num_steps);
        if !(MIN_STEPS..=MAX_STEPS).contains(&num_steps) {
            return Err(validation(
                format!("num_steps must be within {MIN_STEPS}..={MAX_STEPS}, got {num_steps}"),
                CMD,
            ));
        }
        m.set_scalar(node, "num_steps", Some(Value::Int(num_steps)))
            .map_err(wrap(CMD))?;
        resize_channels(m, node, num_steps as usize)?;
    }

    if let Some(channel_type) = add_channel {
        add_sequencer_channel(m, node, channel_type.as_str(), CMD)?;
    }

    Ok(())
}

/// Grow or shrink every channel's step list to `num_steps`. Growth appends
/// fresh default steps; shrink drops from the tail.
fn resize_channels(
    m: &mut Mutator<'_>,
    node: ObjectId,
    num_steps: usize,
) -> Result<(), CommandError> {
    const CMD: &str = "update_step_sequencer";
    let channels: Vec<ObjectId> = m
        .arena()
        .children(node, "channels")
        .map_err(wrap(CMD))?
        .to_vec();
    for channel in channels {
        let mut len = m.arena().children(channel, "steps").map_err(wrap(CMD))?.len();
        while len < num_steps {
            let step = m.create("step_sequencer_step").map_err(wrap(CMD))?;
            m.child_push(channel, "steps", step).map_err(wrap(CMD))?;
            len += 1;
        }
        while len > num_steps {
            len -= 1;
            let step = m.arena().children(channel, "steps").map_err(wrap(CMD))?[len];
            m.remove_subtree(step).map_err(wrap(CMD))?;
        }
    }
    Ok(())
}

pub(super) fn update_channel(
    m: &mut Mutator<'_>,
    node: ObjectId,
    channel: ObjectId,
    set_type: Option<ChannelType>,
    set_log_scale: Option<bool>,
) -> Result<(), CommandError> {
    const CMD: &str = "update_step_sequencer_channel";
    require_sequencer(m.arena(), node, CMD)?;
    require_channel_of(m.arena(), node, channel, CMD)?;

    if let Some(channel_type) = set_type {
        m.set_scalar(
            channel,
            "channel_type",
            Some(Value::Str(channel_type.as_str().to_owned())),
        )
        .map_err(wrap(CMD))?;
    }
    if let Some(log_scale) = set_log_scale {
        m.set_scalar(channel, "log_scale", Some(Value::Bool(log_scale)))
            .map_err(wrap(CMD))?;
    }
    Ok(())
}

pub(super) fn delete_channel(
    m: &mut Mutator<'_>,
    node: ObjectId,
    channel: ObjectId,
) -> Result<(), CommandError> {
    const CMD: &str = "delete_step_sequencer_channel";
    require_sequencer(m.arena(), node, CMD)?;
    require_channel_of(m.arena(), node, channel, CMD)?;
    let count = m.arena().children(node, "channels").map_err(wrap(CMD))?.len();
    if count <= 1 {
        return Err(validation("a sequencer keeps at least one channel", CMD));
    }
    m.remove_subtree(channel).map_err(wrap(CMD))?;
    Ok(())
}

pub(super) fn update_step(
    m: &mut Mutator<'_>,
    node: ObjectId,
    step: ObjectId,
    set_value: Option<f64>,
    set_enabled: Option<bool>,
) -> Result<(), CommandError> {
    const CMD: &str = "update_step_sequencer_step";
    require_sequencer(m.arena(), node, CMD)?;

    let channel = m.arena().get(step).ok().and_then(|o| o.parent());
    let belongs = match channel {
        Some(channel) => m.arena().get(channel).ok().and_then(|o| o.parent()) == Some(node),
        None => false,
    };
    if !belongs {
        return Err(validation(
            format!("step {step} does not belong to sequencer {node}"),
            CMD,
        ));
    }

    if let Some(value) = set_value {
        m.set_scalar(step, "value", Some(Value::Float(value)))
            .map_err(wrap(CMD))?;
    }
    if let Some(enabled) = set_enabled {
        m.set_scalar(step, "enabled", Some(Value::Bool(enabled)))
            .map_err(wrap(CMD))?;
    }
    Ok(())
}
