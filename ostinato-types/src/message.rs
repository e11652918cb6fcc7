//! Wire messages crossing the engine boundary.
//!
//! Outbound messages carry control edits and events to the backend, keyed
//! by the target node's 16-hex-digit id. Inbound node messages carry
//! telemetry addressed by the same key; their URIs are wire-level
//! identifiers and must be preserved bit-exact.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the audio backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendState {
    #[default]
    Stopped,
    Starting,
    Running,
    Crashed,
    Stopping,
}

pub const MIXER_METER_URI: &str = "http://noisicaa.odahoda.de/lv2/processor_mixer#meter";
pub const VUMETER_METER_URI: &str = "http://noisicaa.odahoda.de/lv2/processor_vumeter#meter";
pub const STEP_SEQUENCER_CURRENT_STEP_URI: &str =
    "http://noisicaa.odahoda.de/lv2/processor_step_sequencer#current_step";
pub const CUSTOM_CSOUND_LOG_URI: &str =
    "http://noisicaa.odahoda.de/lv2/processor_custom_csound#csound-log";
pub const OSCILLOSCOPE_SIGNAL_URI: &str =
    "http://noisicaa.odahoda.de/lv2/processor_oscilloscope#signal";

/// Message sent to the backend, addressed to one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineMessage {
    /// 16-hex-digit node id (`ObjectId::key()`).
    pub node_key: String,
    pub kind: EngineMessageKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMessageKind {
    ControlValue {
        name: String,
        value: f64,
        generation: u64,
    },
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8 },
}

/// Telemetry emitted by the backend, addressed to one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMessage {
    /// 16-hex-digit node id (`ObjectId::key()`).
    pub node_key: String,
    pub payload: NodeMessagePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeMessagePayload {
    MixerMeter {
        current_l: f32,
        peak_l: f32,
        current_r: f32,
        peak_r: f32,
    },
    VuMeter {
        current_l: f32,
        peak_l: f32,
        current_r: f32,
        peak_r: f32,
    },
    CurrentStep(u32),
    CsoundLog(String),
    OscilloscopeSignal(Vec<f32>),
    /// The backend echoing a control value back, generation attached so the
    /// control side can discard stale echoes.
    ControlValueEcho {
        name: String,
        value: f64,
        generation: u64,
    },
}

impl NodeMessagePayload {
    /// The LV2-style wire URI for this payload, or `None` for internal
    /// payloads that never hit the LV2 surface.
    pub fn uri(&self) -> Option<&'static str> {
        match self {
            NodeMessagePayload::MixerMeter { .. } => Some(MIXER_METER_URI),
            NodeMessagePayload::VuMeter { .. } => Some(VUMETER_METER_URI),
            NodeMessagePayload::CurrentStep(_) => Some(STEP_SEQUENCER_CURRENT_STEP_URI),
            NodeMessagePayload::CsoundLog(_) => Some(CUSTOM_CSOUND_LOG_URI),
            NodeMessagePayload::OscilloscopeSignal(_) => Some(OSCILLOSCOPE_SIGNAL_URI),
            NodeMessagePayload::ControlValueEcho { .. } => None,
        }
    }

    /// Rebuild a payload from its wire URI and raw operands. Shapes are
    /// fixed per URI; a mismatched shape yields `None`.
    pub fn from_uri(uri: &str, raw: &serde_json::Value) -> Option<Self> {
        match uri {
            MIXER_METER_URI | VUMETER_METER_URI => {
                let arr = raw.as_array()?;
                if arr.len() != 4 {
                    return None;
                }
                let mut vals = [0.0f32; 4];
                for (slot, v) in vals.iter_mut().zip(arr) {
                    *slot = v.as_f64()? as f32;
                }
                let [current_l, peak_l, current_r, peak_r] = vals;
                if uri == MIXER_METER_URI {
                    Some(NodeMessagePayload::MixerMeter { current_l, peak_l, current_r, peak_r })
                } else {
                    Some(NodeMessagePayload::VuMeter { current_l, peak_l, current_r, peak_r })
                }
            }
            STEP_SEQUENCER_CURRENT_STEP_URI => {
                raw.as_u64().map(|v| NodeMessagePayload::CurrentStep(v as u32))
            }
            CUSTOM_CSOUND_LOG_URI => {
                raw.as_str().map(|s| NodeMessagePayload::CsoundLog(s.to_string()))
            }
            OSCILLOSCOPE_SIGNAL_URI => {
                let arr = raw.as_array()?;
                let mut out = Vec::with_capacity(arr.len());
                for v in arr {
                    out.push(v.as_f64()? as f32);
                }
                Some(NodeMessagePayload::OscilloscopeSignal(out))
            }
            _ => None,
        }
    }
}

/// Everything flowing back from the engine thread to the control side.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineFeedback {
    Node(NodeMessage),
    StateChanged(BackendState),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_uris_are_bit_exact() {
        assert_eq!(
            MIXER_METER_URI,
            "http://noisicaa.odahoda.de/lv2/processor_mixer#meter"
        );
        assert_eq!(
            VUMETER_METER_URI,
            "http://noisicaa.odahoda.de/lv2/processor_vumeter#meter"
        );
        assert_eq!(
            STEP_SEQUENCER_CURRENT_STEP_URI,
            "http://noisicaa.odahoda.de/lv2/processor_step_sequencer#current_step"
        );
        assert_eq!(
            CUSTOM_CSOUND_LOG_URI,
            "http://noisicaa.odahoda.de/lv2/processor_custom_csound#csound-log"
        );
        assert_eq!(
            OSCILLOSCOPE_SIGNAL_URI,
            "http://noisicaa.odahoda.de/lv2/processor_oscilloscope#signal"
        );
    }

    #[test]
    fn meter_payload_round_trips_through_uri() {
        let payload = NodeMessagePayload::MixerMeter {
            current_l: -12.0,
            peak_l: -6.0,
            current_r: -11.5,
            peak_r: -5.5,
        };
        let uri = payload.uri().unwrap();
        let raw = serde_json::json!([-12.0, -6.0, -11.5, -5.5]);
        assert_eq!(NodeMessagePayload::from_uri(uri, &raw), Some(payload));
    }

    #[test]
    fn current_step_payload_parses() {
        let raw = serde_json::json!(5);
        assert_eq!(
            NodeMessagePayload::from_uri(STEP_SEQUENCER_CURRENT_STEP_URI, &raw),
            Some(NodeMessagePayload::CurrentStep(5))
        );
    }

    #[test]
    fn malformed_payload_shapes_are_rejected() {
        assert_eq!(
            NodeMessagePayload::from_uri(MIXER_METER_URI, &serde_json::json!([1.0, 2.0])),
            None
        );
        assert_eq!(
            NodeMessagePayload::from_uri(CUSTOM_CSOUND_LOG_URI, &serde_json::json!(3)),
            None
        );
        assert_eq!(NodeMessagePayload::from_uri("http://nope", &serde_json::json!(1)), None);
    }

    #[test]
    fn echo_payload_has_no_wire_uri() {
        let p = NodeMessagePayload::ControlValueEcho {
            name: "gain".into(),
            value: 0.5,
            generation: 2,
        };
        assert_eq!(p.uri(), None);
    }
}
