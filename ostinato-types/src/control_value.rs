//! Per-node control values with generation tie-breaking.
//!
//! The same control can be edited almost simultaneously from the UI and by
//! the engine echoing a value back. Each (node, name) pair carries a
//! monotonically increasing generation counter; the side with the higher
//! generation wins, and an update carrying a lower generation than the one
//! already known is silently discarded.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlValue {
    pub value: f64,
    pub generation: u64,
}

/// Result of applying an update. `Stale` is informational, not an error:
/// discarding out-of-order echoes is the core conflict-resolution policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetOutcome {
    /// The update won; `old` is the previously stored value, if any.
    Applied { old: Option<f64> },
    /// The update carried a generation below the stored one and was dropped.
    Stale,
    /// Generation advanced but the value is identical; listeners need not fire.
    Unchanged,
}

/// Map from control name to (value, generation) for one node.
///
/// Created lazily on first use, lives as long as the owning node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlValueMap {
    entries: HashMap<String, ControlValue>,
    defaults: HashMap<String, f64>,
}

impl ControlValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the default reported for a control before any update.
    pub fn define(&mut self, name: impl Into<String>, default: f64) {
        self.defaults.insert(name.into(), default);
    }

    /// Last known value, or the declared default (0.0 if none) when unset.
    pub fn value(&self, name: &str) -> f64 {
        match self.entries.get(name) {
            Some(cv) => cv.value,
            None => self.defaults.get(name).copied().unwrap_or(0.0),
        }
    }

    /// Current tie-break counter; 0 before the first update.
    pub fn generation(&self, name: &str) -> u64 {
        self.entries.get(name).map(|cv| cv.generation).unwrap_or(0)
    }

    /// Apply an update iff `generation >= current_generation`.
    pub fn set(&mut self, name: &str, value: f64, generation: u64) -> SetOutcome {
        match self.entries.get_mut(name) {
            Some(cv) => {
                if generation < cv.generation {
                    return SetOutcome::Stale;
                }
                let old = cv.value;
                cv.generation = generation;
                if old == value {
                    return SetOutcome::Unchanged;
                }
                cv.value = value;
                SetOutcome::Applied { old: Some(old) }
            }
            None => {
                self.entries.insert(name.to_string(), ControlValue { value, generation });
                SetOutcome::Applied { old: None }
            }
        }
    }

    /// Local-edit path: advance the generation past everything seen so far
    /// and apply the value. Returns the generation the edit was applied at.
    pub fn bump(&mut self, name: &str, value: f64) -> u64 {
        let generation = self.generation(name) + 1;
        self.set(name, value, generation);
        generation
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_value_reports_default() {
        let mut m = ControlValueMap::new();
        assert_eq!(m.value("gain"), 0.0);
        m.define("gain", 1.0);
        assert_eq!(m.value("gain"), 1.0);
        assert_eq!(m.generation("gain"), 0);
    }

    #[test]
    fn lower_generation_is_discarded() {
        let mut m = ControlValueMap::new();
        assert_eq!(m.set("gain", 1.0, 5), SetOutcome::Applied { old: None });
        assert_eq!(m.set("gain", 0.5, 3), SetOutcome::Stale);
        assert_eq!(m.value("gain"), 1.0);
        assert_eq!(m.generation("gain"), 5);

        assert_eq!(m.set("gain", 0.5, 6), SetOutcome::Applied { old: Some(1.0) });
        assert_eq!(m.value("gain"), 0.5);
    }

    #[test]
    fn equal_generation_wins() {
        let mut m = ControlValueMap::new();
        m.set("cutoff", 100.0, 4);
        assert_eq!(m.set("cutoff", 200.0, 4), SetOutcome::Applied { old: Some(100.0) });
        assert_eq!(m.value("cutoff"), 200.0);
    }

    #[test]
    fn same_value_advances_generation_without_change() {
        let mut m = ControlValueMap::new();
        m.set("gain", 1.0, 2);
        assert_eq!(m.set("gain", 1.0, 7), SetOutcome::Unchanged);
        assert_eq!(m.generation("gain"), 7);
    }

    #[test]
    fn bump_always_beats_prior_updates() {
        let mut m = ControlValueMap::new();
        m.set("gain", 0.3, 9);
        let generation = m.bump("gain", 0.8);
        assert_eq!(generation, 10);
        assert_eq!(m.value("gain"), 0.8);
        // An engine echo of the old edit arrives late and loses.
        assert_eq!(m.set("gain", 0.3, 9), SetOutcome::Stale);
        assert_eq!(m.value("gain"), 0.8);
    }
}
