//! Whole-graph snapshot history.
//!
//! Each undoable command pushes the pre-command arena together with the
//! command's label; undo and redo swap snapshots with the live graph, the
//! label travelling with the edit it describes. Control values carry their
//! own generation counters and deliberately stay out of the history.

use std::collections::VecDeque;

use crate::model::ObjectArena;

struct HistoryEntry {
    label: String,
    snapshot: ObjectArena,
}

pub struct UndoHistory {
    undo: VecDeque<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    max_depth: usize,
}

impl UndoHistory {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_depth,
        }
    }

    /// Record the state a command is about to mutate. New work invalidates
    /// the redo chain.
    pub fn push(&mut self, label: impl Into<String>, snapshot: ObjectArena) {
        if self.undo.len() == self.max_depth {
            self.undo.pop_front();
        }
        self.undo.push_back(HistoryEntry {
            label: label.into(),
            snapshot,
        });
        self.redo.clear();
    }

    /// Swap the current graph for the most recent snapshot. `None` when
    /// there is nothing to undo; the graph is untouched in that case.
    /// Returns the label of the edit that was undone.
    pub fn undo(&mut self, current: &ObjectArena) -> Option<(String, ObjectArena)> {
        let entry = self.undo.pop_back()?;
        self.redo.push(HistoryEntry {
            label: entry.label.clone(),
            snapshot: current.clone(),
        });
        Some((entry.label, entry.snapshot))
    }

    pub fn redo(&mut self, current: &ObjectArena) -> Option<(String, ObjectArena)> {
        let entry = self.redo.pop()?;
        self.undo.push_back(HistoryEntry {
            label: entry.label.clone(),
            snapshot: current.clone(),
        });
        Some((entry.label, entry.snapshot))
    }

    /// Label of the edit undo() would revert next.
    pub fn undo_label(&self) -> Option<&str> {
        self.undo.back().map(|e| e.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.redo.last().map(|e| e.label.as_str())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::classes::builtin_registry;
    use ostinato_types::Value;
    use std::sync::Arc;

    fn arena_with_name(name: &str) -> ObjectArena {
        let mut a = ObjectArena::new(Arc::new(builtin_registry()));
        let id = a.create("project").unwrap();
        a.set_scalar(id, "name", Some(Value::Str(name.into())))
            .unwrap();
        a
    }

    fn name_of(a: &ObjectArena) -> String {
        let id = a.ids().next().unwrap();
        a.get_scalar(id, "name")
            .unwrap()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap()
    }

    #[test]
    fn undo_then_redo_restores_both_states() {
        let mut history = UndoHistory::new(8);
        let before = arena_with_name("before");
        let after = arena_with_name("after");

        history.push("rename", before.clone());
        assert_eq!(history.undo_label(), Some("rename"));
        let (label, undone) = history.undo(&after).unwrap();
        assert_eq!(label, "rename");
        assert_eq!(name_of(&undone), "before");
        assert_eq!(history.redo_label(), Some("rename"));
        let (_, redone) = history.redo(&undone).unwrap();
        assert_eq!(name_of(&redone), "after");
    }

    #[test]
    fn new_work_clears_the_redo_chain() {
        let mut history = UndoHistory::new(8);
        history.push("first", arena_with_name("a"));
        let current = arena_with_name("b");
        let (_, undone) = history.undo(&current).unwrap();
        assert!(history.can_redo());
        history.push("second", undone);
        assert!(!history.can_redo());
    }

    #[test]
    fn history_is_bounded() {
        let mut history = UndoHistory::new(2);
        history.push("one", arena_with_name("1"));
        history.push("two", arena_with_name("2"));
        history.push("three", arena_with_name("3"));
        let current = arena_with_name("x");
        assert_eq!(name_of(&history.undo(&current).unwrap().1), "3");
        assert_eq!(name_of(&history.undo(&current).unwrap().1), "2");
        assert!(history.undo(&current).is_none());
    }

    #[test]
    fn empty_history_has_nothing_to_offer() {
        let mut history = UndoHistory::new(8);
        let current = arena_with_name("x");
        assert!(!history.can_undo());
        assert!(history.undo(&current).is_none());
        assert!(history.redo(&current).is_none());
        assert_eq!(history.undo_label(), None);
    }
}
