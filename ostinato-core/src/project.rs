//! The project: one object graph, its control values, its listeners, and
//! its history, behind a transactional mutation scope.

use std::collections::HashMap;
use std::sync::Arc;

use ostinato_types::control_value::SetOutcome;
use ostinato_types::error::{CommandError, ListenerError, ModelError};
use ostinato_types::{Change, ControlValueMap, ObjectId, Value};

use crate::bus::{BusListener, CallbackRegistry, ChangeBus, ListenerId};
use crate::model::classes::builtin_registry;
use crate::model::ObjectArena;
use crate::undo::UndoHistory;

/// Fired to control-value listeners after an update wins its generation
/// race and actually changes the stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlValueEvent {
    pub node: ObjectId,
    pub name: String,
    pub old: Option<f64>,
    pub value: f64,
    pub generation: u64,
}

/// Handle for one control-value subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlListener {
    node: ObjectId,
    name: String,
    id: ListenerId,
}

/// Control values for every node, keyed by node id. Maps are created
/// lazily on first touch and kept for the life of the project even when
/// the node is deleted: ids are never reused, and a node revived by undo
/// must keep its generations so late echoes of pre-delete edits still
/// lose the tie-break. Listeners are dropped with their node.
#[derive(Default)]
pub struct ControlValueStore {
    maps: HashMap<ObjectId, ControlValueMap>,
    listeners: HashMap<ObjectId, HashMap<String, CallbackRegistry<ControlValueEvent>>>,
}

impl ControlValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, node: ObjectId, name: &str) -> f64 {
        self.maps.get(&node).map(|m| m.value(name)).unwrap_or(0.0)
    }

    pub fn generation(&self, node: ObjectId, name: &str) -> u64 {
        self.maps.get(&node).map(|m| m.generation(name)).unwrap_or(0)
    }

    /// Remote path: apply iff the generation is not below the stored one.
    /// Listeners fire only when the value actually changed.
    pub fn set(&mut self, node: ObjectId, name: &str, value: f64, generation: u64) -> SetOutcome {
        let outcome = self.maps.entry(node).or_default().set(name, value, generation);
        if let SetOutcome::Applied { old } = outcome {
            self.notify(node, name, old, value, generation);
        }
        outcome
    }

    /// Local-edit path: advance the generation and apply. Returns the
    /// generation the edit went out under.
    pub fn bump(&mut self, node: ObjectId, name: &str, value: f64) -> u64 {
        let map = self.maps.entry(node).or_default();
        let old = map.names().any(|n| n == name).then(|| map.value(name));
        let generation = map.bump(name, value);
        if old != Some(value) {
            self.notify(node, name, old, value, generation);
        }
        generation
    }

    /// Subscribe to one named control of one node.
    pub fn listen(
        &mut self,
        node: ObjectId,
        name: &str,
        callback: impl FnMut(&ControlValueEvent) + 'static,
    ) -> ControlListener {
        let id = self
            .listeners
            .entry(node)
            .or_default()
            .entry(name.to_owned())
            .or_default()
            .add(callback);
        ControlListener {
            node,
            name: name.to_owned(),
            id,
        }
    }

    pub fn unlisten(&mut self, listener: ControlListener) -> Result<(), ListenerError> {
        let registry = self
            .listeners
            .get_mut(&listener.node)
            .and_then(|by_name| by_name.get_mut(&listener.name))
            .ok_or(ListenerError::NotRegistered(listener.id.raw()))?;
        registry.remove(listener.id)
    }

    fn notify(&mut self, node: ObjectId, name: &str, old: Option<f64>, value: f64, generation: u64) {
        let registry = self
            .listeners
            .get_mut(&node)
            .and_then(|by_name| by_name.get_mut(name));
        if let Some(registry) = registry {
            registry.emit(&ControlValueEvent {
                node,
                name: name.to_owned(),
                old,
                value,
                generation,
            });
        }
    }

    pub fn drop_listeners(&mut self, node: ObjectId) {
        self.listeners.remove(&node);
    }

    pub fn nodes(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.maps.keys().copied()
    }

    pub fn map(&self, node: ObjectId) -> Option<&ControlValueMap> {
        self.maps.get(&node)
    }

    pub fn restore(&mut self, node: ObjectId, map: ControlValueMap) {
        self.maps.insert(node, map);
    }
}

/// Mutation surface handed to the closure in [`Project::apply_mutations`].
/// Every write goes through here so its change event lands in the
/// transaction buffer.
pub struct Mutator<'a> {
    arena: &'a mut ObjectArena,
    changes: &'a mut Vec<Change>,
}

impl<'a> Mutator<'a> {
    pub fn arena(&self) -> &ObjectArena {
        self.arena
    }

    pub fn create(&mut self, class_name: &str) -> Result<ObjectId, ModelError> {
        self.arena.create(class_name)
    }

    pub fn set_scalar(
        &mut self,
        id: ObjectId,
        property: &str,
        value: Option<Value>,
    ) -> Result<(), ModelError> {
        if let Some(change) = self.arena.set_scalar(id, property, value)? {
            self.changes.push(change);
        }
        Ok(())
    }

    pub fn list_insert(
        &mut self,
        id: ObjectId,
        property: &str,
        index: usize,
        value: Value,
    ) -> Result<(), ModelError> {
        let change = self.arena.list_insert(id, property, index, value)?;
        self.changes.push(change);
        Ok(())
    }

    pub fn list_delete(
        &mut self,
        id: ObjectId,
        property: &str,
        index: usize,
    ) -> Result<(), ModelError> {
        let change = self.arena.list_delete(id, property, index)?;
        self.changes.push(change);
        Ok(())
    }

    pub fn list_clear(&mut self, id: ObjectId, property: &str) -> Result<(), ModelError> {
        let change = self.arena.list_clear(id, property)?;
        self.changes.push(change);
        Ok(())
    }

    pub fn set_child(
        &mut self,
        id: ObjectId,
        property: &str,
        child: Option<ObjectId>,
    ) -> Result<(), ModelError> {
        if let Some(change) = self.arena.set_child(id, property, child)? {
            self.changes.push(change);
        }
        Ok(())
    }

    pub fn child_insert(
        &mut self,
        id: ObjectId,
        property: &str,
        index: usize,
        child: ObjectId,
    ) -> Result<(), ModelError> {
        let change = self.arena.child_insert(id, property, index, child)?;
        self.changes.push(change);
        Ok(())
    }

    pub fn child_push(
        &mut self,
        id: ObjectId,
        property: &str,
        child: ObjectId,
    ) -> Result<(), ModelError> {
        let change = self.arena.child_push(id, property, child)?;
        self.changes.push(change);
        Ok(())
    }

    pub fn child_delete(
        &mut self,
        id: ObjectId,
        property: &str,
        index: usize,
    ) -> Result<(), ModelError> {
        let change = self.arena.child_delete(id, property, index)?;
        self.changes.push(change);
        Ok(())
    }

    /// Detach and drop an object with everything it owns. One ChildDelete
    /// (or ChildSet) is buffered for the detach; the interior of the
    /// subtree vanishes without further events.
    pub fn remove_subtree(&mut self, id: ObjectId) -> Result<Vec<ObjectId>, ModelError> {
        if let Some((owner, slot)) = self.arena.get(id)?.owner_slot() {
            let in_list = self
                .arena
                .children(owner, slot)
                .ok()
                .and_then(|children| children.iter().position(|c| *c == id));
            match in_list {
                Some(index) => self.child_delete(owner, slot, index)?,
                None => self.set_child(owner, slot, None)?,
            }
        }
        self.arena.remove_subtree(id)
    }
}

pub struct Project {
    arena: ObjectArena,
    root: ObjectId,
    control_values: ControlValueStore,
    undo: UndoHistory,
    bus: ChangeBus,
    dirty: bool,
    in_transaction: bool,
}

impl Project {
    pub fn new(undo_depth: usize) -> Self {
        let mut arena = ObjectArena::new(Arc::new(builtin_registry()));
        let root = match arena.create("project") {
            Ok(root) => root,
            Err(err) => unreachable!("builtin project class missing: {err}"),
        };
        Self::from_parts(arena, root, ControlValueStore::new(), undo_depth)
    }

    /// Assemble a project around a graph loaded from storage.
    pub fn from_parts(
        arena: ObjectArena,
        root: ObjectId,
        control_values: ControlValueStore,
        undo_depth: usize,
    ) -> Self {
        Self {
            arena,
            root,
            control_values,
            undo: UndoHistory::new(undo_depth),
            bus: ChangeBus::new(),
            dirty: false,
            in_transaction: false,
        }
    }

    pub fn root(&self) -> ObjectId {
        self.root
    }

    pub fn arena(&self) -> &ObjectArena {
        &self.arena
    }

    pub fn control_values(&self) -> &ControlValueStore {
        &self.control_values
    }

    pub fn control_values_mut(&mut self) -> &mut ControlValueStore {
        &mut self.control_values
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    // ---- listeners ----

    pub fn listen_property(
        &mut self,
        object: ObjectId,
        property: &'static str,
        callback: impl FnMut(&Change) + 'static,
    ) -> BusListener {
        self.bus.listen_property(object, property, callback)
    }

    pub fn listen_graph(&mut self, callback: impl FnMut(&Change) + 'static) -> BusListener {
        self.bus.listen_graph(callback)
    }

    pub fn unlisten(&mut self, listener: BusListener) -> Result<(), ListenerError> {
        self.bus.unlisten(listener)
    }

    // ---- transactions ----

    /// Run `f` as one transaction. On success every buffered change is
    /// dispatched to listeners in mutation order; on failure the graph is
    /// restored to its pre-transaction state and listeners see nothing.
    /// `description` labels the edit in logs and in the undo history.
    pub fn apply_mutations<R>(
        &mut self,
        description: &str,
        f: impl FnOnce(&mut Mutator<'_>) -> Result<R, CommandError>,
    ) -> Result<R, CommandError> {
        if self.in_transaction {
            return Err(CommandError::NestedTransaction);
        }
        log::debug!(target: "project", "apply: {description}");
        self.in_transaction = true;
        let snapshot = self.arena.clone();
        let mut changes = Vec::new();
        let result = f(&mut Mutator {
            arena: &mut self.arena,
            changes: &mut changes,
        });
        self.in_transaction = false;
        match result {
            Ok(value) => {
                if !changes.is_empty() {
                    self.dirty = true;
                }
                for change in &changes {
                    self.bus.emit(change);
                }
                Ok(value)
            }
            Err(err) => {
                self.arena = snapshot;
                Err(err)
            }
        }
    }

    // ---- history ----

    pub fn push_undo_snapshot(&mut self, label: &str) {
        let snapshot = self.arena.clone();
        self.record_undo(label, snapshot);
    }

    /// Record a pre-command snapshot taken by the caller.
    pub fn record_undo(&mut self, label: &str, snapshot: ObjectArena) {
        self.undo.push(label, snapshot);
    }

    /// Revert to the state before the last undoable command. Returns
    /// whether anything happened.
    pub fn undo(&mut self) -> bool {
        match self.undo.undo(&self.arena) {
            Some((label, previous)) => {
                log::debug!(target: "project", "undo: {label}");
                self.arena = previous;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.undo.redo(&self.arena) {
            Some((label, next)) => {
                log::debug!(target: "project", "redo: {label}");
                self.arena = next;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    /// Label of the edit undo would revert next, for menu captions.
    pub fn undo_label(&self) -> Option<&str> {
        self.undo.undo_label()
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.undo.redo_label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn committed_changes_reach_listeners_in_mutation_order() {
        let mut project = Project::new(8);
        let root = project.root();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = Rc::clone(&seen);
        project.listen_graph(move |change| {
            seen2.borrow_mut().push(change.property().to_owned());
        });

        project
            .apply_mutations("test edit", |m| {
                m.set_scalar(root, "name", Some(Value::Str("one".into())))
                    .map_err(|e| CommandError::validation("test", e.to_string()))?;
                let node = m
                    .create("mixer_node")
                    .map_err(|e| CommandError::validation("test", e.to_string()))?;
                m.child_push(root, "nodes", node)
                    .map_err(|e| CommandError::validation("test", e.to_string()))?;
                Ok(())
            })
            .unwrap();

        assert_eq!(*seen.borrow(), vec!["name".to_owned(), "nodes".to_owned()]);
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let mut project = Project::new(8);
        let root = project.root();
        let seen = Rc::new(RefCell::new(0));
        let seen2 = Rc::clone(&seen);
        project.listen_graph(move |_| *seen2.borrow_mut() += 1);

        let result: Result<(), CommandError> = project.apply_mutations("test edit", |m| {
            m.set_scalar(root, "name", Some(Value::Str("partial".into())))
                .map_err(|e| CommandError::validation("test", e.to_string()))?;
            let node = m
                .create("mixer_node")
                .map_err(|e| CommandError::validation("test", e.to_string()))?;
            m.child_push(root, "nodes", node)
                .map_err(|e| CommandError::validation("test", e.to_string()))?;
            Err(CommandError::validation("test", "forced failure"))
        });

        assert!(result.is_err());
        assert_eq!(*seen.borrow(), 0);
        assert_eq!(
            project.arena().get_scalar(root, "name").unwrap(),
            Some(&Value::Str(String::new()))
        );
        assert!(project.arena().children(root, "nodes").unwrap().is_empty());
        assert!(!project.is_dirty());
    }

    #[test]
    fn property_listener_sees_operands() {
        let mut project = Project::new(8);
        let root = project.root();
        let seen = Rc::new(RefCell::new(None));
        let seen2 = Rc::clone(&seen);
        project.listen_property(root, "name", move |change| {
            *seen2.borrow_mut() = Some(change.clone());
        });

        project
            .apply_mutations("test edit", |m| {
                m.set_scalar(root, "name", Some(Value::Str("renamed".into())))
                    .map_err(|e| CommandError::validation("test", e.to_string()))
            })
            .unwrap();

        assert_eq!(
            seen.borrow().clone(),
            Some(Change::Scalar {
                object: root,
                property: "name",
                old: Some(Value::Str(String::new())),
                new: Some(Value::Str("renamed".into())),
            })
        );
    }

    #[test]
    fn undo_restores_the_previous_graph() {
        let mut project = Project::new(8);
        let root = project.root();

        project.push_undo_snapshot("test edit");
        project
            .apply_mutations("test edit", |m| {
                m.set_scalar(root, "name", Some(Value::Str("edited".into())))
                    .map_err(|e| CommandError::validation("test", e.to_string()))
            })
            .unwrap();

        assert!(project.undo());
        assert_eq!(
            project.arena().get_scalar(root, "name").unwrap(),
            Some(&Value::Str(String::new()))
        );
        assert!(project.redo());
        assert_eq!(
            project.arena().get_scalar(root, "name").unwrap(),
            Some(&Value::Str("edited".into()))
        );
    }

    #[test]
    fn undo_leaves_control_value_generations_alone() {
        let mut project = Project::new(8);
        let node = ObjectId::new(99);
        project.control_values_mut().bump(node, "gain", 0.8);

        project.push_undo_snapshot("test edit");
        let root = project.root();
        project
            .apply_mutations("test edit", |m| {
                m.set_scalar(root, "name", Some(Value::Str("x".into())))
                    .map_err(|e| CommandError::validation("test", e.to_string()))
            })
            .unwrap();
        project.undo();

        assert_eq!(project.control_values().value(node, "gain"), 0.8);
        assert_eq!(project.control_values().generation(node, "gain"), 1);
    }

    #[test]
    fn control_listener_fires_on_winning_updates_only() {
        let mut store = ControlValueStore::new();
        let node = ObjectId::new(4);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = Rc::clone(&seen);
        let listener = store.listen(node, "gain", move |event| {
            seen2.borrow_mut().push(event.clone());
        });

        store.set(node, "gain", 0.9, 3);
        store.set(node, "gain", 0.1, 1); // stale, dropped
        store.set(node, "gain", 0.9, 5); // same value, no event
        store.set(node, "cutoff", 2.0, 1); // different control
        store.bump(node, "gain", 0.4);

        let events = seen.borrow().clone();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            ControlValueEvent {
                node,
                name: "gain".into(),
                old: None,
                value: 0.9,
                generation: 3,
            }
        );
        assert_eq!(events[1].old, Some(0.9));
        assert_eq!(events[1].value, 0.4);
        assert_eq!(events[1].generation, 6);

        drop(events);
        store.unlisten(listener.clone()).unwrap();
        store.bump(node, "gain", 0.7);
        assert_eq!(seen.borrow().len(), 2);
        assert!(store.unlisten(listener).is_err());
    }

    #[test]
    fn control_store_applies_generation_tie_break() {
        let mut store = ControlValueStore::new();
        let node = ObjectId::new(1);
        assert_eq!(
            store.set(node, "gain", 1.0, 5),
            SetOutcome::Applied { old: None }
        );
        assert_eq!(store.set(node, "gain", 0.2, 3), SetOutcome::Stale);
        assert_eq!(store.value(node, "gain"), 1.0);
        assert_eq!(store.bump(node, "gain", 0.5), 6);
    }
}
