//! The object graph: a flat arena of schema-typed objects forming a
//! single-owner tree, plus weak references across it.
//!
//! Every mutation goes through the arena and yields the `Change` events the
//! transaction layer buffers and dispatches on commit. The arena itself
//! never notifies anyone.

pub mod classes;
pub mod record;

use std::collections::HashMap;
use std::sync::Arc;

use ostinato_types::error::{ModelError, ValueError};
use ostinato_types::schema::{ClassRegistry, ObjectClass, PropertyKind};
use ostinato_types::{Change, ObjectId, Value};

/// One property slot. The variant is fixed by the schema at creation time;
/// writes never change it.
#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Scalar(Option<Value>),
    List(Vec<Value>),
    Child(Option<ObjectId>),
    ChildList(Vec<ObjectId>),
}

#[derive(Debug, Clone)]
pub struct Object {
    id: ObjectId,
    class: &'static ObjectClass,
    /// Owner and the slot name we sit in, `None` for roots and orphans.
    parent: Option<(ObjectId, &'static str)>,
    slots: HashMap<&'static str, Slot>,
}

impl Object {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn class(&self) -> &'static ObjectClass {
        self.class
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent.map(|(id, _)| id)
    }

    /// Owner and the slot this object sits in.
    pub fn owner_slot(&self) -> Option<(ObjectId, &'static str)> {
        self.parent
    }
}

/// Flat id-indexed store for the whole project tree.
#[derive(Clone)]
pub struct ObjectArena {
    registry: Arc<ClassRegistry>,
    objects: HashMap<ObjectId, Object>,
    next_id: u64,
}

impl ObjectArena {
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self {
            registry,
            objects: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    pub fn get(&self, id: ObjectId) -> Result<&Object, ModelError> {
        self.objects.get(&id).ok_or(ModelError::NoSuchObject(id))
    }

    pub fn class_of(&self, id: ObjectId) -> Result<&'static ObjectClass, ModelError> {
        Ok(self.get(id)?.class)
    }

    /// Whether the object is `ancestor` or a subclass of it.
    pub fn is_a(&self, id: ObjectId, ancestor: &str) -> Result<bool, ModelError> {
        let class = self.class_of(id)?;
        Ok(self.registry.is_subclass(class.name, ancestor))
    }

    /// Allocate a fresh object of `class_name` with all slots at their
    /// declared defaults. The object starts out unowned.
    pub fn create(&mut self, class_name: &str) -> Result<ObjectId, ModelError> {
        let id = ObjectId::new(self.next_id);
        self.next_id += 1;
        self.create_with_id(class_name, id)?;
        Ok(id)
    }

    /// Insert an object under an explicit id, used when reloading persisted
    /// records. Keeps the allocator ahead of every id seen.
    pub fn create_with_id(&mut self, class_name: &str, id: ObjectId) -> Result<(), ModelError> {
        let class = self
            .registry
            .get(class_name)
            .ok_or_else(|| ModelError::UnknownClass(class_name.to_string()))?;
        let mut slots = HashMap::new();
        for desc in self.registry.all_properties(class) {
            let slot = match &desc.kind {
                PropertyKind::Scalar { default, .. } => Slot::Scalar(default.clone()),
                PropertyKind::List { .. } => Slot::List(Vec::new()),
                PropertyKind::Child { .. } => Slot::Child(None),
                PropertyKind::ChildList { .. } => Slot::ChildList(Vec::new()),
            };
            slots.insert(desc.name, slot);
        }
        self.objects.insert(
            id,
            Object {
                id,
                class,
                parent: None,
                slots,
            },
        );
        if id.get() >= self.next_id {
            self.next_id = id.get() + 1;
        }
        Ok(())
    }

    fn desc(
        &self,
        id: ObjectId,
        property: &str,
    ) -> Result<&'static ostinato_types::PropertyDesc, ModelError> {
        let class = self.class_of(id)?;
        self.registry
            .property(class, property)
            .ok_or_else(|| ModelError::NoSuchProperty {
                class: class.name,
                property: property.to_string(),
            })
    }

    // ---- scalar slots ----

    pub fn get_scalar(&self, id: ObjectId, property: &str) -> Result<Option<&Value>, ModelError> {
        let desc = self.desc(id, property)?;
        match self.get(id)?.slots.get(desc.name) {
            Some(Slot::Scalar(v)) => Ok(v.as_ref()),
            _ => Err(ModelError::WrongPropertyKind {
                property: property.to_string(),
                expected: "scalar",
            }),
        }
    }

    /// Write a scalar slot. Returns the change event, or `None` when the
    /// written value equals the stored one.
    pub fn set_scalar(
        &mut self,
        id: ObjectId,
        property: &str,
        value: Option<Value>,
    ) -> Result<Option<Change>, ModelError> {
        let desc = self.desc(id, property)?;
        let (kind, nullable) = match &desc.kind {
            PropertyKind::Scalar { kind, nullable, .. } => (*kind, *nullable),
            _ => {
                return Err(ModelError::WrongPropertyKind {
                    property: property.to_string(),
                    expected: "scalar",
                })
            }
        };
        match &value {
            Some(v) => v.check_kind(property, kind)?,
            None => {
                if !nullable {
                    return Err(ValueError::NotNullable {
                        property: property.to_string(),
                    }
                    .into());
                }
            }
        }
        let object = self
            .objects
            .get_mut(&id)
            .ok_or(ModelError::NoSuchObject(id))?;
        let slot = match object.slots.get_mut(desc.name) {
            Some(Slot::Scalar(slot)) => slot,
            _ => {
                return Err(ModelError::WrongPropertyKind {
                    property: property.to_string(),
                    expected: "scalar",
                })
            }
        };
        if *slot == value {
            return Ok(None);
        }
        let old = std::mem::replace(slot, value.clone());
        Ok(Some(Change::Scalar {
            object: id,
            property: desc.name,
            old,
            new: value,
        }))
    }

    // ---- list slots ----

    pub fn list(&self, id: ObjectId, property: &str) -> Result<&[Value], ModelError> {
        let desc = self.desc(id, property)?;
        match self.get(id)?.slots.get(desc.name) {
            Some(Slot::List(items)) => Ok(items),
            _ => Err(ModelError::WrongPropertyKind {
                property: property.to_string(),
                expected: "list",
            }),
        }
    }

    pub fn list_insert(
        &mut self,
        id: ObjectId,
        property: &str,
        index: usize,
        value: Value,
    ) -> Result<Change, ModelError> {
        let desc = self.desc(id, property)?;
        let kind = match &desc.kind {
            PropertyKind::List { kind } => *kind,
            _ => {
                return Err(ModelError::WrongPropertyKind {
                    property: property.to_string(),
                    expected: "list",
                })
            }
        };
        value.check_kind(property, kind)?;
        let items = self.list_slot_mut(id, desc.name, property)?;
        if index > items.len() {
            return Err(ModelError::IndexOutOfBounds {
                property: property.to_string(),
                index,
                len: items.len(),
            });
        }
        items.insert(index, value.clone());
        Ok(Change::ListInsert {
            object: id,
            property: desc.name,
            index,
            value,
        })
    }

    pub fn list_delete(
        &mut self,
        id: ObjectId,
        property: &str,
        index: usize,
    ) -> Result<Change, ModelError> {
        let desc = self.desc(id, property)?;
        let items = self.list_slot_mut(id, desc.name, property)?;
        if index >= items.len() {
            return Err(ModelError::IndexOutOfBounds {
                property: property.to_string(),
                index,
                len: items.len(),
            });
        }
        let value = items.remove(index);
        Ok(Change::ListDelete {
            object: id,
            property: desc.name,
            index,
            value,
        })
    }

    pub fn list_clear(&mut self, id: ObjectId, property: &str) -> Result<Change, ModelError> {
        let desc = self.desc(id, property)?;
        let items = self.list_slot_mut(id, desc.name, property)?;
        let old = std::mem::take(items);
        Ok(Change::ListClear {
            object: id,
            property: desc.name,
            old,
        })
    }

    fn list_slot_mut(
        &mut self,
        id: ObjectId,
        name: &'static str,
        property: &str,
    ) -> Result<&mut Vec<Value>, ModelError> {
        let object = self
            .objects
            .get_mut(&id)
            .ok_or(ModelError::NoSuchObject(id))?;
        match object.slots.get_mut(name) {
            Some(Slot::List(items)) => Ok(items),
            _ => Err(ModelError::WrongPropertyKind {
                property: property.to_string(),
                expected: "list",
            }),
        }
    }

    // ---- owned children ----

    pub fn child(&self, id: ObjectId, property: &str) -> Result<Option<ObjectId>, ModelError> {
        let desc = self.desc(id, property)?;
        match self.get(id)?.slots.get(desc.name) {
            Some(Slot::Child(child)) => Ok(*child),
            _ => Err(ModelError::WrongPropertyKind {
                property: property.to_string(),
                expected: "child",
            }),
        }
    }

    pub fn children(&self, id: ObjectId, property: &str) -> Result<&[ObjectId], ModelError> {
        let desc = self.desc(id, property)?;
        match self.get(id)?.slots.get(desc.name) {
            Some(Slot::ChildList(children)) => Ok(children),
            _ => Err(ModelError::WrongPropertyKind {
                property: property.to_string(),
                expected: "child list",
            }),
        }
    }

    fn check_attachable(
        &self,
        child: ObjectId,
        expected_class: &'static str,
    ) -> Result<(), ModelError> {
        let obj = self.get(child)?;
        if let Some((owner, _)) = obj.parent {
            return Err(ModelError::AlreadyOwned { child, owner });
        }
        if !self.registry.is_subclass(obj.class.name, expected_class) {
            return Err(ModelError::ClassMismatch {
                child,
                class: obj.class.name,
                expected: expected_class,
            });
        }
        Ok(())
    }

    /// Assign a single-child slot. The previous occupant, if any, becomes
    /// an orphan but stays in the arena.
    pub fn set_child(
        &mut self,
        id: ObjectId,
        property: &str,
        child: Option<ObjectId>,
    ) -> Result<Option<Change>, ModelError> {
        let desc = self.desc(id, property)?;
        let expected = match &desc.kind {
            PropertyKind::Child { class } => *class,
            _ => {
                return Err(ModelError::WrongPropertyKind {
                    property: property.to_string(),
                    expected: "child",
                })
            }
        };
        if let Some(child) = child {
            self.check_attachable(child, expected)?;
        }
        let old = self.child(id, property)?;
        if old == child {
            return Ok(None);
        }
        if let Some(old_id) = old {
            if let Some(obj) = self.objects.get_mut(&old_id) {
                obj.parent = None;
            }
        }
        if let Some(new_id) = child {
            if let Some(obj) = self.objects.get_mut(&new_id) {
                obj.parent = Some((id, desc.name));
            }
        }
        let object = self
            .objects
            .get_mut(&id)
            .ok_or(ModelError::NoSuchObject(id))?;
        if let Some(Slot::Child(slot)) = object.slots.get_mut(desc.name) {
            *slot = child;
        }
        Ok(Some(Change::ChildSet {
            object: id,
            property: desc.name,
            old,
            new: child,
        }))
    }

    pub fn child_insert(
        &mut self,
        id: ObjectId,
        property: &str,
        index: usize,
        child: ObjectId,
    ) -> Result<Change, ModelError> {
        let desc = self.desc(id, property)?;
        let expected = match &desc.kind {
            PropertyKind::ChildList { class } => *class,
            _ => {
                return Err(ModelError::WrongPropertyKind {
                    property: property.to_string(),
                    expected: "child list",
                })
            }
        };
        self.check_attachable(child, expected)?;
        let len = self.children(id, property)?.len();
        if index > len {
            return Err(ModelError::IndexOutOfBounds {
                property: property.to_string(),
                index,
                len,
            });
        }
        if let Some(obj) = self.objects.get_mut(&child) {
            obj.parent = Some((id, desc.name));
        }
        let object = self
            .objects
            .get_mut(&id)
            .ok_or(ModelError::NoSuchObject(id))?;
        if let Some(Slot::ChildList(children)) = object.slots.get_mut(desc.name) {
            children.insert(index, child);
        }
        Ok(Change::ChildInsert {
            object: id,
            property: desc.name,
            index,
            child,
        })
    }

    pub fn child_push(
        &mut self,
        id: ObjectId,
        property: &str,
        child: ObjectId,
    ) -> Result<Change, ModelError> {
        let len = self.children(id, property)?.len();
        self.child_insert(id, property, len, child)
    }

    /// Detach the child at `index`. The child becomes an orphan; callers
    /// that want it gone entirely follow up with `remove_subtree`.
    pub fn child_delete(
        &mut self,
        id: ObjectId,
        property: &str,
        index: usize,
    ) -> Result<Change, ModelError> {
        let desc = self.desc(id, property)?;
        let children = self.children(id, property)?;
        if index >= children.len() {
            return Err(ModelError::IndexOutOfBounds {
                property: property.to_string(),
                index,
                len: children.len(),
            });
        }
        let child = children[index];
        let object = self
            .objects
            .get_mut(&id)
            .ok_or(ModelError::NoSuchObject(id))?;
        if let Some(Slot::ChildList(children)) = object.slots.get_mut(desc.name) {
            children.remove(index);
        }
        if let Some(obj) = self.objects.get_mut(&child) {
            obj.parent = None;
        }
        Ok(Change::ChildDelete {
            object: id,
            property: desc.name,
            index,
            child,
        })
    }

    /// Remove an object and everything it owns, detaching it from its
    /// owner first. Returns every removed id, parent before children.
    pub fn remove_subtree(&mut self, id: ObjectId) -> Result<Vec<ObjectId>, ModelError> {
        if let Some((owner, slot_name)) = self.get(id)?.parent {
            let position = match self.objects.get(&owner).and_then(|o| o.slots.get(slot_name)) {
                Some(Slot::ChildList(children)) => children.iter().position(|c| *c == id),
                Some(Slot::Child(_)) => None,
                _ => None,
            };
            match position {
                Some(index) => {
                    self.child_delete(owner, slot_name, index)?;
                }
                None => {
                    self.set_child(owner, slot_name, None)?;
                }
            }
        }
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(object) = self.objects.remove(&current) else {
                continue;
            };
            removed.push(current);
            for slot in object.slots.values() {
                match slot {
                    Slot::Child(Some(child)) => stack.push(*child),
                    Slot::ChildList(children) => stack.extend(children.iter().copied()),
                    _ => {}
                }
            }
        }
        Ok(removed)
    }

    /// All ids reachable from `root` through ownership, root first.
    pub fn subtree(&self, root: ObjectId) -> Result<Vec<ObjectId>, ModelError> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            let object = self.get(current)?;
            out.push(current);
            for desc in self.registry.all_properties(object.class) {
                match object.slots.get(desc.name) {
                    Some(Slot::Child(Some(child))) => stack.push(*child),
                    Some(Slot::ChildList(children)) => stack.extend(children.iter().copied()),
                    _ => {}
                }
            }
        }
        Ok(out)
    }
}
