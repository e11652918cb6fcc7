//! Change notification.
//!
//! A `CallbackRegistry` is the primitive: ordered listeners behind opaque
//! handles. The `ChangeBus` layers addressing on top, routing each change
//! to the listeners of its (object, property) pair and to whole-graph
//! listeners, in registration order within each group.

use std::collections::HashMap;

use ostinato_types::error::ListenerError;
use ostinato_types::{Change, ObjectId};

/// Opaque subscription handle. Ids are unique per registry for its whole
/// lifetime, so a stale handle can never detach somebody else's listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn raw(self) -> u64 {
        self.0
    }
}

type Callback<T> = Box<dyn FnMut(&T)>;

pub struct CallbackRegistry<T> {
    listeners: Vec<(ListenerId, Callback<T>)>,
    next_id: u64,
}

impl<T> CallbackRegistry<T> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    pub fn add(&mut self, callback: impl FnMut(&T) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(callback)));
        id
    }

    /// Detach a listener. Removing twice is reported, not ignored.
    pub fn remove(&mut self, id: ListenerId) -> Result<(), ListenerError> {
        match self.listeners.iter().position(|(lid, _)| *lid == id) {
            Some(pos) => {
                self.listeners.remove(pos);
                Ok(())
            }
            None => Err(ListenerError::NotRegistered(id.0)),
        }
    }

    pub fn emit(&mut self, event: &T) {
        for (_, callback) in self.listeners.iter_mut() {
            callback(event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<T> Default for CallbackRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes committed changes to property-level and graph-level listeners.
pub struct ChangeBus {
    by_property: HashMap<(ObjectId, &'static str), CallbackRegistry<Change>>,
    graph: CallbackRegistry<Change>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusListener {
    Property(ObjectId, &'static str, ListenerId),
    Graph(ListenerId),
}

impl ChangeBus {
    pub fn new() -> Self {
        Self {
            by_property: HashMap::new(),
            graph: CallbackRegistry::new(),
        }
    }

    /// Listen for changes to one property of one object.
    pub fn listen_property(
        &mut self,
        object: ObjectId,
        property: &'static str,
        callback: impl FnMut(&Change) + 'static,
    ) -> BusListener {
        let id = self
            .by_property
            .entry((object, property))
            .or_default()
            .add(callback);
        BusListener::Property(object, property, id)
    }

    /// Listen for every committed change in the graph.
    pub fn listen_graph(&mut self, callback: impl FnMut(&Change) + 'static) -> BusListener {
        BusListener::Graph(self.graph.add(callback))
    }

    pub fn unlisten(&mut self, listener: BusListener) -> Result<(), ListenerError> {
        match listener {
            BusListener::Property(object, property, id) => {
                let key = (object, property);
                let registry = self
                    .by_property
                    .get_mut(&key)
                    .ok_or(ListenerError::NotRegistered(id.raw()))?;
                registry.remove(id)?;
                if registry.is_empty() {
                    self.by_property.remove(&key);
                }
                Ok(())
            }
            BusListener::Graph(id) => self.graph.remove(id),
        }
    }

    pub fn emit(&mut self, change: &Change) {
        let key = (change.object(), change.property());
        if let Some(registry) = self.by_property.get_mut(&key) {
            registry.emit(change);
        }
        self.graph.emit(change);
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostinato_types::Value;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn scalar_change(object: ObjectId) -> Change {
        Change::Scalar {
            object,
            property: "name",
            old: None,
            new: Some(Value::Str("x".into())),
        }
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let mut registry = CallbackRegistry::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (Rc::clone(&order), Rc::clone(&order));
        registry.add(move |_: &u32| a.borrow_mut().push("first"));
        registry.add(move |_: &u32| b.borrow_mut().push("second"));
        registry.emit(&0);
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn removed_listener_stops_firing_and_double_remove_errors() {
        let mut registry = CallbackRegistry::new();
        let hits = Rc::new(RefCell::new(0));
        let hits2 = Rc::clone(&hits);
        let id = registry.add(move |_: &u32| *hits2.borrow_mut() += 1);
        registry.emit(&0);
        registry.remove(id).unwrap();
        registry.emit(&0);
        assert_eq!(*hits.borrow(), 1);
        assert_eq!(registry.remove(id), Err(ListenerError::NotRegistered(0)));
    }

    #[test]
    fn property_listeners_only_see_their_own_slot() {
        let mut bus = ChangeBus::new();
        let hits = Rc::new(RefCell::new(0));
        let hits2 = Rc::clone(&hits);
        bus.listen_property(ObjectId::new(1), "name", move |_| {
            *hits2.borrow_mut() += 1
        });
        bus.emit(&scalar_change(ObjectId::new(1)));
        bus.emit(&scalar_change(ObjectId::new(2)));
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn graph_listeners_see_everything() {
        let mut bus = ChangeBus::new();
        let hits = Rc::new(RefCell::new(0));
        let hits2 = Rc::clone(&hits);
        bus.listen_graph(move |_| *hits2.borrow_mut() += 1);
        bus.emit(&scalar_change(ObjectId::new(1)));
        bus.emit(&scalar_change(ObjectId::new(2)));
        assert_eq!(*hits.borrow(), 2);
    }

    #[test]
    fn bus_unlisten_is_symmetric() {
        let mut bus = ChangeBus::new();
        let listener = bus.listen_property(ObjectId::new(1), "name", |_| {});
        bus.unlisten(listener).unwrap();
        assert!(bus.unlisten(listener).is_err());
    }
}
