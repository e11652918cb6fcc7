//! Static property schemas and the class registry.
//!
//! Entity types declare their fields as static descriptor tables; generic
//! serialization and change dispatch consume an instance plus its class's
//! schema. The registry maps `"__class__"` tags back to classes so a root
//! type can reconstruct any registered leaf type from a single base field.

use std::collections::HashMap;

use crate::error::ModelError;
use crate::value::{Value, ValueKind};

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    /// Typed scalar slot with optional null-allowance and default.
    Scalar {
        kind: ValueKind,
        nullable: bool,
        default: Option<Value>,
    },
    /// Ordered sequence of scalars of one kind.
    List { kind: ValueKind },
    /// Owned child object slot (single-owner tree).
    Child { class: &'static str },
    /// Ordered list of owned child objects.
    ChildList { class: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDesc {
    pub name: &'static str,
    pub kind: PropertyKind,
}

impl PropertyDesc {
    pub const fn scalar(name: &'static str, kind: ValueKind, default: Option<Value>) -> Self {
        PropertyDesc {
            name,
            kind: PropertyKind::Scalar { kind, nullable: false, default },
        }
    }

    pub const fn nullable(name: &'static str, kind: ValueKind) -> Self {
        PropertyDesc {
            name,
            kind: PropertyKind::Scalar { kind, nullable: true, default: None },
        }
    }

    pub const fn list(name: &'static str, kind: ValueKind) -> Self {
        PropertyDesc { name, kind: PropertyKind::List { kind } }
    }

    pub const fn child(name: &'static str, class: &'static str) -> Self {
        PropertyDesc { name, kind: PropertyKind::Child { class } }
    }

    pub const fn child_list(name: &'static str, class: &'static str) -> Self {
        PropertyDesc { name, kind: PropertyKind::ChildList { class } }
    }
}

/// A class in the model: a name, an optional parent, and the fields it
/// declares beyond the parent's.
#[derive(Debug)]
pub struct ObjectClass {
    pub name: &'static str,
    pub parent: Option<&'static str>,
    pub properties: &'static [PropertyDesc],
}

/// Runtime registry of classes, keyed by their `"__class__"` tag.
///
/// Built once at startup. Registration order does not matter, but a parent
/// must be registered before subclass checks against it are meaningful.
pub struct ClassRegistry {
    classes: HashMap<&'static str, &'static ObjectClass>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self { classes: HashMap::new() }
    }

    /// Register a class. Registering the same name twice is an error, not
    /// a replacement.
    pub fn register(&mut self, class: &'static ObjectClass) -> Result<(), ModelError> {
        if self.classes.contains_key(class.name) {
            return Err(ModelError::DuplicateClass(class.name));
        }
        self.classes.insert(class.name, class);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&'static ObjectClass> {
        self.classes.get(name).copied()
    }

    /// Whether `class` is `ancestor` or derives from it.
    pub fn is_subclass(&self, class: &str, ancestor: &str) -> bool {
        let mut current = self.get(class);
        while let Some(c) = current {
            if c.name == ancestor {
                return true;
            }
            current = c.parent.and_then(|p| self.get(p));
        }
        false
    }

    /// All properties of a class, ancestors first, each exactly once.
    pub fn all_properties(&self, class: &'static ObjectClass) -> Vec<&'static PropertyDesc> {
        let mut chain = Vec::new();
        let mut current = Some(class);
        while let Some(c) = current {
            chain.push(c);
            current = c.parent.and_then(|p| self.get(p));
        }
        let mut out = Vec::new();
        for c in chain.iter().rev() {
            for desc in c.properties {
                out.push(desc);
            }
        }
        out
    }

    /// Look up one property descriptor along the inheritance chain.
    pub fn property(
        &self,
        class: &'static ObjectClass,
        name: &str,
    ) -> Option<&'static PropertyDesc> {
        let mut current = Some(class);
        while let Some(c) = current {
            if let Some(desc) = c.properties.iter().find(|d| d.name == name) {
                return Some(desc);
            }
            current = c.parent.and_then(|p| self.get(p));
        }
        None
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static BASE: ObjectClass = ObjectClass {
        name: "base",
        parent: None,
        properties: &[PropertyDesc::scalar("name", ValueKind::Str, Some(Value::Str(String::new())))],
    };

    static LEAF: ObjectClass = ObjectClass {
        name: "leaf",
        parent: Some("base"),
        properties: &[PropertyDesc::scalar("gain", ValueKind::Float, Some(Value::Float(1.0)))],
    };

    fn registry() -> ClassRegistry {
        let mut r = ClassRegistry::new();
        r.register(&BASE).unwrap();
        r.register(&LEAF).unwrap();
        r
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let mut r = registry();
        assert_eq!(r.register(&BASE), Err(ModelError::DuplicateClass("base")));
    }

    #[test]
    fn subclass_follows_parent_chain() {
        let r = registry();
        assert!(r.is_subclass("leaf", "base"));
        assert!(r.is_subclass("leaf", "leaf"));
        assert!(!r.is_subclass("base", "leaf"));
        assert!(!r.is_subclass("missing", "base"));
    }

    #[test]
    fn all_properties_includes_ancestors_once() {
        let r = registry();
        let props: Vec<&str> = r
            .all_properties(r.get("leaf").unwrap())
            .iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(props, vec!["name", "gain"]);
    }

    #[test]
    fn property_lookup_walks_chain() {
        let r = registry();
        let leaf = r.get("leaf").unwrap();
        assert!(r.property(leaf, "name").is_some());
        assert!(r.property(leaf, "gain").is_some());
        assert!(r.property(leaf, "missing").is_none());
    }
}
