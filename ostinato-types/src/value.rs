//! Typed property values.
//!
//! Every scalar slot in the object graph holds a `Value`; writes are
//! type-checked against the declared `ValueKind` before anything mutates.

use serde::{Deserialize, Serialize};

use crate::error::ValueError;
use crate::ObjectId;

/// Prefix used when a weak reference is written to the persisted record.
const REF_PREFIX: &str = "ref:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Float(f64),
    Int(i64),
    Bool(bool),
    Str(String),
    /// Weak reference to another object, stored by id and resolved against
    /// the whole-tree index after deserialization.
    Ref(ObjectId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Float,
    Int,
    Bool,
    Str,
    Ref,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Float => "float",
            ValueKind::Int => "int",
            ValueKind::Bool => "bool",
            ValueKind::Str => "str",
            ValueKind::Ref => "ref",
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Float(_) => ValueKind::Float,
            Value::Int(_) => ValueKind::Int,
            Value::Bool(_) => ValueKind::Bool,
            Value::Str(_) => ValueKind::Str,
            Value::Ref(_) => ValueKind::Ref,
        }
    }

    /// Check this value against a declared kind.
    pub fn check_kind(&self, property: &str, expected: ValueKind) -> Result<(), ValueError> {
        if self.kind() == expected {
            Ok(())
        } else {
            Err(ValueError::WrongType {
                property: property.to_string(),
                expected,
                got: self.kind(),
            })
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<ObjectId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Convert to the persisted record representation. Refs become the
    /// symbolic `"ref:<id>"` string so graphs serialize without cycles.
    pub fn to_record(&self) -> serde_json::Value {
        match self {
            Value::Float(v) => serde_json::json!(v),
            Value::Int(v) => serde_json::json!(v),
            Value::Bool(v) => serde_json::json!(v),
            Value::Str(v) => serde_json::json!(v),
            Value::Ref(id) => serde_json::json!(format!("{}{}", REF_PREFIX, id.get())),
        }
    }

    /// Parse a record value into a `Value` of the declared kind.
    /// Returns `None` when the JSON shape does not match the declaration.
    pub fn from_record(kind: ValueKind, record: &serde_json::Value) -> Option<Value> {
        match kind {
            ValueKind::Float => record.as_f64().map(Value::Float),
            ValueKind::Int => record.as_i64().map(Value::Int),
            ValueKind::Bool => record.as_bool().map(Value::Bool),
            ValueKind::Str => record.as_str().map(|s| Value::Str(s.to_string())),
            ValueKind::Ref => {
                let s = record.as_str()?;
                let raw = s.strip_prefix(REF_PREFIX)?;
                raw.parse::<u64>().ok().map(|id| Value::Ref(ObjectId::new(id)))
            }
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
            Value::Ref(id) => write!(f, "ref:{}", id),
        }
    }
}
