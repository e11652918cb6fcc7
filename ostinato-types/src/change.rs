//! Structured change events.
//!
//! Every property or list mutation produces exactly one `Change`, in the
//! same call that performed it. Observers get the operands (old/new value,
//! index) so they can update incrementally instead of re-diffing the graph.

use crate::value::Value;
use crate::ObjectId;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A scalar property changed value. `old` is `None` when the property
    /// was previously unset.
    Scalar {
        object: ObjectId,
        property: &'static str,
        old: Option<Value>,
        new: Option<Value>,
    },
    ListInsert {
        object: ObjectId,
        property: &'static str,
        index: usize,
        value: Value,
    },
    ListDelete {
        object: ObjectId,
        property: &'static str,
        index: usize,
        value: Value,
    },
    ListClear {
        object: ObjectId,
        property: &'static str,
        old: Vec<Value>,
    },
    /// An object-owning slot was reassigned.
    ChildSet {
        object: ObjectId,
        property: &'static str,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
    },
    ChildInsert {
        object: ObjectId,
        property: &'static str,
        index: usize,
        child: ObjectId,
    },
    ChildDelete {
        object: ObjectId,
        property: &'static str,
        index: usize,
        child: ObjectId,
    },
}

impl Change {
    /// The object whose property changed.
    pub fn object(&self) -> ObjectId {
        match self {
            Change::Scalar { object, .. }
            | Change::ListInsert { object, .. }
            | Change::ListDelete { object, .. }
            | Change::ListClear { object, .. }
            | Change::ChildSet { object, .. }
            | Change::ChildInsert { object, .. }
            | Change::ChildDelete { object, .. } => *object,
        }
    }

    /// The property that changed.
    pub fn property(&self) -> &'static str {
        match self {
            Change::Scalar { property, .. }
            | Change::ListInsert { property, .. }
            | Change::ListDelete { property, .. }
            | Change::ListClear { property, .. }
            | Change::ChildSet { property, .. }
            | Change::ChildInsert { property, .. }
            | Change::ChildDelete { property, .. } => property,
        }
    }
}
