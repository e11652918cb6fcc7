//! The persisted record format.
//!
//! An object serializes to a JSON map carrying its `"__class__"` tag, its
//! id, and every set property; owned children nest, weak references flatten
//! to `"ref:<id>"` strings. Loading happens in two passes: pass one builds
//! the objects, pass two resolves every reference against the finished
//! arena and fails the whole load on the first dangling id.

use serde_json::{json, Map};

use ostinato_types::error::CorruptionError;
use ostinato_types::schema::PropertyKind;
use ostinato_types::{ObjectId, Value};

use super::ObjectArena;

const CLASS_TAG: &str = "__class__";
const ID_FIELD: &str = "id";

/// Serialize the subtree rooted at `id`.
pub fn serialize_object(arena: &ObjectArena, id: ObjectId) -> Result<serde_json::Value, CorruptionError> {
    let object = arena
        .get(id)
        .map_err(|_| CorruptionError::DanglingRef(id))?;
    let class = object.class();
    let mut record = Map::new();
    record.insert(CLASS_TAG.to_owned(), json!(class.name));
    record.insert(ID_FIELD.to_owned(), json!(id.get()));
    for desc in arena.registry().all_properties(class) {
        match &desc.kind {
            PropertyKind::Scalar { .. } => {
                let value = arena
                    .get_scalar(id, desc.name)
                    .map_err(|err| CorruptionError::BadRecord(err.to_string()))?;
                // Unset slots are omitted, not serialized as null.
                if let Some(value) = value {
                    record.insert(desc.name.to_owned(), value.to_record());
                }
            }
            PropertyKind::List { .. } => {
                let items = arena
                    .list(id, desc.name)
                    .map_err(|err| CorruptionError::BadRecord(err.to_string()))?;
                let rendered: Vec<serde_json::Value> = items.iter().map(Value::to_record).collect();
                record.insert(desc.name.to_owned(), json!(rendered));
            }
            PropertyKind::Child { .. } => {
                let child = arena
                    .child(id, desc.name)
                    .map_err(|err| CorruptionError::BadRecord(err.to_string()))?;
                if let Some(child) = child {
                    record.insert(desc.name.to_owned(), serialize_object(arena, child)?);
                }
            }
            PropertyKind::ChildList { .. } => {
                let children = arena
                    .children(id, desc.name)
                    .map_err(|err| CorruptionError::BadRecord(err.to_string()))?;
                let mut rendered = Vec::with_capacity(children.len());
                for child in children {
                    rendered.push(serialize_object(arena, *child)?);
                }
                record.insert(desc.name.to_owned(), json!(rendered));
            }
        }
    }
    Ok(serde_json::Value::Object(record))
}

/// Pass one: rebuild the subtree described by `record` into `arena`.
/// References are stored as-is; call [`init_references`] once the whole
/// tree is in place.
pub fn deserialize_object(
    arena: &mut ObjectArena,
    record: &serde_json::Value,
) -> Result<ObjectId, CorruptionError> {
    let map = record
        .as_object()
        .ok_or_else(|| CorruptionError::BadRecord("record is not a map".into()))?;
    let class_name = map
        .get(CLASS_TAG)
        .and_then(|v| v.as_str())
        .ok_or(CorruptionError::MissingField {
            class: "<unknown>".into(),
            field: CLASS_TAG,
        })?;
    let class = arena
        .registry()
        .get(class_name)
        .ok_or_else(|| CorruptionError::UnknownClass(class_name.to_string()))?;
    let id = map
        .get(ID_FIELD)
        .and_then(|v| v.as_u64())
        .map(ObjectId::new)
        .ok_or(CorruptionError::MissingField {
            class: class_name.to_string(),
            field: ID_FIELD,
        })?;
    arena
        .create_with_id(class_name, id)
        .map_err(|err| CorruptionError::BadRecord(err.to_string()))?;

    for desc in arena.registry().all_properties(class) {
        let Some(raw) = map.get(desc.name) else {
            // Omitted fields keep their schema defaults.
            continue;
        };
        match &desc.kind {
            PropertyKind::Scalar { kind, .. } => {
                let value = Value::from_record(*kind, raw).ok_or_else(|| {
                    CorruptionError::BadRecord(format!(
                        "bad value for {class_name}.{}: {raw}",
                        desc.name
                    ))
                })?;
                arena
                    .set_scalar(id, desc.name, Some(value))
                    .map_err(|err| CorruptionError::BadRecord(err.to_string()))?;
            }
            PropertyKind::List { kind } => {
                let items = raw.as_array().ok_or_else(|| {
                    CorruptionError::BadRecord(format!(
                        "{class_name}.{} is not an array",
                        desc.name
                    ))
                })?;
                for (index, item) in items.iter().enumerate() {
                    let value = Value::from_record(*kind, item).ok_or_else(|| {
                        CorruptionError::BadRecord(format!(
                            "bad value in {class_name}.{}[{index}]: {item}",
                            desc.name
                        ))
                    })?;
                    arena
                        .list_insert(id, desc.name, index, value)
                        .map_err(|err| CorruptionError::BadRecord(err.to_string()))?;
                }
            }
            PropertyKind::Child { .. } => {
                let child = deserialize_object(arena, raw)?;
                arena
                    .set_child(id, desc.name, Some(child))
                    .map_err(|err| CorruptionError::BadRecord(err.to_string()))?;
            }
            PropertyKind::ChildList { .. } => {
                let items = raw.as_array().ok_or_else(|| {
                    CorruptionError::BadRecord(format!(
                        "{class_name}.{} is not an array",
                        desc.name
                    ))
                })?;
                for item in items {
                    let child = deserialize_object(arena, item)?;
                    arena
                        .child_push(id, desc.name, child)
                        .map_err(|err| CorruptionError::BadRecord(err.to_string()))?;
                }
            }
        }
    }
    Ok(id)
}

/// Pass two: walk the subtree under `root` and verify every stored
/// reference points at a live object.
pub fn init_references(arena: &ObjectArena, root: ObjectId) -> Result<(), CorruptionError> {
    let ids = arena
        .subtree(root)
        .map_err(|err| CorruptionError::BadRecord(err.to_string()))?;
    for id in ids {
        let class = match arena.class_of(id) {
            Ok(class) => class,
            Err(err) => return Err(CorruptionError::BadRecord(err.to_string())),
        };
        for desc in arena.registry().all_properties(class) {
            if let PropertyKind::Scalar { .. } = desc.kind {
                let value = arena
                    .get_scalar(id, desc.name)
                    .map_err(|err| CorruptionError::BadRecord(err.to_string()))?;
                if let Some(Value::Ref(target)) = value {
                    if !arena.contains(*target) {
                        return Err(CorruptionError::DanglingRef(*target));
                    }
                }
            }
        }
    }
    Ok(())
}
