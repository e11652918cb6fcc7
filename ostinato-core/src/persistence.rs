//! SQLite persistence for projects.
//!
//! One database per project: a schema version gate, the serialized object
//! graph as a single record, and the control values with their
//! generations. Saves run in one transaction so a crash mid-write leaves
//! the previous state intact.

use std::path::Path;

use rusqlite::Connection;
use thiserror::Error;

use ostinato_types::error::CorruptionError;
use ostinato_types::ObjectId;

use crate::model::classes::builtin_registry;
use crate::model::record::{deserialize_object, init_references, serialize_object};
use crate::model::ObjectArena;
use crate::project::{ControlValueStore, Project};

/// Bump on any incompatible change to the tables or the record format.
const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("record error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Corrupt(#[from] CorruptionError),
    #[error("database holds no project")]
    NoProject,
}

fn open(path: &Path) -> Result<Connection, StorageError> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS meta (
             schema_version INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS project (
             id INTEGER PRIMARY KEY CHECK (id = 1),
             record TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS control_values (
             node_id INTEGER NOT NULL,
             name TEXT NOT NULL,
             value REAL NOT NULL,
             generation INTEGER NOT NULL,
             PRIMARY KEY (node_id, name)
         );",
    )?;
    Ok(())
}

pub fn save_project(path: &Path, project: &mut Project) -> Result<(), StorageError> {
    let record = serialize_object(project.arena(), project.root())?;
    let rendered = serde_json::to_string(&record)?;

    let mut conn = open(path)?;
    init_schema(&conn)?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM meta", [])?;
    tx.execute(
        "INSERT INTO meta (schema_version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;
    tx.execute(
        "INSERT OR REPLACE INTO project (id, record) VALUES (1, ?1)",
        [&rendered],
    )?;
    tx.execute("DELETE FROM control_values", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO control_values (node_id, name, value, generation)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let store = project.control_values();
        for node in store.nodes() {
            // Maps outlive their node in memory (undo can revive it);
            // only values for nodes still in the graph are persisted.
            if !project.arena().contains(node) {
                continue;
            }
            let Some(map) = store.map(node) else { continue };
            for name in map.names() {
                stmt.execute(rusqlite::params![
                    node.get() as i64,
                    name,
                    map.value(name),
                    map.generation(name) as i64,
                ])?;
            }
        }
    }
    tx.commit()?;

    project.mark_clean();
    log::info!(target: "storage", "project saved to {}", path.display());
    Ok(())
}

pub fn load_project(path: &Path, undo_depth: usize) -> Result<Project, StorageError> {
    let conn = open(path)?;

    let version: i64 = conn
        .query_row("SELECT schema_version FROM meta", [], |row| row.get(0))
        .map_err(|_| StorageError::NoProject)?;
    if version > SCHEMA_VERSION {
        return Err(CorruptionError::VersionTooNew {
            found: version,
            supported: SCHEMA_VERSION,
        }
        .into());
    }

    let rendered: String = conn
        .query_row("SELECT record FROM project WHERE id = 1", [], |row| {
            row.get(0)
        })
        .map_err(|_| StorageError::NoProject)?;
    let record: serde_json::Value = serde_json::from_str(&rendered)?;

    let mut arena = ObjectArena::new(std::sync::Arc::new(builtin_registry()));
    let root = deserialize_object(&mut arena, &record)?;
    init_references(&arena, root)?;

    let mut store = ControlValueStore::new();
    let mut stmt = conn.prepare("SELECT node_id, name, value, generation FROM control_values")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;
    for row in rows {
        let (node_id, name, value, generation) = row?;
        store.set(
            ObjectId::new(node_id as u64),
            &name,
            value,
            generation as u64,
        );
    }
    drop(stmt);

    log::info!(target: "storage", "project loaded from {}", path.display());
    Ok(Project::from_parts(arena, root, store, undo_depth))
}
