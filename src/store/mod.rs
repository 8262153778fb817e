//! Persistent key-value store.
//!
//! Flat string keys mapping to JSON values, scoped to one installation.
//! There are no transactions: a single [`KeyValueStore::set`] call is the
//! largest unit that lands together.

mod file;

pub use file::JsonFileStore;

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

/// Keys written by the router.
pub mod keys {
    pub const EDITOR_CONTENT: &str = "editor-content";
    pub const EDITOR_BACKUP: &str = "editor-backup";
    pub const LAST_SAVED: &str = "last-saved";
    pub const CURRENT_CELL_SELECTION: &str = "current-cell-selection";
    pub const LAST_CELL_UPDATE: &str = "last-cell-update";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store file {0} does not hold a JSON object")]
    NotAnObject(String),
}

pub type Items = Map<String, Value>;

pub trait KeyValueStore: Send {
    /// Fetch the requested keys. Missing keys are simply absent from the result.
    ///
    /// # Errors
    /// Returns an error if the backing medium cannot be read.
    fn get(&self, keys: &[&str]) -> Result<Items, StoreError>;

    /// Write every item in one operation, last write wins per key.
    ///
    /// # Errors
    /// Returns an error if the backing medium cannot be written.
    fn set(&mut self, items: Items) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> Result<Items, StoreError> {
        Ok(pick(&self.entries, keys))
    }

    fn set(&mut self, items: Items) -> Result<(), StoreError> {
        self.entries.extend(items);
        Ok(())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, keys: &[&str]) -> Result<Items, StoreError> {
        (**self).get(keys)
    }

    fn set(&mut self, items: Items) -> Result<(), StoreError> {
        (**self).set(items)
    }
}

fn pick(entries: &BTreeMap<String, Value>, keys: &[&str]) -> Items {
    keys.iter()
        .filter_map(|key| {
            entries
                .get(*key)
                .map(|value| ((*key).to_string(), value.clone()))
        })
        .collect()
}

/// Read a string slot, treating absence, `null` and empty strings alike.
pub fn string_or_empty(items: &Items, key: &str) -> String {
    items
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Read a millisecond timestamp slot.
pub fn timestamp(items: &Items, key: &str) -> Option<u64> {
    items.get(key).and_then(Value::as_u64).filter(|ts| *ts > 0)
}
