use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::{Items, KeyValueStore, StoreError, pick};

/// A store persisted as a single JSON object on disk.
///
/// Each `set` rewrites the whole file through a temp file and a rename, so
/// items written together are never split by a crash.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: std::collections::BTreeMap<String, Value>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// # Errors
    /// Returns an error if an existing file cannot be read or is not a JSON object.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| io_err(&path, source))?;
            if raw.trim().is_empty() {
                std::collections::BTreeMap::new()
            } else {
                match serde_json::from_str::<Value>(&raw)? {
                    Value::Object(map) => map.into_iter().collect(),
                    _ => return Err(StoreError::NotAnObject(path.display().to_string())),
                }
            }
        } else {
            std::collections::BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;
        }
        let object: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let body = serde_json::to_string_pretty(&Value::Object(object))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|source| io_err(&tmp, source))?;
        fs::rename(&tmp, &self.path).map_err(|source| io_err(&self.path, source))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, keys: &[&str]) -> Result<Items, StoreError> {
        Ok(pick(&self.entries, keys))
    }

    fn set(&mut self, items: Items) -> Result<(), StoreError> {
        self.entries.extend(items);
        self.flush()
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}
