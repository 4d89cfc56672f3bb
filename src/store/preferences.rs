//! Small persisted key-value store for user preferences and app state.
//!
//! Values are kept in memory and written through to a single JSON object on
//! every edit. An edit holds the lock across both the change and the write.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::Value;

use crate::errors::AppError;

pub type PreferenceMap = BTreeMap<String, Value>;

#[derive(Debug)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
    values: Mutex<PreferenceMap>,
}

impl PreferenceStore {
    /// Open the store at `path`, starting empty if the file is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read(&path) {
            Ok(content) => serde_json::from_slice(&content).unwrap_or_else(|e| {
                tracing::warn!(
                    "Preference file {} is unreadable, starting empty: {}",
                    path.display(),
                    e
                );
                PreferenceMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PreferenceMap::new(),
            Err(e) => {
                tracing::warn!(
                    "Failed to read preference file {}, starting empty: {}",
                    path.display(),
                    e
                );
                PreferenceMap::new()
            }
        };
        Self {
            path: Some(path),
            values: Mutex::new(values),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(PreferenceMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .ok()
            .and_then(|values| values.get(key).cloned())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
    }

    /// String value of `key`. Numbers are rendered as strings so that
    /// hand-edited files holding `5` instead of `"5"` still read back.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Apply `change` to the stored values and persist the result.
    ///
    /// Returns whether anything changed. Nothing is written when `change`
    /// leaves the values untouched. The file write blocks, so async callers
    /// run edits on the blocking pool.
    pub fn edit<F>(&self, change: F) -> Result<bool, AppError>
    where
        F: FnOnce(&mut PreferenceMap),
    {
        let mut values = self
            .values
            .lock()
            .map_err(|_| AppError::InternalError("Preference store lock poisoned".to_string()))?;

        let mut updated = values.clone();
        change(&mut updated);
        if updated == *values {
            return Ok(false);
        }

        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_vec_pretty(&updated)?;
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, content)?;
            fs::rename(&tmp, path)?;
        }
        *values = updated;
        Ok(true)
    }
}
