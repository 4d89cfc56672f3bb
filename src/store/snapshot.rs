//! On-disk copy of the most recent station snapshot.
//!
//! The whole snapshot is written as one JSON document, replacing the previous
//! one. Reads and writes hold a single lock for their full duration, and writes
//! go through a temporary file and a rename so a reader never sees half a file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::errors::AppError;
use crate::store::models::StationSnapshot;

#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored snapshot.
    pub fn save(&self, snapshot: &StationSnapshot) -> Result<(), AppError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AppError::InternalError("Snapshot store lock poisoned".to_string()))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_vec(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;

        tracing::debug!(
            "Stored {} stations to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Read the stored snapshot, or `None` if nothing has been stored yet.
    pub fn load(&self) -> Result<Option<StationSnapshot>, AppError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AppError::InternalError("Snapshot store lock poisoned".to_string()))?;

        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read(&self.path)?;
        let snapshot: StationSnapshot = serde_json::from_slice(&content)?;
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::fixtures::{snapshot, station};
    use chrono::DateTime;

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("stations.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_preserves_stations() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested").join("stations.json"));

        let mut original = snapshot(vec![
            station(72, 40.767272, -73.993928, 14, 23),
            station(79, 40.719116, -74.006667, 0, 33),
        ]);
        original.timestamp = DateTime::from_timestamp_millis(1_413_765_662_123);
        store.save(&original).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.station_bean_list, original.station_bean_list);
        assert_eq!(loaded.execution_time, original.execution_time);
        assert_eq!(loaded.timestamp, original.timestamp);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("stations.json"));

        store
            .save(&snapshot(vec![station(1, 40.0, -74.0, 1, 1)]))
            .unwrap();
        store
            .save(&snapshot(vec![
                station(2, 40.0, -74.0, 1, 1),
                station(3, 40.0, -74.0, 1, 1),
            ]))
            .unwrap();

        let loaded = store.load().unwrap().unwrap();
        let ids: Vec<i64> = loaded.stations().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_load_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stations.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = SnapshotStore::new(path);
        assert!(matches!(store.load(), Err(AppError::Serialization(_))));
    }
}
