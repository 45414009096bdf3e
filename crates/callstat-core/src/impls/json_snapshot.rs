//! JsonFileSnapshotStore - the cache snapshot as a JSON file.
//!
//! Writes land in a sibling `.tmp` file that is renamed over the target, so a crash
//! mid-write leaves the previous snapshot intact.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::ports::{Snapshot, SnapshotStore, StoreError};

pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Snapshot::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(snapshot)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, bytes).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CallRecord, PhoneStats};
    use crate::ports::CacheEntry;
    use chrono::DateTime;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileSnapshotStore::new(dir.path().join("cache.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_keeps_entries_and_sentinels() {
        let dir = tempdir().unwrap();
        let store = JsonFileSnapshotStore::new(dir.path().join("nested").join("cache.json"));
        let stored_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let mut stats = PhoneStats::new();
        stats.record(&CallRecord {
            phone: 1,
            start_ms: 0,
            end_ms: 12_500,
        });
        let mut snapshot = Snapshot::new();
        snapshot.insert(1, CacheEntry { data: stats, stored_at });
        snapshot.insert(
            2,
            CacheEntry {
                data: PhoneStats::new(),
                stored_at,
            },
        );

        store.save(&snapshot).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, snapshot);
        assert_eq!(loaded[&2].data.min_price, f64::INFINITY);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_encoding_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = JsonFileSnapshotStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Encoding(_)));
    }
}
