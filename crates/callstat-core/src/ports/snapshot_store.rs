//! SnapshotStore port - durable storage behind the stats cache.
//!
//! The cache persists a full snapshot on every write; there is no incremental log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::{Phone, PhoneStats};

/// A cached value and the moment it was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: PhoneStats,
    pub stored_at: DateTime<Utc>,
}

pub type Snapshot = HashMap<Phone, CacheEntry>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("{0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last snapshot. A store that was never written returns an empty one.
    async fn load(&self) -> Result<Snapshot, StoreError>;

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}
