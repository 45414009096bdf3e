//! RecordSource port - the call-records dataset.
//!
//! A source is scanned front to back, one record at a time. Implementations must not
//! materialise the dataset in memory. `scan` is blocking; callers move it off the async
//! scheduler.

use thiserror::Error;

use crate::domain::CallRecord;

#[derive(Debug, Error)]
pub enum RecordSourceError {
    #[error("failed to open dataset {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed dataset: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("dataset scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub trait RecordSource: Send + Sync {
    fn scan(&self, visit: &mut dyn FnMut(CallRecord)) -> Result<(), RecordSourceError>;
}
