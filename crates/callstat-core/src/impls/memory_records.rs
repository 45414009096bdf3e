//! InMemoryRecordSource - a dataset held in a Vec (development and tests).

use crate::domain::CallRecord;
use crate::ports::{RecordSource, RecordSourceError};

#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordSource {
    records: Vec<CallRecord>,
}

impl InMemoryRecordSource {
    pub fn new(records: Vec<CallRecord>) -> Self {
        Self { records }
    }
}

impl RecordSource for InMemoryRecordSource {
    fn scan(&self, visit: &mut dyn FnMut(CallRecord)) -> Result<(), RecordSourceError> {
        for record in &self.records {
            visit(*record);
        }
        Ok(())
    }
}
