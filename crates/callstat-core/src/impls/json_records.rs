//! JsonArrayRecordSource - the dataset as one big JSON array on disk.
//!
//! The array is walked element by element through a serde sequence visitor, so memory
//! use stays flat regardless of file size.

use serde::de::{DeserializeSeed, Deserializer, SeqAccess, Visitor};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use crate::domain::CallRecord;
use crate::ports::{RecordSource, RecordSourceError};

pub struct JsonArrayRecordSource {
    path: PathBuf,
}

impl JsonArrayRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for JsonArrayRecordSource {
    fn scan(&self, visit: &mut dyn FnMut(CallRecord)) -> Result<(), RecordSourceError> {
        let file = File::open(&self.path).map_err(|source| RecordSourceError::Open {
            path: self.path.display().to_string(),
            source,
        })?;
        let mut de = serde_json::Deserializer::from_reader(BufReader::new(file));
        EachRecord { visit }.deserialize(&mut de)?;
        de.end()?;
        Ok(())
    }
}

/// Feeds every array element to `visit` as soon as it is parsed.
struct EachRecord<'a> {
    visit: &'a mut dyn FnMut(CallRecord),
}

impl<'de> DeserializeSeed<'de> for EachRecord<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for EachRecord<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of call records")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let visit = self.visit;
        while let Some(record) = seq.next_element::<CallRecord>()? {
            visit(record);
        }
        Ok(())
    }
}
