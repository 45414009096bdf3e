//! Ports - 抽象化レイヤー
//!
//! Each trait is the seam to one external system (broker, dataset, durable storage,
//! time). Production implementations and in-memory doubles live in `impls`.

pub mod broker;
pub mod clock;
pub mod record_source;
pub mod snapshot_store;

pub use self::broker::{BrokerError, Delivery, DeliveryStream, QueueSender, Republisher};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::record_source::{RecordSource, RecordSourceError};
pub use self::snapshot_store::{CacheEntry, Snapshot, SnapshotStore, StoreError};
