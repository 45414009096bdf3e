//! Domain model (ids, task, stats, report, retry envelope, decisions, errors).
//!
//! Nothing here performs I/O. The app layer wires these types to the ports.

pub mod decision;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod report;
pub mod stats;
pub mod task;

pub use self::decision::{MAX_RETRY, POISON_THROTTLE_DELAY, RetryDecision, RetryPolicy};
pub use self::envelope::RetryEnvelope;
pub use self::errors::{ErrorKind, HandleError};
pub use self::ids::{CorrelationId, Phone};
pub use self::report::{Report, ReportEntry, ReportStatus, TASK_RECEIVED_FORMAT};
pub use self::stats::{CallRecord, DurationBuckets, PhoneStats};
pub use self::task::Task;
