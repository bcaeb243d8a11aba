//! Idempotency ledgers for both pipelines.

pub mod processed;
pub mod sent;

pub use processed::{ProcessedSet, NO_DATE_PARTITION};
pub use sent::{hash_file, SentEntry, SentFileTracker};
