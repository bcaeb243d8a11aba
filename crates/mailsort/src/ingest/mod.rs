//! Inbound path: fetch mail, save routed attachments, archive and mark.

pub mod pipeline;
pub mod summary;

pub use pipeline::{IngestPipeline, MessageOutcome};
pub use summary::RunSummary;
