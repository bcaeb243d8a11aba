//! Outbound path: send local files over SMTP exactly once per content.

pub mod pipeline;
pub mod subject;

pub use pipeline::{
    estimate_message_size, list_folder, split_by_size, DispatchPipeline, DispatchSummary,
    PendingFile,
};
pub use subject::{create_subject, SubjectContext, SubjectFile, SubjectKind, SubjectTemplate};

use std::path::PathBuf;

use crate::error::{ConfigError, StorageError};
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("'{0}' is not a regular file")]
    NotAFile(PathBuf),

    #[error("'{0}' is not a directory")]
    NotADirectory(PathBuf),

    #[error("No recipient given and 'smtp.default_recipient' is not set")]
    NoRecipient,

    #[error("SMTP is not configured")]
    NotConfigured,
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
