use std::path::PathBuf;
use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::secrets::VaultError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum MailsortError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] VaultError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl MailsortError {
    /// Returns true when the error must abort the whole run.
    ///
    /// Everything reaching this type is fatal except errors that the
    /// pipelines already downgrade to per-item skips before returning.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            MailsortError::Storage(StorageError::DiskSpaceExceeded { .. })
        )
    }

    /// Process exit code for the command-line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            MailsortError::Config(_) | MailsortError::Logging(_) => 2,
            MailsortError::Credential(_) => 3,
            MailsortError::Transport(TransportError::AuthenticationFailed(_)) => 4,
            MailsortError::Transport(_) => 5,
            MailsortError::Storage(_) => 6,
            MailsortError::Dispatch(DispatchError::Config(_)) => 2,
            MailsortError::Dispatch(_) => 7,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid routing pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Routing table must end with a catch-all rule (last pattern '{pattern}' does not match every subject)")]
    MissingCatchAll { pattern: String },

    #[error("Unknown variable '{{{variable}}}' in subject template '{template}'")]
    UnresolvedTemplateVariable { template: String, variable: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not enough disk space in '{path}': need {required} bytes, {available} available")]
    DiskSpaceExceeded {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    #[error("Target folder '{0}' escapes the download directory")]
    OutsideDownloadDir(PathBuf),

    #[error("Corrupt ledger '{path}': {reason}")]
    CorruptLedger { path: PathBuf, reason: String },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

pub type Result<T> = std::result::Result<T, MailsortError>;
