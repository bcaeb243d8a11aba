use thiserror::Error;

/// Errors raised by IMAP and SMTP sessions.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Rejected credentials. Never retried.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Connection-level failure that may succeed on another attempt.
    #[error("Transient transport error: {0}")]
    Transient(String),

    /// Protocol error that will not go away by retrying.
    #[error("Protocol error: {0}")]
    Permanent(String),

    #[error("Mailbox '{0}' not found")]
    FolderNotFound(String),

    #[error("Not connected")]
    NotConnected,

    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<TransportError>,
    },
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
