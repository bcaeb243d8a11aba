//! Message model for the two-phase IMAP fetch and MIME parsing.

pub mod message;
pub mod parser;

pub use message::{AttachmentBlob, FetchedMessage, FullMessage, HeaderRecord};
pub use parser::{parse_full_message, parse_header_record, sanitize_filename};

/// Errors raised while parsing fetched messages.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Failed to parse headers of message UID {0}")]
    HeaderParse(u32),

    #[error("Failed to parse message UID {0}")]
    MessageParse(u32),
}

/// Result type for parsing operations.
pub type Result<T> = std::result::Result<T, EmailError>;
