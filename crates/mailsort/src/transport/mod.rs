//! Authenticated mail server sessions with bounded retry.

pub mod error;
pub mod imap;
pub mod retry;
pub mod smtp;

pub use error::{Result, TransportError};
pub use imap::{ImapSession, MailboxSession};
pub use retry::{with_retry, Attempts, RetryPolicy};
pub use smtp::{MailSender, OutgoingAttachment, OutgoingMessage, SmtpSender};
