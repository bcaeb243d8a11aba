pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod email;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod secrets;
pub mod storage;
pub mod tracker;
pub mod transport;

pub use classifier::{Classifier, ExtensionFilter, FilterDecision, RejectReason, Route};
pub use config::{load_config, Config};
pub use dispatch::{DispatchError, DispatchPipeline, DispatchSummary};
pub use error::{ConfigError, MailsortError, Result, StorageError};
pub use ingest::{IngestPipeline, MessageOutcome, RunSummary};
pub use secrets::{CredentialVault, KeyringBackend, MachineIdentity, SecretBackend, VaultError};
pub use tracker::{ProcessedSet, SentFileTracker};
pub use transport::{ImapSession, MailSender, MailboxSession, SmtpSender, TransportError};
