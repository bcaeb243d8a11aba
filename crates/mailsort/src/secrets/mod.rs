//! Credential vault.
//!
//! Mailbox passwords are kept in an OS secret backend as encrypted tokens.
//! The key is derived from the identity of the machine on every call and is
//! never stored anywhere.

pub mod backend;
pub mod fingerprint;
pub mod source;
pub mod token;
pub mod vault;

pub use backend::{KeyringBackend, MemoryBackend, SecretBackend};
pub use fingerprint::MachineIdentity;
pub use source::{expand_home, read_password_file};
pub use token::TokenCipher;
pub use vault::{CredentialVault, SERVICE_NAME};

/// Error type for credential vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("No credential stored for '{principal}'")]
    NotFound { principal: String },

    #[error("Stored credential for '{principal}' cannot be decrypted on this machine ({reason}); set the password again")]
    DecryptionFailed { principal: String, reason: String },

    #[error("Secret backend error: {0}")]
    Backend(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Failed to read password file '{path}': {source}")]
    PasswordFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Password file '{0}' is empty")]
    EmptyPasswordFile(String),
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
