use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use super::backend::SecretBackend;
use super::fingerprint::MachineIdentity;
use super::token::{is_token, TokenCipher};
use super::{Result, VaultError};

/// Service name under which every credential is filed in the backend.
pub const SERVICE_NAME: &str = "mailsort";

/// What the backend held for a principal.
enum Stored {
    Token(SecretString),
    Legacy(SecretString),
}

/// Resolves and stores mailbox passwords as machine-bound tokens.
pub struct CredentialVault<B: SecretBackend> {
    backend: B,
    identity: MachineIdentity,
    service: String,
}

impl<B: SecretBackend> CredentialVault<B> {
    pub fn new(backend: B, identity: MachineIdentity) -> Self {
        Self {
            backend,
            identity,
            service: SERVICE_NAME.to_string(),
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Key is derived per call and dropped with the cipher.
    fn cipher(&self) -> Result<TokenCipher> {
        TokenCipher::from_fingerprint(&self.identity.fingerprint())
    }

    fn lookup(&self, principal: &str) -> Result<Stored> {
        let stored = self
            .backend
            .get(&self.service, principal)?
            .ok_or_else(|| VaultError::NotFound {
                principal: principal.to_string(),
            })?;

        if !is_token(&stored) {
            warn!(
                "Credential for {} is stored unencrypted; it will be encrypted on next store",
                principal
            );
            return Ok(Stored::Legacy(SecretString::from(stored)));
        }

        match self.cipher()?.decrypt(&stored) {
            Ok(token) => {
                debug!(
                    "Resolved credential for {} (issued {})",
                    principal, token.issued_at
                );
                Ok(Stored::Token(SecretString::from(token.secret)))
            }
            Err(reason) => Err(VaultError::DecryptionFailed {
                principal: principal.to_string(),
                reason,
            }),
        }
    }

    /// Returns the plaintext secret for `principal`.
    ///
    /// `NotFound` means nothing was ever stored; `DecryptionFailed` means a
    /// token exists but this machine's identity no longer derives its key.
    pub fn resolve(&self, principal: &str) -> Result<SecretString> {
        match self.lookup(principal)? {
            Stored::Token(secret) | Stored::Legacy(secret) => Ok(secret),
        }
    }

    /// Encrypts and stores `secret`, replacing any previous value.
    pub fn store(&self, principal: &str, secret: &SecretString) -> Result<()> {
        let token = self.cipher()?.encrypt(secret.expose_secret())?;
        self.backend.set(&self.service, principal, &token)?;
        info!("Stored encrypted credential for {}", principal);
        Ok(())
    }

    /// Re-stores a legacy plaintext credential as a token. Returns true if it migrated one.
    pub fn migrate_legacy(&self, principal: &str) -> Result<bool> {
        match self.lookup(principal)? {
            Stored::Legacy(secret) => {
                self.store(principal, &secret)?;
                info!("Migrated plaintext credential for {}", principal);
                Ok(true)
            }
            Stored::Token(_) => Ok(false),
        }
    }

    pub fn clear(&self, principal: &str) -> Result<()> {
        self.backend.delete(&self.service, principal)?;
        info!("Cleared credential for {}", principal);
        Ok(())
    }
}
