use std::collections::HashMap;
use std::sync::Mutex;

use keyring::Entry;
use log::{debug, warn};

use super::{Result, VaultError};

/// Key-value store addressed by service name and principal.
pub trait SecretBackend: Send + Sync {
    fn get(&self, service: &str, principal: &str) -> Result<Option<String>>;
    fn set(&self, service: &str, principal: &str, value: &str) -> Result<()>;
    fn delete(&self, service: &str, principal: &str) -> Result<()>;
}

/// Backend over the platform keyring (Keychain, Credential Manager, Secret Service).
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringBackend;

impl KeyringBackend {
    fn entry(service: &str, principal: &str) -> Result<Entry> {
        Entry::new(service, principal).map_err(|e| VaultError::Backend(e.to_string()))
    }
}

impl SecretBackend for KeyringBackend {
    fn get(&self, service: &str, principal: &str) -> Result<Option<String>> {
        match Self::entry(service, principal)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => {
                debug!("No keyring entry for {}", principal);
                Ok(None)
            }
            Err(e) => Err(VaultError::Backend(e.to_string())),
        }
    }

    fn set(&self, service: &str, principal: &str, value: &str) -> Result<()> {
        Self::entry(service, principal)?
            .set_password(value)
            .map_err(|e| VaultError::Backend(e.to_string()))
    }

    fn delete(&self, service: &str, principal: &str) -> Result<()> {
        match Self::entry(service, principal)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => {
                debug!("No keyring entry to delete for {}", principal);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to delete keyring entry for {}: {}", principal, e);
                Err(VaultError::Backend(e.to_string()))
            }
        }
    }
}

/// Process-local backend. Used when no keyring is available and in tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), String>>> {
        self.entries
            .lock()
            .map_err(|_| VaultError::Backend("memory backend lock poisoned".to_string()))
    }
}

impl SecretBackend for MemoryBackend {
    fn get(&self, service: &str, principal: &str) -> Result<Option<String>> {
        Ok(self
            .lock()?
            .get(&(service.to_string(), principal.to_string()))
            .cloned())
    }

    fn set(&self, service: &str, principal: &str, value: &str) -> Result<()> {
        self.lock()?.insert(
            (service.to_string(), principal.to_string()),
            value.to_string(),
        );
        Ok(())
    }

    fn delete(&self, service: &str, principal: &str) -> Result<()> {
        self.lock()?
            .remove(&(service.to_string(), principal.to_string()));
        Ok(())
    }
}

impl<T: SecretBackend + ?Sized> SecretBackend for std::sync::Arc<T> {
    fn get(&self, service: &str, principal: &str) -> Result<Option<String>> {
        (**self).get(service, principal)
    }

    fn set(&self, service: &str, principal: &str, value: &str) -> Result<()> {
        (**self).set(service, principal, value)
    }

    fn delete(&self, service: &str, principal: &str) -> Result<()> {
        (**self).delete(service, principal)
    }
}
