use std::path::Path;

use log::debug;
use sha2::{Digest, Sha256};

const UNKNOWN: &str = "unknown";

/// Stable, non-secret attributes of the running machine.
///
/// Changing any of them (new network card, renamed host, different user,
/// moved config file, major version bump) yields a different fingerprint and
/// therefore a different vault key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineIdentity {
    /// Primary hardware address, lowercase hex without separators.
    pub mac: Option<String>,
    pub hostname: String,
    pub user: String,
    /// First 16 hex chars of the SHA-256 of the config file path.
    pub config_path_hash: String,
    pub runtime_version: String,
}

impl MachineIdentity {
    /// Collects the identity of the current machine.
    pub fn detect(config_path: &Path) -> Self {
        let mac = match mac_address::get_mac_address() {
            Ok(Some(addr)) => Some(format_mac(&addr.bytes())),
            Ok(None) => None,
            Err(e) => {
                debug!("Could not read hardware address: {}", e);
                None
            }
        };

        let hostname = hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().into_owned())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());

        Self {
            mac,
            hostname,
            user: current_user(),
            config_path_hash: hash_config_path(config_path),
            runtime_version: env!("CARGO_PKG_VERSION_MAJOR").to_string(),
        }
    }

    /// SHA-256 hex digest over all identity attributes.
    pub fn fingerprint(&self) -> String {
        let material = [
            self.mac.as_deref().unwrap_or(UNKNOWN),
            &self.hostname,
            &self.user,
            &self.config_path_hash,
            &self.runtime_version,
        ]
        .join("|");
        format!("{:x}", Sha256::digest(material.as_bytes()))
    }
}

fn format_mac(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn current_user() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn hash_config_path(path: &Path) -> String {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let digest = format!(
        "{:x}",
        Sha256::digest(resolved.to_string_lossy().as_bytes())
    );
    digest[..16].to_string()
}
