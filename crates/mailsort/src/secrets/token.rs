//! Authenticated, self-describing secret tokens.
//!
//! Layout before text encoding:
//!
//! ```text
//! [version: 1][issued_at: u64 BE unix seconds][nonce: 12][AES-256-GCM ciphertext + tag]
//! ```
//!
//! The version byte and timestamp are bound to the ciphertext as associated
//! data, so tampering with any part fails authentication. The whole blob is
//! URL-safe base64 encoded and prefixed with [`TOKEN_PREFIX`].

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use sha2::Sha256;

use super::{Result, VaultError};

/// Marks a stored value as an encrypted token.
pub const TOKEN_PREFIX: &str = "ENC:";

pub const TOKEN_VERSION: u8 = 1;

/// PBKDF2-HMAC-SHA256 rounds used to stretch the machine fingerprint.
pub const KDF_ITERATIONS: u32 = 100_000;

const KDF_SALT: &[u8] = b"mailsort/credential-vault/v1";

/// Nonce size for AES-256-GCM (96 bits = 12 bytes).
const NONCE_SIZE: usize = 12;

const HEADER_SIZE: usize = 1 + 8;

/// Returns true when `stored` carries the token marker.
pub fn is_token(stored: &str) -> bool {
    stored.starts_with(TOKEN_PREFIX)
}

/// Cipher keyed from a machine fingerprint.
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Derives the key from `fingerprint`. Deliberately slow.
    pub fn from_fingerprint(fingerprint: &str) -> Result<Self> {
        let mut key = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(fingerprint.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut key);

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| VaultError::Encryption(format!("Failed to create cipher: {}", e)))?;

        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        self.encrypt_at(plaintext, Utc::now())
    }

    fn encrypt_at(&self, plaintext: &str, issued_at: DateTime<Utc>) -> Result<String> {
        let mut header = [0u8; HEADER_SIZE];
        header[0] = TOKEN_VERSION;
        header[1..].copy_from_slice(&(issued_at.timestamp().max(0) as u64).to_be_bytes());

        let nonce_bytes = rand_bytes::<NONCE_SIZE>()?;
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: &header,
                },
            )
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        let mut combined = Vec::with_capacity(HEADER_SIZE + NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&header);
        combined.extend_from_slice(&nonce_bytes);
        combined.extend(ciphertext);

        Ok(format!("{}{}", TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(combined)))
    }

    /// Decrypts a token. The error string describes why authentication failed.
    pub fn decrypt(&self, token: &str) -> std::result::Result<DecryptedToken, String> {
        let encoded = token
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| "missing token marker".to_string())?;
        let combined = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| format!("invalid encoding: {}", e))?;

        if combined.len() < HEADER_SIZE + NONCE_SIZE {
            return Err("token too short".to_string());
        }

        let (header, rest) = combined.split_at(HEADER_SIZE);
        if header[0] != TOKEN_VERSION {
            return Err(format!("unsupported token version {}", header[0]));
        }
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| "authentication failed".to_string())?;

        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&header[1..]);
        let issued_at = DateTime::from_timestamp(u64::from_be_bytes(timestamp) as i64, 0)
            .ok_or_else(|| "invalid timestamp".to_string())?;

        let secret = String::from_utf8(plaintext).map_err(|e| format!("invalid UTF-8: {}", e))?;

        Ok(DecryptedToken { secret, issued_at })
    }
}

#[derive(Debug)]
pub struct DecryptedToken {
    pub secret: String,
    pub issued_at: DateTime<Utc>,
}

/// Generates random bytes using getrandom.
fn rand_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes).map_err(|e| {
        VaultError::Encryption(format!("Failed to generate random bytes: {}", e))
    })?;
    Ok(bytes)
}
