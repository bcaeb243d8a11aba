//! Content-hash record of files already dispatched.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StorageError;

const STORE_FILE: &str = "sent_files.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentEntry {
    pub path: PathBuf,
    pub sent_at: DateTime<Utc>,
}

/// SHA-256 hex digest of the full file content.
pub fn hash_file(path: &Path) -> Result<String, StorageError> {
    let mut file = fs::File::open(path).map_err(|e| StorageError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| StorageError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Loaded fully at open and rewritten atomically on every change.
pub struct SentFileTracker {
    store_path: PathBuf,
    entries: BTreeMap<String, SentEntry>,
}

impl SentFileTracker {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| StorageError::CreateDirectory {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let store_path = dir.join(STORE_FILE);
        let entries = match fs::read_to_string(&store_path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| StorageError::CorruptLedger {
                    path: store_path.clone(),
                    reason: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(StorageError::ReadFile {
                    path: store_path,
                    source: e,
                })
            }
        };

        debug!(
            "Loaded {} sent-file entries from {}",
            entries.len(),
            store_path.display()
        );
        Ok(Self {
            store_path,
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_sent(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn get(&self, hash: &str) -> Option<&SentEntry> {
        self.entries.get(hash)
    }

    /// Records a batch of `(hash, path)` pairs sent together and persists them.
    pub fn record_batch<'a, I>(
        &mut self,
        files: I,
        sent_at: DateTime<Utc>,
    ) -> Result<(), StorageError>
    where
        I: IntoIterator<Item = (&'a str, &'a Path)>,
    {
        for (hash, path) in files {
            self.entries.insert(
                hash.to_string(),
                SentEntry {
                    path: path.to_path_buf(),
                    sent_at,
                },
            );
        }
        self.save()
    }

    /// Drops entries older than `keep_days`. Zero keeps everything.
    pub fn prune(&mut self, keep_days: u32, now: DateTime<Utc>) -> Result<usize, StorageError> {
        if keep_days == 0 {
            return Ok(0);
        }
        let cutoff = now - Duration::days(i64::from(keep_days));
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.sent_at >= cutoff);
        let removed = before - self.entries.len();

        if removed > 0 {
            self.save()?;
            info!("Pruned {} sent-file entries older than {}", removed, cutoff);
        }
        Ok(removed)
    }

    /// Writes to a temporary sibling and renames it over the store.
    fn save(&self) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(&self.entries).map_err(|e| {
            StorageError::CorruptLedger {
                path: self.store_path.clone(),
                reason: e.to_string(),
            }
        })?;

        let tmp_path = self.store_path.with_extension("json.tmp");
        let write_err = |e| StorageError::WriteFile {
            path: tmp_path.clone(),
            source: e,
        };
        let mut file = fs::File::create(&tmp_path).map_err(write_err)?;
        file.write_all(json.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        fs::rename(&tmp_path, &self.store_path).map_err(|e| StorageError::WriteFile {
            path: self.store_path.clone(),
            source: e,
        })
    }
}
