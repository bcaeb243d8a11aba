//! Day-partitioned record of handled message uids.
//!
//! One file per calendar day (`YYYY-MM-DD.txt`), one uid per line, append
//! only. A missing file is an empty partition. Messages without a usable
//! date share the `nodate` partition, which pruning never touches.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate};
use log::{debug, info, warn};

use crate::error::StorageError;

pub const NO_DATE_PARTITION: &str = "nodate";

const PARTITION_EXT: &str = "txt";

pub struct ProcessedSet {
    dir: PathBuf,
    /// Partitions read so far, keyed by partition name.
    loaded: HashMap<String, HashSet<u32>>,
}

fn partition_key(date: Option<NaiveDate>) -> String {
    match date {
        Some(day) => day.format("%Y-%m-%d").to_string(),
        None => NO_DATE_PARTITION.to_string(),
    }
}

impl ProcessedSet {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StorageError::CreateDirectory {
            path: dir.clone(),
            source: e,
        })?;

        Ok(Self {
            dir,
            loaded: HashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn partition_path(&self, date: Option<NaiveDate>) -> PathBuf {
        self.dir.join(format!("{}.{}", partition_key(date), PARTITION_EXT))
    }

    fn partition(&mut self, date: Option<NaiveDate>) -> Result<&mut HashSet<u32>, StorageError> {
        let path = self.partition_path(date);
        match self.loaded.entry(partition_key(date)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(read_partition(&path)?)),
        }
    }

    /// True if `uid` was marked in the partition for `date`.
    pub fn contains(&mut self, uid: u32, date: Option<NaiveDate>) -> Result<bool, StorageError> {
        Ok(self.partition(date)?.contains(&uid))
    }

    /// Records `uid` in the partition for `date`. Marking twice is a no-op.
    pub fn mark(&mut self, uid: u32, date: Option<NaiveDate>) -> Result<(), StorageError> {
        let path = self.partition_path(date);
        let partition = self.partition(date)?;
        if partition.contains(&uid) {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::WriteFile {
                path: path.clone(),
                source: e,
            })?;
        writeln!(file, "{}", uid).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        partition.insert(uid);
        debug!("Marked UID {} in {}", uid, path.display());
        Ok(())
    }

    /// Deletes dated partitions older than `older_than_days` before `today`.
    ///
    /// Zero keeps everything. Returns the number of partitions removed.
    pub fn prune(
        &mut self,
        older_than_days: u32,
        today: NaiveDate,
    ) -> Result<usize, StorageError> {
        if older_than_days == 0 {
            return Ok(0);
        }
        let cutoff = today - Duration::days(i64::from(older_than_days));

        let entries = fs::read_dir(&self.dir).map_err(|e| StorageError::ReadFile {
            path: self.dir.clone(),
            source: e,
        })?;

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PARTITION_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(day) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") else {
                continue;
            };

            if day < cutoff {
                fs::remove_file(&path).map_err(|e| StorageError::RemoveFile {
                    path: path.clone(),
                    source: e,
                })?;
                self.loaded.remove(stem);
                removed += 1;
            }
        }

        if removed > 0 {
            info!(
                "Pruned {} processed-uid partitions older than {}",
                removed, cutoff
            );
        }
        Ok(removed)
    }
}

fn read_partition(path: &Path) -> Result<HashSet<u32>, StorageError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => {
            return Err(StorageError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let mut uids = HashSet::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match line.parse::<u32>() {
            Ok(uid) => {
                uids.insert(uid);
            }
            Err(_) => warn!("Ignoring invalid uid '{}' in {}", line, path.display()),
        }
    }
    Ok(uids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 1, d)
    }

    #[test]
    fn test_mark_and_contains() {
        let dir = TempDir::new().unwrap();
        let mut set = ProcessedSet::open(dir.path()).unwrap();

        assert!(!set.contains(101, day(5)).unwrap());
        set.mark(101, day(5)).unwrap();
        assert!(set.contains(101, day(5)).unwrap());
    }

    #[test]
    fn test_mark_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut set = ProcessedSet::open(dir.path()).unwrap();

        set.mark(101, day(5)).unwrap();
        set.mark(101, day(5)).unwrap();
        set.mark(101, day(5)).unwrap();

        let content = fs::read_to_string(set.partition_path(day(5))).unwrap();
        assert_eq!(content, "101\n");
        assert!(set.contains(101, day(5)).unwrap());
    }

    #[test]
    fn test_partition_isolation() {
        let dir = TempDir::new().unwrap();
        let mut set = ProcessedSet::open(dir.path()).unwrap();

        set.mark(101, day(5)).unwrap();
        assert!(!set.contains(101, day(6)).unwrap());
        assert!(!set.contains(101, None).unwrap());
    }

    #[test]
    fn test_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        {
            let mut set = ProcessedSet::open(dir.path()).unwrap();
            set.mark(101, day(5)).unwrap();
            set.mark(7, None).unwrap();
        }

        let mut set = ProcessedSet::open(dir.path()).unwrap();
        assert!(set.contains(101, day(5)).unwrap());
        assert!(set.contains(7, None).unwrap());
        assert!(dir.path().join("2024-01-05.txt").exists());
        assert!(dir.path().join("nodate.txt").exists());
    }

    #[test]
    fn test_prune_removes_old_partitions_only() {
        let dir = TempDir::new().unwrap();
        let mut set = ProcessedSet::open(dir.path()).unwrap();
        set.mark(1, day(1)).unwrap();
        set.mark(2, day(9)).unwrap();
        set.mark(3, None).unwrap();

        let removed = set.prune(5, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()).unwrap();
        assert_eq!(removed, 1);
        assert!(!set.contains(1, day(1)).unwrap());
        assert!(set.contains(2, day(9)).unwrap());
        assert!(set.contains(3, None).unwrap());
    }

    #[test]
    fn test_prune_zero_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let mut set = ProcessedSet::open(dir.path()).unwrap();
        set.mark(1, day(1)).unwrap();

        let removed = set.prune(0, NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()).unwrap();
        assert_eq!(removed, 0);
        assert!(set.contains(1, day(1)).unwrap());
    }

    #[test]
    fn test_invalid_lines_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("2024-01-05.txt"), "101\ngarbage\n\n102\n").unwrap();

        let mut set = ProcessedSet::open(dir.path()).unwrap();
        assert!(set.contains(101, day(5)).unwrap());
        assert!(set.contains(102, day(5)).unwrap());
    }
}
