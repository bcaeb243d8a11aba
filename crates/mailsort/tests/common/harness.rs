//! Test harness for isolated pipeline runs.
//!
//! Every harness owns a temporary directory holding the download directory,
//! the processed-uid ledger, the sent-file store and an outbox of files to
//! dispatch.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tempfile::TempDir;
use walkdir::WalkDir;

use mailsort::config::Config;
use mailsort::tracker::{ProcessedSet, SentFileTracker};

use super::builders::ConfigBuilder;

pub struct TestHarness {
    temp_dir: TempDir,
    pub downloads: PathBuf,
    pub outbox: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let downloads = temp_dir.path().join("downloads");
        let outbox = temp_dir.path().join("outbox");
        std::fs::create_dir_all(&downloads).expect("Failed to create downloads dir");
        std::fs::create_dir_all(&outbox).expect("Failed to create outbox dir");

        Self {
            temp_dir,
            downloads,
            outbox,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Config builder rooted in this harness.
    pub fn config(&self) -> ConfigBuilder {
        ConfigBuilder::new(self.root())
    }

    /// Every file below the download directory, relative and sorted.
    pub fn downloaded_files(&self) -> Vec<String> {
        let mut files: Vec<String> = WalkDir::new(&self.downloads)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(&self.downloads)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        files.sort();
        files
    }

    /// Reopens the processed-uid ledger from disk.
    pub fn processed(&self, config: &Config) -> ProcessedSet {
        ProcessedSet::open(&config.processing.processed_dir).expect("Failed to open ledger")
    }

    pub fn is_processed(&self, config: &Config, uid: u32, date: Option<NaiveDate>) -> bool {
        self.processed(config)
            .contains(uid, date)
            .expect("Failed to read ledger")
    }

    /// Reopens the sent-file store from disk.
    pub fn sent_tracker(&self, config: &Config) -> SentFileTracker {
        let smtp = config.smtp.as_ref().expect("test config has smtp");
        SentFileTracker::open(&smtp.sent_files_dir).expect("Failed to open sent store")
    }

    /// Writes a file into the outbox and returns its path.
    pub fn outbox_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.outbox.join(name);
        std::fs::write(&path, content).expect("Failed to write outbox file");
        path
    }
}

/// The calendar day the scenario messages are dated.
pub fn jan_5() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
}

/// "Today" for scenario runs, inside the default five-day search window.
pub fn jan_6() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()
}
