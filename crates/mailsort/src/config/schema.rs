use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::transport::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub imap: ImapConfig,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub allowed_senders: Vec<String>,
    #[serde(default)]
    pub routing: Vec<RoutingRule>,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// SMTP principal, falling back to the IMAP user.
    pub fn smtp_user(&self) -> Option<&str> {
        self.smtp
            .as_ref()
            .and_then(|smtp| smtp.user.as_deref())
            .or(Some(self.imap.user.as_str()))
            .filter(|user| !user.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImapConfig {
    pub server: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub user: String,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Seconds between connection attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl ImapConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.retry_delay))
    }
}

fn default_imap_port() -> u16 {
    993
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    pub from_address: String,
    #[serde(default)]
    pub default_recipient: Option<String>,
    /// STARTTLS on a plain connection.
    #[serde(default = "default_true")]
    pub use_tls: bool,
    /// Implicit TLS (SMTPS). Takes precedence over `use_tls`.
    #[serde(default)]
    pub use_ssl: bool,
    /// Maximum size of one outgoing message, in megabytes.
    #[serde(default = "default_max_email_size")]
    pub max_email_size: f64,
    #[serde(default)]
    pub subject_template: Option<String>,
    #[serde(default)]
    pub subject_template_package: Option<String>,
    #[serde(default)]
    pub send_folder: Option<PathBuf>,
    #[serde(default = "default_sent_files_dir")]
    pub sent_files_dir: PathBuf,
    #[serde(default)]
    pub keep_sent_days: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
}

impl SmtpConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.retry_delay))
    }

    pub fn max_email_size_bytes(&self) -> u64 {
        (self.max_email_size * 1024.0 * 1024.0) as u64
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_max_email_size() -> f64 {
    25.0
}

fn default_sent_files_dir() -> PathBuf {
    PathBuf::from("sent_files")
}

/// One entry of the ordered subject routing table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub pattern: String,
    pub folder: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_start_days_back")]
    pub start_days_back: u32,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_archive_folder")]
    pub archive_folder: String,
    #[serde(default = "default_true")]
    pub archive_enabled: bool,
    /// Only archive messages routed by a rule other than the catch-all.
    #[serde(default = "default_true")]
    pub archive_only_mapped: bool,
    /// Record senders outside the allow-list so they are not re-evaluated.
    #[serde(default = "default_true")]
    pub mark_ineligible_processed: bool,
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,
    #[serde(default)]
    pub keep_processed_days: u32,
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub blocked_extensions: Vec<String>,
    #[serde(default = "default_max_attachment_size")]
    pub max_attachment_size: u64,
    #[serde(default = "default_disk_safety_margin")]
    pub disk_safety_margin: u64,
}

fn default_start_days_back() -> u32 {
    5
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_archive_folder() -> String {
    "INBOX/Processed".to_string()
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from("processed_uids")
}

fn default_max_attachment_size() -> u64 {
    52_428_800
}

fn default_disk_safety_margin() -> u64 {
    10 * 1024 * 1024
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            start_days_back: default_start_days_back(),
            download_dir: default_download_dir(),
            archive_folder: default_archive_folder(),
            archive_enabled: true,
            archive_only_mapped: true,
            mark_ineligible_processed: true,
            processed_dir: default_processed_dir(),
            keep_processed_days: 0,
            allowed_extensions: Vec::new(),
            blocked_extensions: Vec::new(),
            max_attachment_size: default_max_attachment_size(),
            disk_safety_margin: default_disk_safety_margin(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Console,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Console
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Console,
            file: None,
        }
    }
}
