//! Builders for configurations and raw messages.

#![allow(dead_code)]

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use mailsort::config::{load_config_from_str, Config, RoutingRule};

/// Builder for creating `Config` instances rooted in a temporary directory.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Minimal valid configuration: one allowed sender, invoices routed to
    /// `invoices/`, everything else to `other/`.
    pub fn new(root: &Path) -> Self {
        let yaml = format!(
            r#"
imap:
  server: imap.example.com
  user: robot@example.com
  max_retries: 1
  retry_delay: 0
smtp:
  server: smtp.example.com
  from_address: robot@example.com
  default_recipient: archive@example.com
  sent_files_dir: {sent}
allowed_senders:
  - billing@example.com
routing:
  - pattern: "(?i)invoice"
    folder: invoices
  - pattern: ".*"
    folder: other
processing:
  download_dir: {downloads}
  processed_dir: {processed}
  archive_folder: Archive
  disk_safety_margin: 0
"#,
            sent = root.join("sent_files").display(),
            downloads = root.join("downloads").display(),
            processed = root.join("processed_uids").display(),
        );

        Self {
            config: load_config_from_str(&yaml).expect("base test config is valid"),
        }
    }

    pub fn allowed_senders(mut self, senders: &[&str]) -> Self {
        self.config.allowed_senders = senders.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn routing(mut self, rules: &[(&str, &str)]) -> Self {
        self.config.routing = rules
            .iter()
            .map(|(pattern, folder)| RoutingRule {
                pattern: pattern.to_string(),
                folder: folder.into(),
            })
            .collect();
        self
    }

    pub fn archive_enabled(mut self, enabled: bool) -> Self {
        self.config.processing.archive_enabled = enabled;
        self
    }

    pub fn archive_only_mapped(mut self, only_mapped: bool) -> Self {
        self.config.processing.archive_only_mapped = only_mapped;
        self
    }

    pub fn mark_ineligible_processed(mut self, mark: bool) -> Self {
        self.config.processing.mark_ineligible_processed = mark;
        self
    }

    pub fn blocked_extensions(mut self, extensions: &[&str]) -> Self {
        self.config.processing.blocked_extensions =
            mailsort::config::normalize_extensions(
                &extensions.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            );
        self
    }

    pub fn max_email_size_mb(mut self, megabytes: f64) -> Self {
        if let Some(smtp) = self.config.smtp.as_mut() {
            smtp.max_email_size = megabytes;
        }
        self
    }

    pub fn subject_template(mut self, template: &str) -> Self {
        if let Some(smtp) = self.config.smtp.as_mut() {
            smtp.subject_template = Some(template.to_string());
        }
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Builder for raw RFC 822 messages with optional attachments.
pub struct MessageBuilder {
    from: String,
    subject: String,
    date: Option<String>,
    attachments: Vec<(String, String, Vec<u8>)>,
}

impl MessageBuilder {
    pub fn new(from: &str, subject: &str) -> Self {
        Self {
            from: from.to_string(),
            subject: subject.to_string(),
            date: Some("Fri, 05 Jan 2024 10:00:00 +0000".to_string()),
            attachments: Vec::new(),
        }
    }

    pub fn date(mut self, date: &str) -> Self {
        self.date = Some(date.to_string());
        self
    }

    pub fn no_date(mut self) -> Self {
        self.date = None;
        self
    }

    pub fn attachment(mut self, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.attachments
            .push((filename.to_string(), content_type.to_string(), data.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut raw = format!(
            "From: {from}\r\nTo: robot@example.com\r\nSubject: {subject}\r\n",
            from = self.from,
            subject = self.subject
        );
        if let Some(date) = &self.date {
            raw.push_str(&format!("Date: {}\r\n", date));
        }
        raw.push_str(
            "MIME-Version: 1.0\r\nContent-Type: multipart/mixed; boundary=\"BOUNDARY\"\r\n\r\n",
        );
        raw.push_str("--BOUNDARY\r\nContent-Type: text/plain\r\n\r\nSee attached.\r\n");
        for (filename, content_type, data) in &self.attachments {
            raw.push_str(&format!(
                "--BOUNDARY\r\n\
                 Content-Type: {ct}; name=\"{name}\"\r\n\
                 Content-Disposition: attachment; filename=\"{name}\"\r\n\
                 Content-Transfer-Encoding: base64\r\n\r\n\
                 {body}\r\n",
                ct = content_type,
                name = filename,
                body = STANDARD.encode(data)
            ));
        }
        raw.push_str("--BOUNDARY--\r\n");
        raw.into_bytes()
    }
}

/// The invoice from the allowed sender used across scenarios.
pub fn invoice_message() -> Vec<u8> {
    MessageBuilder::new("Billing <billing@example.com>", "Invoice #1")
        .attachment("invoice.pdf", "application/pdf", b"%PDF-1.4 invoice")
        .build()
}

/// A message from a sender outside the allow-list.
pub fn stranger_message() -> Vec<u8> {
    MessageBuilder::new("Someone <someone@elsewhere.org>", "Invoice #2")
        .attachment("invoice2.pdf", "application/pdf", b"%PDF-1.4 other")
        .build()
}
