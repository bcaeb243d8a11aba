use std::path::{Path, PathBuf};

use regex::Regex;

use crate::config::schema::{Config, RoutingRule};
use crate::dispatch::subject::{SubjectKind, SubjectTemplate};
use crate::error::ConfigError;

/// Subjects the final routing rule must match to count as a catch-all.
const CATCH_ALL_SAMPLES: &[&str] = &["", "Invoice #1", "\u{00e9}t\u{00e9} 2024 / re: fwd"];

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let mut config: Config = serde_yaml::from_str(content)?;

    validate_config(&config)?;

    config.processing.allowed_extensions =
        normalize_extensions(&config.processing.allowed_extensions);
    config.processing.blocked_extensions =
        normalize_extensions(&config.processing.blocked_extensions);

    Ok(config)
}

/// Default location of the configuration file (`<config dir>/mailsort/config.yaml`).
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("mailsort"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.yaml")
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.imap.server.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "'imap.server' must not be empty".to_string(),
        });
    }

    if config.imap.user.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "'imap.user' must not be empty".to_string(),
        });
    }

    if config.imap.max_retries == 0 {
        return Err(ConfigError::Validation {
            message: "'imap.max_retries' must be at least 1".to_string(),
        });
    }

    validate_routing(&config.routing)?;

    if let Some(smtp) = &config.smtp {
        if smtp.server.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "'smtp.server' must not be empty".to_string(),
            });
        }
        if smtp.from_address.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "'smtp.from_address' must not be empty".to_string(),
            });
        }
        if smtp.max_email_size <= 0.0 {
            return Err(ConfigError::Validation {
                message: "'smtp.max_email_size' must be positive".to_string(),
            });
        }
        if let Some(template) = &smtp.subject_template {
            SubjectTemplate::parse(template, SubjectKind::Single)?;
        }
        if let Some(template) = &smtp.subject_template_package {
            SubjectTemplate::parse(template, SubjectKind::Package)?;
        }
    }

    Ok(())
}

/// Checks every routing pattern compiles and that the last one is a catch-all.
pub fn validate_routing(rules: &[RoutingRule]) -> Result<(), ConfigError> {
    let last = rules.last().ok_or_else(|| ConfigError::Validation {
        message: "'routing' must contain at least one rule".to_string(),
    })?;

    for rule in rules {
        if let Err(e) = Regex::new(&rule.pattern) {
            return Err(ConfigError::InvalidPattern {
                pattern: rule.pattern.clone(),
                reason: e.to_string(),
            });
        }
    }

    let catch_all = Regex::new(&last.pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: last.pattern.clone(),
        reason: e.to_string(),
    })?;
    if !CATCH_ALL_SAMPLES.iter().all(|sample| catch_all.is_match(sample)) {
        return Err(ConfigError::MissingCatchAll {
            pattern: last.pattern.clone(),
        });
    }

    Ok(())
}

/// Lowercases extensions and ensures a single leading dot.
pub fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext))
        .collect()
}
