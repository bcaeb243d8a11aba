//! Sender eligibility, subject routing and attachment filtering.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::config::schema::{Config, RoutingRule};
use crate::config::{loader::validate_routing, normalize_extensions};
use crate::error::ConfigError;

struct CompiledRule {
    regex: Regex,
    folder: PathBuf,
}

/// Destination chosen for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route<'a> {
    pub folder: &'a Path,
    pub rule_index: usize,
    /// True when only the trailing default rule matched.
    pub is_catch_all: bool,
}

impl Route<'_> {
    /// Mapped messages were claimed by a specific rule.
    pub fn is_mapped(&self) -> bool {
        !self.is_catch_all
    }
}

pub struct Classifier {
    allowed_senders: HashSet<String>,
    rules: Vec<CompiledRule>,
}

impl Classifier {
    /// Compiles the routing table. The last rule must be a catch-all.
    pub fn new(allowed_senders: &[String], routing: &[RoutingRule]) -> Result<Self, ConfigError> {
        validate_routing(routing)?;

        let rules = routing
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|regex| CompiledRule {
                        regex,
                        folder: rule.folder.clone(),
                    })
                    .map_err(|e| ConfigError::InvalidPattern {
                        pattern: rule.pattern.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let allowed_senders = allowed_senders
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            allowed_senders,
            rules,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(&config.allowed_senders, &config.routing)
    }

    /// Case-insensitive allow-list membership. An empty list admits nobody.
    pub fn is_eligible(&self, sender: &str) -> bool {
        let sender = sender.trim();
        !sender.is_empty() && self.allowed_senders.contains(&sender.to_lowercase())
    }

    /// First matching rule wins; the catch-all answers when nothing else does.
    pub fn route(&self, subject: &str) -> Route<'_> {
        let last = self.rules.len() - 1;
        let index = self
            .rules
            .iter()
            .position(|rule| rule.regex.is_match(subject))
            .unwrap_or(last);

        Route {
            folder: &self.rules[index].folder,
            rule_index: index,
            is_catch_all: index == last,
        }
    }
}

/// Why an attachment was not saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Blocked { extension: String },
    NotAllowed { extension: String },
    TooLarge { size: u64, limit: u64 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Blocked { extension } => write!(f, "extension '{}' is blocked", extension),
            RejectReason::NotAllowed { extension } => {
                write!(f, "extension '{}' is not in the allow-list", extension)
            }
            RejectReason::TooLarge { size, limit } => {
                write!(f, "size {} exceeds limit {}", size, limit)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Accepted,
    Rejected(RejectReason),
}

impl FilterDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FilterDecision::Accepted)
    }
}

/// Per-attachment extension and size filter. The block-list always wins.
#[derive(Debug, Clone, Default)]
pub struct ExtensionFilter {
    allowed: Vec<String>,
    blocked: Vec<String>,
    max_size: Option<u64>,
}

impl ExtensionFilter {
    pub fn new(allowed: &[String], blocked: &[String]) -> Self {
        Self {
            allowed: normalize_extensions(allowed),
            blocked: normalize_extensions(blocked),
            max_size: None,
        }
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.processing.allowed_extensions,
            &config.processing.blocked_extensions,
        )
        .with_max_size(config.processing.max_attachment_size)
    }

    pub fn check(&self, filename: &str, size: u64) -> FilterDecision {
        let extension = extension_of(filename);

        if self.blocked.contains(&extension) {
            return FilterDecision::Rejected(RejectReason::Blocked { extension });
        }

        if !self.allowed.is_empty() && !self.allowed.contains(&extension) {
            return FilterDecision::Rejected(RejectReason::NotAllowed { extension });
        }

        match self.max_size {
            Some(limit) if size > limit => {
                FilterDecision::Rejected(RejectReason::TooLarge { size, limit })
            }
            _ => FilterDecision::Accepted,
        }
    }
}

/// Lowercase extension with a leading dot, or an empty string.
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
