//! Subject line templates for outgoing messages.
//!
//! Placeholders use `{name}` syntax. The set of recognised names depends on
//! whether one file or a package of files is sent; anything else is rejected
//! when the template is parsed.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use regex::Regex;

use crate::error::ConfigError;

const PLACEHOLDER: &str = r"\{(\w+)\}";

const SINGLE_VARIABLES: &[&str] = &["filename", "date", "datetime", "size"];
const PACKAGE_VARIABLES: &[&str] = &["filenames", "file_count", "date", "datetime", "total_size"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Single,
    Package,
}

impl SubjectKind {
    pub fn variables(self) -> &'static [&'static str] {
        match self {
            SubjectKind::Single => SINGLE_VARIABLES,
            SubjectKind::Package => PACKAGE_VARIABLES,
        }
    }

    pub fn for_count(count: usize) -> Self {
        if count == 1 {
            SubjectKind::Single
        } else {
            SubjectKind::Package
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(&'static str),
}

/// A validated subject template.
#[derive(Debug, Clone)]
pub struct SubjectTemplate {
    kind: SubjectKind,
    segments: Vec<Segment>,
}

impl SubjectTemplate {
    pub fn parse(template: &str, kind: SubjectKind) -> Result<Self, ConfigError> {
        let placeholder = Regex::new(PLACEHOLDER).map_err(|e| ConfigError::InvalidPattern {
            pattern: PLACEHOLDER.to_string(),
            reason: e.to_string(),
        })?;

        let mut segments = Vec::new();
        let mut last = 0;
        for caps in placeholder.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let variable = kind
                .variables()
                .iter()
                .find(|v| **v == name.as_str())
                .copied()
                .ok_or_else(|| ConfigError::UnresolvedTemplateVariable {
                    template: template.to_string(),
                    variable: name.as_str().to_string(),
                })?;

            if whole.start() > last {
                segments.push(Segment::Literal(template[last..whole.start()].to_string()));
            }
            segments.push(Segment::Variable(variable));
            last = whole.end();
        }
        if last < template.len() {
            segments.push(Segment::Literal(template[last..].to_string()));
        }

        Ok(Self { kind, segments })
    }

    pub fn kind(&self) -> SubjectKind {
        self.kind
    }

    pub fn render(&self, context: &SubjectContext) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Variable(name) => context.get(name),
            })
            .collect()
    }
}

/// A file as seen by the subject renderer.
#[derive(Debug, Clone)]
pub struct SubjectFile<'a> {
    pub name: &'a str,
    pub size: u64,
}

/// Variable values for one outgoing batch.
#[derive(Debug, Clone, Default)]
pub struct SubjectContext {
    values: HashMap<&'static str, String>,
}

impl SubjectContext {
    pub fn new(files: &[SubjectFile<'_>], now: DateTime<Local>) -> Self {
        let mut values = HashMap::new();
        values.insert("date", now.format("%Y-%m-%d").to_string());
        values.insert("datetime", now.format("%Y-%m-%d %H:%M:%S").to_string());

        if let [file] = files {
            values.insert("filename", file.name.to_string());
            values.insert("size", file.size.to_string());
        }

        let names: Vec<&str> = files.iter().map(|f| f.name).collect();
        values.insert("filenames", names.join(", "));
        values.insert("file_count", files.len().to_string());
        values.insert(
            "total_size",
            files.iter().map(|f| f.size).sum::<u64>().to_string(),
        );

        Self { values }
    }

    fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Subject for `files`, from the matching template or the built-in default.
pub fn create_subject(
    files: &[SubjectFile<'_>],
    single: Option<&SubjectTemplate>,
    package: Option<&SubjectTemplate>,
    now: DateTime<Local>,
) -> String {
    let context = SubjectContext::new(files, now);
    let template = match SubjectKind::for_count(files.len()) {
        SubjectKind::Single => single,
        SubjectKind::Package => package,
    };

    match (template, files) {
        (Some(template), _) => template.render(&context),
        (None, [file]) => file.name.to_string(),
        (None, _) => format!("Package of files - {}", context.get("datetime")),
    }
}
