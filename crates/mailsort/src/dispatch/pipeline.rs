use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::SmtpConfig;
use crate::error::StorageError;
use crate::tracker::{hash_file, SentFileTracker};
use crate::transport::{MailSender, OutgoingAttachment, OutgoingMessage, TransportError};

use super::subject::{create_subject, SubjectFile, SubjectKind, SubjectTemplate};
use super::{DispatchError, Result};

/// A file that has not been sent in its current form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub hash: String,
}

/// Outcome of one dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub messages_sent: usize,
    pub messages_failed: usize,
    pub files_sent: usize,
    pub files_failed: usize,
    /// Files skipped because identical content was sent before.
    pub already_sent: usize,
    /// Files that alone exceed the message size limit.
    pub oversized: Vec<PathBuf>,
    /// Files that vanished or could not be read before sending.
    pub unreadable: Vec<PathBuf>,
    pub dry_run: bool,
}

impl DispatchSummary {
    pub fn has_failures(&self) -> bool {
        self.messages_failed > 0 || !self.oversized.is_empty() || !self.unreadable.is_empty()
    }
}

/// Approximate wire size: content plus a third for base64 encoding.
pub fn estimate_message_size(sizes: impl IntoIterator<Item = u64>) -> u64 {
    let total: u64 = sizes.into_iter().sum();
    total + total * 33 / 100
}

/// Groups files in order so each group's estimated size stays under `max_size`.
///
/// A file that does not fit together with the current group starts a new
/// one. Callers remove files larger than `max_size` beforehand.
pub fn split_by_size(files: Vec<PendingFile>, max_size: u64) -> Vec<Vec<PendingFile>> {
    let mut groups = Vec::new();
    let mut current: Vec<PendingFile> = Vec::new();

    for file in files {
        let with_file =
            estimate_message_size(current.iter().map(|f| f.size).chain(std::iter::once(file.size)));
        if with_file > max_size && !current.is_empty() {
            debug!(
                "Starting new message before {} ({} files in previous)",
                file.name,
                current.len()
            );
            groups.push(std::mem::take(&mut current));
        }
        current.push(file);
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Regular files directly inside `folder`, sorted by name.
pub fn list_folder(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(DispatchError::NotADirectory(folder.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

fn body_for(files: &[PendingFile]) -> String {
    match files {
        [file] => format!("Attached file: {}", file.name),
        _ => {
            let mut body = format!("Attached {} files:", files.len());
            for file in files {
                body.push_str(&format!("\n  - {}", file.name));
            }
            body
        }
    }
}

/// Size and content hash of a regular file.
fn inspect(path: &Path) -> Result<(u64, String)> {
    let metadata = std::fs::metadata(path).map_err(|e| StorageError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    if !metadata.is_file() {
        return Err(DispatchError::NotAFile(path.to_path_buf()));
    }
    Ok((metadata.len(), hash_file(path)?))
}

fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Sends files not yet recorded in the sent-file tracker.
pub struct DispatchPipeline<'a> {
    from: String,
    max_message_size: u64,
    keep_sent_days: u32,
    single_template: Option<SubjectTemplate>,
    package_template: Option<SubjectTemplate>,
    tracker: &'a mut SentFileTracker,
}

impl<'a> DispatchPipeline<'a> {
    /// Validates the subject templates before anything touches the network.
    pub fn new(config: &SmtpConfig, tracker: &'a mut SentFileTracker) -> Result<Self> {
        let single_template = config
            .subject_template
            .as_deref()
            .map(|t| SubjectTemplate::parse(t, SubjectKind::Single))
            .transpose()?;
        let package_template = config
            .subject_template_package
            .as_deref()
            .map(|t| SubjectTemplate::parse(t, SubjectKind::Package))
            .transpose()?;

        Ok(Self {
            from: config.from_address.clone(),
            max_message_size: config.max_email_size_bytes(),
            keep_sent_days: config.keep_sent_days,
            single_template,
            package_template,
            tracker,
        })
    }

    /// Hashes `paths` and keeps those whose content has not been sent.
    ///
    /// Paths that are missing, not regular files, or unreadable are logged,
    /// listed in `summary.unreadable` and skipped.
    pub fn pending(&self, paths: &[PathBuf], summary: &mut DispatchSummary) -> Vec<PendingFile> {
        let mut pending = Vec::new();
        for path in paths {
            let (size, hash) = match inspect(path) {
                Ok(found) => found,
                Err(e) => {
                    error!("Skipping {}: {}", path.display(), e);
                    summary.unreadable.push(path.clone());
                    continue;
                }
            };
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            if self.tracker.is_sent(&hash) {
                info!("Skipping {}: identical content already sent", name);
                summary.already_sent += 1;
                continue;
            }

            pending.push(PendingFile {
                path: path.clone(),
                name,
                size,
                hash,
            });
        }
        pending
    }

    /// Sends every pending file in `paths` to `recipient`.
    ///
    /// Pass `None` as `sender` for a dry run. Each message is sent on its own
    /// and only files in delivered messages are recorded, so a failed message
    /// leaves its files eligible for the next run. Authentication failures
    /// abort the run.
    pub async fn dispatch<S: MailSender + ?Sized>(
        &mut self,
        paths: &[PathBuf],
        recipient: &str,
        subject: Option<&str>,
        sender: Option<&S>,
    ) -> Result<DispatchSummary> {
        let span = info_span!("dispatch", recipient = %recipient, files = paths.len());
        self.dispatch_inner(paths, recipient, subject, sender)
            .instrument(span)
            .await
    }

    async fn dispatch_inner<S: MailSender + ?Sized>(
        &mut self,
        paths: &[PathBuf],
        recipient: &str,
        subject: Option<&str>,
        sender: Option<&S>,
    ) -> Result<DispatchSummary> {
        let mut summary = DispatchSummary {
            dry_run: sender.is_none(),
            ..Default::default()
        };

        if !summary.dry_run {
            self.tracker.prune(self.keep_sent_days, Utc::now())?;
        }

        let (pending, oversized): (Vec<_>, Vec<_>) = self
            .pending(paths, &mut summary)
            .into_iter()
            .partition(|f| f.size <= self.max_message_size);

        for file in oversized {
            error!(
                "{} ({} bytes) exceeds the maximum message size of {} bytes; not sent",
                file.name, file.size, self.max_message_size
            );
            summary.oversized.push(file.path);
        }

        if pending.is_empty() {
            info!("No new files to send");
            return Ok(summary);
        }

        let subject = match subject {
            Some(subject) => subject.to_string(),
            None => {
                let files: Vec<SubjectFile<'_>> = pending
                    .iter()
                    .map(|f| SubjectFile {
                        name: &f.name,
                        size: f.size,
                    })
                    .collect();
                create_subject(
                    &files,
                    self.single_template.as_ref(),
                    self.package_template.as_ref(),
                    Local::now(),
                )
            }
        };

        let groups = split_by_size(pending, self.max_message_size);
        let total = groups.len();
        if total > 1 {
            warn!("Files split into {} messages", total);
        }

        for (index, group) in groups.into_iter().enumerate() {
            let group_subject = if total > 1 {
                format!("{} (part {}/{})", subject, index + 1, total)
            } else {
                subject.clone()
            };

            let Some(sender) = sender else {
                info!(
                    "[dry run] would send '{}' with {} files: {}",
                    group_subject,
                    group.len(),
                    group.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", ")
                );
                continue;
            };

            match self.send_group(sender, &group, recipient, group_subject.clone()).await {
                Ok(()) => {
                    let now = Utc::now();
                    self.tracker.record_batch(
                        group.iter().map(|f| (f.hash.as_str(), f.path.as_path())),
                        now,
                    )?;
                    info!("Sent '{}' to {}", group_subject, recipient);
                    summary.messages_sent += 1;
                    summary.files_sent += group.len();
                }
                Err(DispatchError::Transport(e @ TransportError::AuthenticationFailed(_))) => {
                    return Err(e.into());
                }
                Err(e) => {
                    error!("Failed to send '{}': {}", group_subject, e);
                    summary.messages_failed += 1;
                    summary.files_failed += group.len();
                }
            }
        }

        info!(
            "Dispatch finished: {} messages sent, {} failed, {} files already sent, {} unreadable",
            summary.messages_sent,
            summary.messages_failed,
            summary.already_sent,
            summary.unreadable.len()
        );
        Ok(summary)
    }

    async fn send_group<S: MailSender + ?Sized>(
        &self,
        sender: &S,
        group: &[PendingFile],
        recipient: &str,
        subject: String,
    ) -> Result<()> {
        let mut attachments = Vec::with_capacity(group.len());
        for file in group {
            let data = std::fs::read(&file.path).map_err(|e| StorageError::ReadFile {
                path: file.path.clone(),
                source: e,
            })?;
            attachments.push(OutgoingAttachment {
                filename: file.name.clone(),
                content_type: content_type_for(&file.path),
                data,
            });
        }

        let message = OutgoingMessage {
            from: self.from.clone(),
            to: recipient.to_string(),
            subject,
            body: body_for(group),
            attachments,
        };

        sender.send(&message).await?;
        Ok(())
    }
}
