//! Per-message state machine for the ingestion run.
//!
//! Headers are fetched for the whole search window first. Only eligible,
//! unseen messages get their body fetched. A message is marked processed as
//! the very last step, after its attachments are on disk and the optional
//! archive move went through, so an interrupted run leaves it eligible.

use std::path::PathBuf;

use chrono::{Duration, NaiveDate};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::classifier::{Classifier, ExtensionFilter, FilterDecision};
use crate::config::{Config, ProcessingConfig};
use crate::email::{parse_full_message, parse_header_record, FetchedMessage, FullMessage};
use crate::error::{MailsortError, Result, StorageError};
use crate::storage::{file_stats, AttachmentStore, FsSpaceProbe, SpaceProbe};
use crate::tracker::ProcessedSet;
use crate::transport::{MailboxSession, TransportError};

use super::summary::RunSummary;

/// Terminal state of one message in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Uid already in the processed ledger; body never fetched.
    AlreadyProcessed,
    /// Sender not allowed; `marked` tells whether it went to the ledger.
    Ineligible { marked: bool },
    /// At least one attachment could not be written; left for a later run.
    Deferred,
    /// Fetch or parse failed; left for a later run.
    Failed,
    Completed { saved: usize, archived: bool },
}

pub struct IngestPipeline<P: SpaceProbe = FsSpaceProbe> {
    mailbox: String,
    processing: ProcessingConfig,
    classifier: Classifier,
    filter: ExtensionFilter,
    store: AttachmentStore<P>,
    processed: ProcessedSet,
    dry_run: bool,
}

impl IngestPipeline<FsSpaceProbe> {
    pub fn new(config: &Config) -> Result<Self> {
        let store = AttachmentStore::new(
            &config.processing.download_dir,
            config.processing.disk_safety_margin,
        );
        Self::with_store(config, store)
    }
}

impl<P: SpaceProbe> IngestPipeline<P> {
    /// Builds the pipeline around an explicit attachment store.
    pub fn with_store(config: &Config, store: AttachmentStore<P>) -> Result<Self> {
        let classifier = Classifier::from_config(config)?;
        let processed = ProcessedSet::open(&config.processing.processed_dir)?;

        Ok(Self {
            mailbox: config.imap.mailbox.clone(),
            processing: config.processing.clone(),
            classifier,
            filter: ExtensionFilter::from_config(config),
            store,
            processed,
            dry_run: false,
        })
    }

    /// Dry runs log every decision but write nothing and archive nothing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    /// Runs one pass over the search window ending at `today`.
    pub async fn run<S: MailboxSession + ?Sized>(
        &mut self,
        session: &mut S,
        today: NaiveDate,
    ) -> Result<RunSummary> {
        let span = info_span!("ingest", mailbox = %self.mailbox, dry_run = self.dry_run);
        self.run_inner(session, today).instrument(span).await
    }

    async fn run_inner<S: MailboxSession + ?Sized>(
        &mut self,
        session: &mut S,
        today: NaiveDate,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary {
            dry_run: self.dry_run,
            ..Default::default()
        };

        if !self.dry_run {
            self.processed
                .prune(self.processing.keep_processed_days, today)?;
        }

        let count = session.select(&self.mailbox).await?;
        debug!("Mailbox {} holds {} messages", self.mailbox, count);

        let since = today - Duration::days(i64::from(self.processing.start_days_back));
        let uids = session.search_since(since).await?;
        if uids.is_empty() {
            info!("No messages since {}", since);
            return Ok(self.finish(summary));
        }
        info!("Found {} messages since {}", uids.len(), since);

        let headers = session.fetch_headers(&uids).await?;
        for (uid, raw) in headers {
            let header = match parse_header_record(uid, &raw) {
                Ok(header) => header,
                Err(e) => {
                    error!("{}", e);
                    summary.errors += 1;
                    continue;
                }
            };

            let outcome = self
                .process(session, FetchedMessage::HeaderOnly(header), &mut summary)
                .instrument(info_span!("message", uid))
                .await?;
            debug!("UID {} finished as {:?}", uid, outcome);
        }

        Ok(self.finish(summary))
    }

    fn finish(&self, mut summary: RunSummary) -> RunSummary {
        if !self.dry_run {
            summary.file_stats = file_stats(self.store.download_dir());
        }
        info!("Ingestion finished: {}", summary);
        summary
    }

    /// Drives one message from its header to a terminal state.
    ///
    /// Only ledger failures and lost sessions abort the run; everything else
    /// is counted and the message stays eligible.
    async fn process<S: MailboxSession + ?Sized>(
        &mut self,
        session: &mut S,
        mut message: FetchedMessage,
        summary: &mut RunSummary,
    ) -> Result<MessageOutcome> {
        loop {
            let header = match message {
                FetchedMessage::HeaderOnly(header) => header,
                FetchedMessage::Full(full) => return self.complete(session, full, summary).await,
            };

            if self.processed.contains(header.uid, header.date)? {
                debug!("UID {} already processed", header.uid);
                summary.skipped += 1;
                return Ok(MessageOutcome::AlreadyProcessed);
            }

            if !self.classifier.is_eligible(&header.sender) {
                info!(
                    "Skipping UID {} from {}: sender not allowed",
                    header.uid, header.sender
                );
                summary.skipped += 1;
                let marked = self.processing.mark_ineligible_processed && !self.dry_run;
                if marked {
                    self.processed.mark(header.uid, header.date)?;
                }
                return Ok(MessageOutcome::Ineligible { marked });
            }

            let uid = header.uid;
            let raw = match session.fetch_message(uid).await {
                Ok(raw) => raw,
                Err(e) => return fail_on_transport(e, uid, summary),
            };

            message = match parse_full_message(header, raw) {
                Ok(full) => FetchedMessage::Full(full),
                Err(e) => {
                    error!("{}", e);
                    summary.errors += 1;
                    return Ok(MessageOutcome::Failed);
                }
            };
        }
    }

    async fn complete<S: MailboxSession + ?Sized>(
        &mut self,
        session: &mut S,
        message: FullMessage,
        summary: &mut RunSummary,
    ) -> Result<MessageOutcome> {
        let header = &message.header;
        let route = self.classifier.route(&header.subject);
        let folder: PathBuf = route.folder.to_path_buf();
        let mapped = route.is_mapped();
        info!(
            "UID {} '{}' routed to {}",
            header.uid,
            header.subject,
            folder.display()
        );

        let mut accepted = Vec::with_capacity(message.attachments.len());
        for attachment in &message.attachments {
            match self.filter.check(&attachment.filename, attachment.size()) {
                FilterDecision::Rejected(reason) => {
                    info!("Rejected attachment {}: {}", attachment.filename, reason);
                    summary.attachments_rejected += 1;
                }
                FilterDecision::Accepted => accepted.push(attachment),
            }
        }

        let mut saved = 0;
        let mut deferred = false;
        if self.dry_run {
            for attachment in &accepted {
                info!(
                    "[dry run] would save {} ({} bytes) to {}",
                    attachment.filename,
                    attachment.size(),
                    folder.display()
                );
            }
        } else if !accepted.is_empty() {
            // Space for every accepted attachment is checked before the first write.
            let total: u64 = accepted.iter().map(|a| a.size()).sum();
            let reserved = self
                .store
                .resolve_target(&folder)
                .and_then(|dir| self.store.check_space(&dir, total));
            match reserved {
                Ok(()) => {}
                Err(StorageError::DiskSpaceExceeded {
                    required, available, ..
                }) => {
                    warn!(
                        "Deferring UID {}: {} attachments need {} bytes, {} available",
                        header.uid,
                        accepted.len(),
                        required,
                        available
                    );
                    summary.disk_space_deferrals += accepted.len();
                    return Ok(MessageOutcome::Deferred);
                }
                Err(e) => {
                    error!("Cannot save attachments of UID {}: {}", header.uid, e);
                    summary.errors += 1;
                    return Ok(MessageOutcome::Deferred);
                }
            }

            for attachment in &accepted {
                match self
                    .store
                    .store(&folder, &attachment.filename, &attachment.data)
                {
                    Ok(path) => {
                        info!("Saved {}", path.display());
                        saved += 1;
                        summary.attachments_saved += 1;
                    }
                    Err(StorageError::DiskSpaceExceeded {
                        required, available, ..
                    }) => {
                        warn!(
                            "Deferring {}: need {} bytes, {} available",
                            attachment.filename, required, available
                        );
                        summary.disk_space_deferrals += 1;
                        deferred = true;
                    }
                    Err(e) => {
                        error!("Failed to save {}: {}", attachment.filename, e);
                        summary.errors += 1;
                        deferred = true;
                    }
                }
            }
        }

        if message.attachments.is_empty() {
            debug!("UID {} has no attachments", header.uid);
        }

        if deferred {
            return Ok(MessageOutcome::Deferred);
        }

        let wants_archive = self.processing.archive_enabled
            && (mapped || !self.processing.archive_only_mapped);

        if self.dry_run {
            if wants_archive {
                info!(
                    "[dry run] would archive UID {} to {}",
                    header.uid, self.processing.archive_folder
                );
            }
            summary.processed += 1;
            return Ok(MessageOutcome::Completed {
                saved,
                archived: false,
            });
        }

        let mut archived = false;
        if wants_archive {
            match session
                .archive(header.uid, &self.processing.archive_folder)
                .await
            {
                Ok(()) => {
                    info!(
                        "Archived UID {} to {}",
                        header.uid, self.processing.archive_folder
                    );
                    archived = true;
                    summary.archived += 1;
                }
                Err(e) if aborts_run(&e) => return Err(e.into()),
                Err(e) => {
                    error!("Failed to archive UID {}: {}", header.uid, e);
                    summary.errors += 1;
                }
            }
        }

        self.processed.mark(header.uid, header.date)?;
        summary.processed += 1;
        Ok(MessageOutcome::Completed { saved, archived })
    }
}

fn aborts_run(e: &TransportError) -> bool {
    matches!(
        e,
        TransportError::AuthenticationFailed(_) | TransportError::NotConnected
    )
}

fn fail_on_transport(
    e: TransportError,
    uid: u32,
    summary: &mut RunSummary,
) -> Result<MessageOutcome> {
    if aborts_run(&e) {
        return Err(MailsortError::Transport(e));
    }
    error!("Failed to fetch UID {}: {}", uid, e);
    summary.errors += 1;
    Ok(MessageOutcome::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_session_loss_aborts() {
        assert!(aborts_run(&TransportError::NotConnected));
        assert!(aborts_run(&TransportError::AuthenticationFailed(
            "535".to_string()
        )));
        assert!(!aborts_run(&TransportError::Transient("timeout".to_string())));
        assert!(!aborts_run(&TransportError::FolderNotFound(
            "Archive".to_string()
        )));
    }

    #[test]
    fn test_fetch_failure_is_counted() {
        let mut summary = RunSummary::default();
        let outcome = fail_on_transport(
            TransportError::Permanent("gone".to_string()),
            7,
            &mut summary,
        )
        .unwrap();
        assert_eq!(outcome, MessageOutcome::Failed);
        assert_eq!(summary.errors, 1);
    }
}
