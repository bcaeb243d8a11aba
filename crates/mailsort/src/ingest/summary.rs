use std::collections::BTreeMap;
use std::fmt;

/// Counters for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages that reached the processed ledger in this run.
    pub processed: usize,
    /// Already handled or ineligible messages.
    pub skipped: usize,
    pub errors: usize,
    pub attachments_saved: usize,
    pub attachments_rejected: usize,
    /// Attachments not written for lack of disk space.
    pub disk_space_deferrals: usize,
    pub archived: usize,
    /// Files per extension below the download directory, after a real run.
    pub file_stats: BTreeMap<String, usize>,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            write!(f, "[dry run] ")?;
        }
        write!(
            f,
            "processed {}, skipped {}, errors {}, saved {}, rejected {}, deferred {}, archived {}",
            self.processed,
            self.skipped,
            self.errors,
            self.attachments_saved,
            self.attachments_rejected,
            self.disk_space_deferrals,
            self.archived
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let summary = RunSummary {
            processed: 2,
            skipped: 1,
            attachments_saved: 1,
            archived: 1,
            ..Default::default()
        };
        assert_eq!(
            summary.to_string(),
            "processed 2, skipped 1, errors 0, saved 1, rejected 0, deferred 0, archived 1"
        );
        assert!(!summary.has_errors());
    }

    #[test]
    fn test_dry_run_prefix() {
        let summary = RunSummary {
            dry_run: true,
            ..Default::default()
        };
        assert!(summary.to_string().starts_with("[dry run] "));
    }
}
