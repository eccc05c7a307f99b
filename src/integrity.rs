//! Read-only integrity checks over the ingestion stores
//!
//! Produces counts, never repairs. A non-clean report is a signal for an
//! operator, not an error condition; the checker runs on a cadence the
//! orchestrator decides.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::error::HeimdallResult;
use crate::repository::{EmailRepository, ThreadRepository};

/// Counts of consistency violations between threads and emails
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Threads with no stored emails
    pub orphaned_threads: usize,
    /// Threads whose message_count disagrees with the stored emails
    pub count_mismatches: usize,
    /// Emails referencing a thread id that does not exist
    pub dangling_emails: usize,
    /// Message ids stored more than once
    pub duplicate_message_ids: usize,
}

impl IntegrityReport {
    /// Whether no violations were found
    pub fn is_clean(&self) -> bool {
        self.orphaned_threads == 0
            && self.count_mismatches == 0
            && self.dangling_emails == 0
            && self.duplicate_message_ids == 0
    }
}

/// Runs read-only consistency checks against the repositories
pub struct IntegrityChecker {
    threads: Arc<dyn ThreadRepository>,
    emails: Arc<dyn EmailRepository>,
}

impl IntegrityChecker {
    pub fn new(threads: Arc<dyn ThreadRepository>, emails: Arc<dyn EmailRepository>) -> Self {
        Self { threads, emails }
    }

    /// Compute an integrity report over the current store contents
    pub async fn check(&self) -> HeimdallResult<IntegrityReport> {
        let threads = self.threads.list_all().await?;
        let stored = self.emails.list_all().await?;

        let thread_ids: HashSet<Uuid> = threads.iter().map(|t| t.id).collect();

        let mut emails_per_thread: HashMap<Uuid, u32> = HashMap::new();
        let mut seen_message_ids: HashMap<&str, u32> = HashMap::new();
        let mut dangling_emails = 0;

        for entry in &stored {
            *emails_per_thread.entry(entry.thread_id).or_default() += 1;
            *seen_message_ids
                .entry(entry.email.message_id.as_str())
                .or_default() += 1;
            if !thread_ids.contains(&entry.thread_id) {
                dangling_emails += 1;
            }
        }

        let mut orphaned_threads = 0;
        let mut count_mismatches = 0;
        for thread in &threads {
            match emails_per_thread.get(&thread.id) {
                None | Some(0) => orphaned_threads += 1,
                Some(&count) if count != thread.message_count => count_mismatches += 1,
                Some(_) => {}
            }
        }

        let duplicate_message_ids = seen_message_ids
            .values()
            .filter(|&&count| count > 1)
            .count();

        let report = IntegrityReport {
            orphaned_threads,
            count_mismatches,
            dangling_emails,
            duplicate_message_ids,
        };

        if !report.is_clean() {
            warn!(
                orphaned = report.orphaned_threads,
                mismatched = report.count_mismatches,
                dangling = report.dangling_emails,
                duplicates = report.duplicate_message_ids,
                "integrity check found inconsistencies"
            );
        }
        Ok(report)
    }
}
