//! Polling synchronization for Heimdall Desk
//!
//! One polling run walks every active account sequentially: fetch unread
//! mail, parse, reconcile into threads, mark read. Account failures are
//! isolated; the run completes and reports them.

pub mod account_sync;
pub mod orchestrator;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::integrity::IntegrityReport;

pub use account_sync::AccountSynchronizer;
pub use orchestrator::PollingOrchestrator;

/// Maximum messages fetched from one account per run
pub const FETCH_BATCH_LIMIT: usize = 50;

/// Polling runs between integrity checks
pub const INTEGRITY_CHECK_EVERY: u64 = 10;

/// Closed threads idle this long are archived by the run sweep
pub const AUTO_ARCHIVE_AFTER_DAYS: i64 = 30;

/// Failure detail for one account within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSyncError {
    /// The account that failed
    pub account_id: Uuid,
    /// Error rendering
    pub message: String,
}

/// Result of syncing one account
#[derive(Debug, Clone, Default)]
pub struct AccountSyncOutcome {
    /// Messages fetched from the server
    pub fetched: usize,
    /// Emails reconciled into threads
    pub ingested: usize,
    /// Messages skipped because parsing failed
    pub parse_failures: usize,
    /// Emails left unconsumed because reconciliation failed
    pub reconcile_failures: usize,
}

/// Summary of one polling run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    /// Run id
    pub id: Uuid,
    /// When the run started
    pub started_at: OffsetDateTime,
    /// Accounts the run attempted
    pub accounts_attempted: usize,
    /// Accounts that completed without error
    pub accounts_succeeded: usize,
    /// Emails fetched across all accounts
    pub emails_fetched: usize,
    /// Per-account failures
    pub errors: Vec<AccountSyncError>,
    /// Integrity report, present on cadence runs
    pub integrity: Option<IntegrityReport>,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

impl SyncRun {
    /// Whether every attempted account succeeded
    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty()
    }
}
