//! Polling orchestration
//!
//! One orchestrator owns the advisory run lock: a second trigger while a
//! run is in progress fails fast with `JobAlreadyRunning` instead of
//! queueing. Accounts are synced sequentially and failures stay isolated
//! to their account. Every `INTEGRITY_CHECK_EVERY`-th run performs a
//! read-only integrity check; the counter is in-process and resets on
//! restart.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::connection::SessionFactory;
use crate::error::{HeimdallError, HeimdallResult};
use crate::integrity::IntegrityChecker;
use crate::reconcile::{StatusPolicy, ThreadEngine};
use crate::repository::{AccountRepository, EmailRepository, ThreadRepository};
use crate::sync::{
    AccountSyncError, AccountSyncOutcome, AccountSynchronizer, SyncRun, AUTO_ARCHIVE_AFTER_DAYS,
    INTEGRITY_CHECK_EVERY,
};
use crate::thread::ThreadStatus;

struct RunState {
    running: bool,
    completed_runs: u64,
    last_run: Option<SyncRun>,
}

/// Releases the run lock on every exit path
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().running = false;
    }
}

/// Drives polling runs across all active accounts
pub struct PollingOrchestrator {
    accounts: Arc<dyn AccountRepository>,
    threads: Arc<dyn ThreadRepository>,
    syncer: AccountSynchronizer,
    checker: IntegrityChecker,
    state: Mutex<RunState>,
}

impl PollingOrchestrator {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        accounts: Arc<dyn AccountRepository>,
        threads: Arc<dyn ThreadRepository>,
        emails: Arc<dyn EmailRepository>,
        policy: Arc<dyn StatusPolicy>,
    ) -> Self {
        let engine = Arc::new(ThreadEngine::new(threads.clone(), emails.clone(), policy));
        let syncer = AccountSynchronizer::new(factory, accounts.clone(), engine);
        let checker = IntegrityChecker::new(threads.clone(), emails);

        Self {
            accounts,
            threads,
            syncer,
            checker,
            state: Mutex::new(RunState {
                running: false,
                completed_runs: 0,
                last_run: None,
            }),
        }
    }

    /// Run one polling job across every active account.
    ///
    /// Fails fast with `JobAlreadyRunning` when a run is in progress and
    /// `NoActiveAccounts` when there is nothing to poll; both leave no
    /// trace in the run history.
    pub async fn run_polling_job(&self) -> HeimdallResult<SyncRun> {
        {
            let mut state = self.state.lock();
            if state.running {
                return Err(HeimdallError::JobAlreadyRunning);
            }
            state.running = true;
        }
        let _guard = RunGuard { state: &self.state };

        let accounts = self.accounts.list_active().await?;
        if accounts.is_empty() {
            return Err(HeimdallError::NoActiveAccounts);
        }

        let started = Instant::now();
        let started_at = OffsetDateTime::now_utc();
        let run_number = self.state.lock().completed_runs + 1;

        info!(run_number, accounts = accounts.len(), "polling run started");

        let mut emails_fetched = 0;
        let mut accounts_succeeded = 0;
        let mut errors = Vec::new();

        for mut account in accounts.clone() {
            match self.syncer.sync_account(&mut account).await {
                Ok(outcome) => {
                    emails_fetched += outcome.fetched;
                    accounts_succeeded += 1;
                }
                Err(e) => {
                    errors.push(AccountSyncError {
                        account_id: account.id,
                        message: e.to_string(),
                    });
                }
            }
        }

        let archived = self.archive_idle_closed_threads().await;
        if archived > 0 {
            info!(archived, "idle closed threads archived");
        }

        let integrity = if run_number % INTEGRITY_CHECK_EVERY == 0 {
            match self.checker.check().await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("integrity check failed: {e}");
                    None
                }
            }
        } else {
            None
        };

        let run = SyncRun {
            id: Uuid::new_v4(),
            started_at,
            accounts_attempted: accounts.len(),
            accounts_succeeded,
            emails_fetched,
            errors,
            integrity,
            duration: started.elapsed(),
        };

        info!(
            run_id = %run.id,
            attempted = run.accounts_attempted,
            succeeded = run.accounts_succeeded,
            fetched = run.emails_fetched,
            failed = run.errors.len(),
            "polling run finished"
        );

        {
            let mut state = self.state.lock();
            state.completed_runs = run_number;
            state.last_run = Some(run.clone());
        }
        Ok(run)
    }

    /// Sync one account outside the scheduled run.
    ///
    /// Precondition failures (`AccountNotFound`, `AccountInactive`) are
    /// returned before any server contact; no internal retry.
    pub async fn poll_account(&self, id: Uuid) -> HeimdallResult<AccountSyncOutcome> {
        let mut account = self
            .accounts
            .find(id)
            .await?
            .ok_or(HeimdallError::AccountNotFound(id))?;
        if !account.is_active() {
            return Err(HeimdallError::AccountInactive(id));
        }

        self.syncer.sync_account(&mut account).await
    }

    /// The most recently finished run, if any
    pub fn last_run(&self) -> Option<SyncRun> {
        self.state.lock().last_run.clone()
    }

    /// Best-effort sweep moving long-idle closed threads to Archived
    async fn archive_idle_closed_threads(&self) -> usize {
        let cutoff = OffsetDateTime::now_utc() - time::Duration::days(AUTO_ARCHIVE_AFTER_DAYS);

        let threads = match self.threads.list_all().await {
            Ok(threads) => threads,
            Err(e) => {
                warn!("archive sweep skipped, thread listing failed: {e}");
                return 0;
            }
        };

        let mut archived = 0;
        for mut thread in threads {
            if thread.status != ThreadStatus::Closed || thread.last_message_at >= cutoff {
                continue;
            }
            if !thread.transition(ThreadStatus::Archived) {
                continue;
            }
            match self.threads.update(&thread).await {
                Ok(()) => archived += 1,
                Err(e) => warn!(thread_id = %thread.id, "archive update failed: {e}"),
            }
        }
        archived
    }
}
