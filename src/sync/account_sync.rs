//! Per-account synchronization
//!
//! The sequence for one account: open a session, select the ingest
//! folder, fetch unread messages, parse and reconcile each one, mark the
//! ingested ones read, update account bookkeeping, disconnect. A message
//! that fails to parse is skipped; a message that fails to reconcile is
//! left unread on the server so the next run picks it up again.

use std::sync::Arc;
use tracing::{info, warn};

use crate::account::Account;
use crate::connection::{MailboxSession, SessionFactory};
use crate::error::HeimdallResult;
use crate::parser::MessageParser;
use crate::reconcile::ThreadEngine;
use crate::repository::AccountRepository;
use crate::sync::{AccountSyncOutcome, FETCH_BATCH_LIMIT};

/// Syncs one account against its mailbox server
pub struct AccountSynchronizer {
    factory: Arc<dyn SessionFactory>,
    accounts: Arc<dyn AccountRepository>,
    engine: Arc<ThreadEngine>,
    parser: MessageParser,
    batch_limit: usize,
}

impl AccountSynchronizer {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        accounts: Arc<dyn AccountRepository>,
        engine: Arc<ThreadEngine>,
    ) -> Self {
        Self {
            factory,
            accounts,
            engine,
            parser: MessageParser::new(),
            batch_limit: FETCH_BATCH_LIMIT,
        }
    }

    /// Override the per-run fetch bound
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Run one sync for the account, updating its bookkeeping.
    ///
    /// The account mutation (success stamp or failure count, including
    /// the soft-disable) is persisted through the account repository on
    /// both paths.
    pub async fn sync_account(&self, account: &mut Account) -> HeimdallResult<AccountSyncOutcome> {
        let result = self.run(account).await;

        match &result {
            Ok(outcome) => {
                account.record_success();
                info!(
                    account_id = %account.id,
                    fetched = outcome.fetched,
                    ingested = outcome.ingested,
                    parse_failures = outcome.parse_failures,
                    reconcile_failures = outcome.reconcile_failures,
                    "account sync complete"
                );
            }
            Err(e) => {
                account.record_failure(e.to_string());
                warn!(account_id = %account.id, "account sync failed: {e}");
            }
        }

        if let Err(e) = self.accounts.update(account).await {
            warn!(account_id = %account.id, "account bookkeeping update failed: {e}");
        }
        result
    }

    async fn run(&self, account: &Account) -> HeimdallResult<AccountSyncOutcome> {
        let mut session = self.factory.open(account).await?;
        let result = self.ingest(session.as_mut(), account).await;

        // the session is closed on success and failure alike
        if let Err(e) = session.disconnect().await {
            warn!(account_id = %account.id, "disconnect failed: {e}");
        }
        result
    }

    async fn ingest(
        &self,
        session: &mut dyn MailboxSession,
        account: &Account,
    ) -> HeimdallResult<AccountSyncOutcome> {
        session.select_folder(&account.folder).await?;
        let messages = session.fetch_messages(self.batch_limit, true).await?;

        let mut outcome = AccountSyncOutcome {
            fetched: messages.len(),
            ..AccountSyncOutcome::default()
        };
        let mut ingested_uids = Vec::new();

        for raw in &messages {
            let email = match self.parser.parse(raw) {
                Ok(email) => email,
                Err(e) => {
                    warn!(
                        account_id = %account.id,
                        server_id = raw.server_id,
                        "skipping unparseable message: {e}"
                    );
                    outcome.parse_failures += 1;
                    continue;
                }
            };

            match self.engine.reconcile(&email).await {
                Ok(_) => {
                    outcome.ingested += 1;
                    ingested_uids.push(raw.server_id);
                }
                Err(e) => {
                    // left unread on the server; the next run retries it
                    warn!(
                        account_id = %account.id,
                        message_id = %email.message_id,
                        "reconciliation failed, message left unread: {e}"
                    );
                    outcome.reconcile_failures += 1;
                }
            }
        }

        for uid in ingested_uids {
            if let Err(e) = session.mark_read(uid).await {
                warn!(account_id = %account.id, uid, "mark read failed: {e}");
            }
        }

        Ok(outcome)
    }
}
