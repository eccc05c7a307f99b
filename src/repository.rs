//! Persistence seams for Heimdall Desk
//!
//! The ingestion engine talks to storage through these traits; the
//! concrete backend is the host application's concern. [`InMemoryStore`]
//! implements all three and backs the default wiring and the test
//! suites.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::account::Account;
use crate::email::ParsedEmail;
use crate::error::{HeimdallError, HeimdallResult};
use crate::thread::Thread;

/// A parsed email as stored, bound to its thread
#[derive(Debug, Clone)]
pub struct StoredEmail {
    /// Owning thread
    pub thread_id: Uuid,
    /// The email itself
    pub email: ParsedEmail,
}

/// Account storage used by the polling orchestrator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Accounts that participate in polling runs
    async fn list_active(&self) -> HeimdallResult<Vec<Account>>;

    /// Look up one account
    async fn find(&self, id: Uuid) -> HeimdallResult<Option<Account>>;

    /// Add an account
    async fn insert(&self, account: &Account) -> HeimdallResult<()>;

    /// Persist account bookkeeping changes
    async fn update(&self, account: &Account) -> HeimdallResult<()>;
}

/// Thread storage used by the reconciliation engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThreadRepository: Send + Sync {
    /// Look up a thread by its reconciliation key
    async fn find_by_key(&self, thread_key: &str) -> HeimdallResult<Option<Thread>>;

    /// Look up a thread by id
    async fn find(&self, id: Uuid) -> HeimdallResult<Option<Thread>>;

    /// Store a newly created thread
    async fn insert(&self, thread: &Thread) -> HeimdallResult<()>;

    /// Persist changes to an existing thread
    async fn update(&self, thread: &Thread) -> HeimdallResult<()>;

    /// All threads; integrity checks and archival sweeps read this
    async fn list_all(&self) -> HeimdallResult<Vec<Thread>>;
}

/// Email storage used by the reconciliation engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailRepository: Send + Sync {
    /// Store an email under a thread, keyed by message id. Returns true
    /// when the email was newly stored, false when the message id was
    /// already present.
    async fn upsert(&self, thread_id: Uuid, email: &ParsedEmail) -> HeimdallResult<bool>;

    /// Emails belonging to one thread
    async fn list_by_thread(&self, thread_id: Uuid) -> HeimdallResult<Vec<ParsedEmail>>;

    /// All stored emails; integrity checks read this
    async fn list_all(&self) -> HeimdallResult<Vec<StoredEmail>>;
}

/// Process-local store backing tests and the default wiring
#[derive(Default)]
pub struct InMemoryStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
    threads: RwLock<HashMap<Uuid, Thread>>,
    emails: RwLock<HashMap<String, StoredEmail>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn list_active(&self) -> HeimdallResult<Vec<Account>> {
        let mut active: Vec<Account> = self
            .accounts
            .read()
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|a| a.created_at);
        Ok(active)
    }

    async fn find(&self, id: Uuid) -> HeimdallResult<Option<Account>> {
        Ok(self.accounts.read().get(&id).cloned())
    }

    async fn insert(&self, account: &Account) -> HeimdallResult<()> {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&account.id) {
            return Err(HeimdallError::repository(format!(
                "account {} already exists",
                account.id
            )));
        }
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update(&self, account: &Account) -> HeimdallResult<()> {
        let mut accounts = self.accounts.write();
        if !accounts.contains_key(&account.id) {
            return Err(HeimdallError::AccountNotFound(account.id));
        }
        accounts.insert(account.id, account.clone());
        Ok(())
    }
}

#[async_trait]
impl ThreadRepository for InMemoryStore {
    async fn find_by_key(&self, thread_key: &str) -> HeimdallResult<Option<Thread>> {
        Ok(self
            .threads
            .read()
            .values()
            .find(|t| t.thread_key == thread_key)
            .cloned())
    }

    async fn find(&self, id: Uuid) -> HeimdallResult<Option<Thread>> {
        Ok(self.threads.read().get(&id).cloned())
    }

    async fn insert(&self, thread: &Thread) -> HeimdallResult<()> {
        let mut threads = self.threads.write();
        if threads.contains_key(&thread.id) {
            return Err(HeimdallError::repository(format!(
                "thread {} already exists",
                thread.id
            )));
        }
        threads.insert(thread.id, thread.clone());
        Ok(())
    }

    async fn update(&self, thread: &Thread) -> HeimdallResult<()> {
        let mut threads = self.threads.write();
        if !threads.contains_key(&thread.id) {
            return Err(HeimdallError::repository(format!(
                "thread {} does not exist",
                thread.id
            )));
        }
        threads.insert(thread.id, thread.clone());
        Ok(())
    }

    async fn list_all(&self) -> HeimdallResult<Vec<Thread>> {
        Ok(self.threads.read().values().cloned().collect())
    }
}

#[async_trait]
impl EmailRepository for InMemoryStore {
    async fn upsert(&self, thread_id: Uuid, email: &ParsedEmail) -> HeimdallResult<bool> {
        let mut emails = self.emails.write();
        if emails.contains_key(&email.message_id) {
            return Ok(false);
        }
        emails.insert(
            email.message_id.clone(),
            StoredEmail {
                thread_id,
                email: email.clone(),
            },
        );
        Ok(true)
    }

    async fn list_by_thread(&self, thread_id: Uuid) -> HeimdallResult<Vec<ParsedEmail>> {
        let mut by_thread: Vec<ParsedEmail> = self
            .emails
            .read()
            .values()
            .filter(|stored| stored.thread_id == thread_id)
            .map(|stored| stored.email.clone())
            .collect();
        by_thread.sort_by_key(|e| e.sent_at);
        Ok(by_thread)
    }

    async fn list_all(&self) -> HeimdallResult<Vec<StoredEmail>> {
        Ok(self.emails.read().values().cloned().collect())
    }
}
