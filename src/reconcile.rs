//! Thread reconciliation for Heimdall Desk
//!
//! Every parsed email is joined to a conversation through its thread
//! key, which comes from the reference chain only. Subject lines never
//! participate: two tickets titled "help" must stay separate threads.
//! A reconciliation failure leaves the email unconsumed; the caller
//! retries at message granularity on a later run.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::email::ParsedEmail;
use crate::error::{HeimdallError, HeimdallResult};
use crate::repository::{EmailRepository, ThreadRepository};
use crate::thread::{Thread, ThreadStatus};

/// Hook deciding status transitions on thread events.
///
/// The engine fires each hook exactly once per event and applies the
/// returned transition when the state machine allows it.
#[async_trait]
pub trait StatusPolicy: Send + Sync {
    /// A new inbound email was reconciled into an existing thread
    async fn on_new_email(
        &self,
        thread: &Thread,
        email: &ParsedEmail,
    ) -> HeimdallResult<Option<ThreadStatus>>;

    /// The thread's assignee changed
    async fn on_assignment_changed(
        &self,
        thread: &Thread,
        assignee: Option<Uuid>,
    ) -> HeimdallResult<Option<ThreadStatus>>;
}

/// Default policy: inbound mail reopens waiting and closed threads,
/// assignment moves a thread between Open and Assigned
pub struct ReopenOnInbound;

#[async_trait]
impl StatusPolicy for ReopenOnInbound {
    async fn on_new_email(
        &self,
        thread: &Thread,
        _email: &ParsedEmail,
    ) -> HeimdallResult<Option<ThreadStatus>> {
        match thread.status {
            ThreadStatus::Pending | ThreadStatus::Closed => Ok(Some(ThreadStatus::Open)),
            _ => Ok(None),
        }
    }

    async fn on_assignment_changed(
        &self,
        _thread: &Thread,
        assignee: Option<Uuid>,
    ) -> HeimdallResult<Option<ThreadStatus>> {
        Ok(Some(match assignee {
            Some(_) => ThreadStatus::Assigned,
            None => ThreadStatus::Open,
        }))
    }
}

/// Joins parsed emails into threads
pub struct ThreadEngine {
    threads: Arc<dyn ThreadRepository>,
    emails: Arc<dyn EmailRepository>,
    policy: Arc<dyn StatusPolicy>,
}

impl ThreadEngine {
    pub fn new(
        threads: Arc<dyn ThreadRepository>,
        emails: Arc<dyn EmailRepository>,
        policy: Arc<dyn StatusPolicy>,
    ) -> Self {
        Self {
            threads,
            emails,
            policy,
        }
    }

    /// Reconcile one parsed email into its thread.
    ///
    /// Looks the thread up by the email's thread key. When found, the
    /// email is upserted and the aggregate updated; a message id seen
    /// before leaves the thread untouched. When not found a new thread
    /// is created from the email. Returns the thread as persisted.
    pub async fn reconcile(&self, email: &ParsedEmail) -> HeimdallResult<Thread> {
        let thread_key = email.threading.thread_key().to_string();

        match self.threads.find_by_key(&thread_key).await? {
            Some(mut thread) => {
                let newly_stored = self.emails.upsert(thread.id, email).await?;

                // the aggregate is consistent when the store holds
                // exactly the emails the counters account for; a prior
                // interrupted reconcile leaves it behind the store
                let stored = self.emails.list_by_thread(thread.id).await?;
                let consistent =
                    stored.len() as u32 == thread.message_count + u32::from(newly_stored);

                if !newly_stored && consistent {
                    debug!(
                        thread_id = %thread.id,
                        message_id = %email.message_id,
                        "duplicate message id, thread unchanged"
                    );
                    return Ok(thread);
                }

                if newly_stored && consistent {
                    thread.absorb(email);
                } else {
                    thread.rebuild_from(&stored);
                    debug!(
                        thread_id = %thread.id,
                        message_count = thread.message_count,
                        "thread aggregate rebuilt after interrupted reconciliation"
                    );
                }

                // the hook fires once per stored email; on the rebuild
                // path it already fired when the email was first stored
                if newly_stored {
                    if let Some(next) = self.policy.on_new_email(&thread, email).await? {
                        thread.transition(next);
                    }
                }
                self.threads.update(&thread).await?;

                debug!(
                    thread_id = %thread.id,
                    message_id = %email.message_id,
                    message_count = thread.message_count,
                    "email reconciled into existing thread"
                );
                Ok(thread)
            }
            None => {
                let thread = Thread::from_email(email);
                self.threads.insert(&thread).await?;
                self.emails.upsert(thread.id, email).await?;

                info!(
                    thread_id = %thread.id,
                    thread_key = %thread.thread_key,
                    message_id = %email.message_id,
                    "new thread created"
                );
                Ok(thread)
            }
        }
    }

    /// Record an assignment change on a thread, firing the policy hook
    /// exactly once
    pub async fn record_assignment_change(
        &self,
        thread_id: Uuid,
        assignee: Option<Uuid>,
    ) -> HeimdallResult<Thread> {
        let mut thread = self
            .threads
            .find(thread_id)
            .await?
            .ok_or_else(|| HeimdallError::repository(format!("thread {thread_id} not found")))?;

        if let Some(next) = self.policy.on_assignment_changed(&thread, assignee).await? {
            thread.transition(next);
        }
        self.threads.update(&thread).await?;
        Ok(thread)
    }
}
