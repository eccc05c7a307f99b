//! Conversation thread aggregate for Heimdall Desk

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::email::ParsedEmail;

/// Maximum preview length stored on a thread
pub const THREAD_PREVIEW_CHARS: usize = 200;

/// Thread lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    /// Awaiting a first response
    Open,
    /// Assigned to an agent
    Assigned,
    /// Waiting on the customer
    Pending,
    /// Resolved
    Closed,
    /// Archived; terminal
    Archived,
}

impl ThreadStatus {
    /// Whether a transition to `next` is allowed.
    ///
    /// Archived is reachable from any non-archived state; Open is
    /// re-enterable from Pending/Assigned when new inbound mail arrives.
    pub fn can_transition_to(self, next: ThreadStatus) -> bool {
        use ThreadStatus::*;
        match (self, next) {
            (Archived, _) => false,
            (_, Archived) => true,
            (Open, Assigned) => true,
            (Assigned, Pending) | (Assigned, Closed) | (Assigned, Open) => true,
            (Pending, Open) | (Pending, Closed) | (Pending, Assigned) => true,
            (Closed, Open) => true,
            (a, b) => a == b,
        }
    }
}

impl std::fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadStatus::Open => write!(f, "open"),
            ThreadStatus::Assigned => write!(f, "assigned"),
            ThreadStatus::Pending => write!(f, "pending"),
            ThreadStatus::Closed => write!(f, "closed"),
            ThreadStatus::Archived => write!(f, "archived"),
        }
    }
}

/// A reconstructed email conversation.
///
/// Created on the first email whose thread key matches no existing thread;
/// mutated on every subsequent email in the same thread. Never deleted by
/// this subsystem: archival is a status transition, not removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    /// Unique thread ID
    pub id: Uuid,
    /// Reconciliation join key (oldest reference, else in-reply-to, else
    /// the first message's own id)
    pub thread_key: String,
    /// Thread subject, from the first email
    pub subject: String,
    /// Distinct participant set
    pub participants: BTreeSet<String>,
    /// Lifecycle status
    pub status: ThreadStatus,
    /// Number of messages reconciled into the thread
    pub message_count: u32,
    /// Whether any message carries attachments
    pub has_attachments: bool,
    /// Time of the most recent message
    pub last_message_at: OffsetDateTime,
    /// Preview text from the most recent message
    pub preview: String,
    /// Thread creation time
    pub created_at: OffsetDateTime,
    /// Last modification time
    pub updated_at: OffsetDateTime,
}

impl Thread {
    /// Create a new thread from its first email
    pub fn from_email(email: &ParsedEmail) -> Self {
        let mut participants = BTreeSet::new();
        for addr in email.participants() {
            participants.insert(addr.to_string());
        }

        Self {
            id: Uuid::new_v4(),
            thread_key: email.threading.thread_key().to_string(),
            subject: email.subject.clone(),
            participants,
            status: ThreadStatus::Open,
            message_count: 1,
            has_attachments: email.has_attachments(),
            last_message_at: email.sent_at,
            preview: email.preview(THREAD_PREVIEW_CHARS),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    /// Fold a subsequent email into the aggregate: participants union,
    /// message count increment, attachment flag, last-message advance.
    /// Only new incoming/outgoing mail goes through here; metadata edits
    /// never touch `last_message_at`.
    pub fn absorb(&mut self, email: &ParsedEmail) {
        for addr in email.participants() {
            self.participants.insert(addr.to_string());
        }
        self.message_count += 1;
        if email.has_attachments() {
            self.has_attachments = true;
        }
        if email.sent_at > self.last_message_at {
            self.last_message_at = email.sent_at;
            self.preview = email.preview(THREAD_PREVIEW_CHARS);
        }
        self.updated_at = OffsetDateTime::now_utc();
    }

    /// Recompute the aggregate from the full stored email set.
    ///
    /// Used when a prior reconcile stored an email but the thread
    /// update never landed, leaving the counters behind the store.
    /// Subject, status and creation time are kept.
    pub fn rebuild_from(&mut self, emails: &[ParsedEmail]) {
        self.participants.clear();
        self.message_count = emails.len() as u32;
        self.has_attachments = false;

        for email in emails {
            for addr in email.participants() {
                self.participants.insert(addr.to_string());
            }
            if email.has_attachments() {
                self.has_attachments = true;
            }
        }

        if let Some(latest) = emails.iter().max_by_key(|e| e.sent_at) {
            self.last_message_at = latest.sent_at;
            self.preview = latest.preview(THREAD_PREVIEW_CHARS);
        }
        self.updated_at = OffsetDateTime::now_utc();
    }

    /// Apply a status transition, ignoring disallowed ones
    pub fn transition(&mut self, next: ThreadStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            self.updated_at = OffsetDateTime::now_utc();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::ThreadingInfo;
    use std::collections::BTreeMap;
    use time::macros::datetime;

    fn email(message_id: &str, from: &str, to: Vec<&str>, sent_at: OffsetDateTime) -> ParsedEmail {
        ParsedEmail {
            message_id: message_id.to_string(),
            message_id_generated: false,
            subject: "Printer on fire".to_string(),
            from: from.to_string(),
            to: to.into_iter().map(str::to_string).collect(),
            cc: vec![],
            bcc: vec![],
            sent_at,
            body_text: Some("please advise".to_string()),
            body_html: None,
            attachments: vec![],
            threading: ThreadingInfo {
                message_id: message_id.to_string(),
                in_reply_to: None,
                references: vec![],
            },
            headers: BTreeMap::new(),
            sanitized: true,
        }
    }

    #[test]
    fn test_new_thread_from_email() {
        let e = email(
            "<a@x>",
            "alice@example.com",
            vec!["support@example.com"],
            datetime!(2026-01-05 10:00 UTC),
        );
        let thread = Thread::from_email(&e);

        assert_eq!(thread.status, ThreadStatus::Open);
        assert_eq!(thread.message_count, 1);
        assert_eq!(thread.thread_key, "<a@x>");
        assert_eq!(thread.participants.len(), 2);
        assert_eq!(thread.last_message_at, e.sent_at);
    }

    #[test]
    fn test_absorb_unions_participants_and_advances() {
        let first = email(
            "<a@x>",
            "alice@example.com",
            vec!["support@example.com"],
            datetime!(2026-01-05 10:00 UTC),
        );
        let mut thread = Thread::from_email(&first);

        let second = email(
            "<b@x>",
            "bob@example.com",
            vec!["support@example.com"],
            datetime!(2026-01-05 11:00 UTC),
        );
        thread.absorb(&second);

        assert_eq!(thread.message_count, 2);
        assert_eq!(thread.participants.len(), 3);
        assert_eq!(thread.last_message_at, second.sent_at);
    }

    #[test]
    fn test_absorb_does_not_rewind_last_message() {
        let first = email(
            "<a@x>",
            "alice@example.com",
            vec![],
            datetime!(2026-01-05 10:00 UTC),
        );
        let mut thread = Thread::from_email(&first);

        let older = email(
            "<b@x>",
            "bob@example.com",
            vec![],
            datetime!(2026-01-04 09:00 UTC),
        );
        thread.absorb(&older);

        assert_eq!(thread.message_count, 2);
        assert_eq!(thread.last_message_at, first.sent_at);
    }

    #[test]
    fn test_rebuild_from_stored_emails() {
        let first = email(
            "<a@x>",
            "alice@example.com",
            vec!["support@example.com"],
            datetime!(2026-01-05 10:00 UTC),
        );
        let second = email(
            "<b@x>",
            "bob@example.com",
            vec!["support@example.com"],
            datetime!(2026-01-05 11:00 UTC),
        );

        // simulate an aggregate that fell behind the stored emails
        let mut thread = Thread::from_email(&first);
        thread.rebuild_from(&[first.clone(), second.clone()]);

        assert_eq!(thread.message_count, 2);
        assert_eq!(thread.participants.len(), 3);
        assert_eq!(thread.last_message_at, second.sent_at);
        assert_eq!(thread.status, ThreadStatus::Open);
    }

    #[test]
    fn test_status_machine() {
        use ThreadStatus::*;
        assert!(Open.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Open));
        assert!(Assigned.can_transition_to(Open));
        assert!(Pending.can_transition_to(Closed));
        assert!(Closed.can_transition_to(Open));
        assert!(Open.can_transition_to(Archived));
        assert!(Closed.can_transition_to(Archived));
        assert!(!Archived.can_transition_to(Open));
        assert!(!Open.can_transition_to(Closed));
    }

    #[test]
    fn test_transition_rejects_disallowed() {
        let e = email("<a@x>", "a@x.com", vec![], datetime!(2026-01-05 10:00 UTC));
        let mut thread = Thread::from_email(&e);

        assert!(!thread.transition(ThreadStatus::Closed));
        assert_eq!(thread.status, ThreadStatus::Open);

        assert!(thread.transition(ThreadStatus::Assigned));
        assert!(thread.transition(ThreadStatus::Closed));
        assert!(thread.transition(ThreadStatus::Archived));
        assert!(!thread.transition(ThreadStatus::Open));
    }
}
