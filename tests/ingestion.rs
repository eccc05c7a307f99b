//! End-to-end ingestion tests: fake mailbox sessions feeding the full
//! parse, reconcile and orchestration path.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use heimdall_core::{
    Account, AccountRepository, EmailRepository, HeimdallError, HeimdallResult, InMemoryStore,
    MailboxSession, PollingOrchestrator, RawMessage, ReopenOnInbound, SessionFactory,
    ThreadRepository, ThreadStatus, TransportSecurity,
};

struct FakeSession {
    messages: Vec<RawMessage>,
    delay: Duration,
}

#[async_trait]
impl MailboxSession for FakeSession {
    async fn list_folders(&mut self) -> HeimdallResult<Vec<String>> {
        Ok(vec!["INBOX".to_string()])
    }

    async fn select_folder(&mut self, name: &str) -> HeimdallResult<()> {
        if name == "INBOX" {
            Ok(())
        } else {
            Err(HeimdallError::FolderNotFound(name.to_string()))
        }
    }

    async fn message_count(&mut self) -> HeimdallResult<u32> {
        Ok(self.messages.len() as u32)
    }

    async fn fetch_messages(
        &mut self,
        limit: usize,
        _unread_only: bool,
    ) -> HeimdallResult<Vec<RawMessage>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.messages.iter().take(limit).cloned().collect())
    }

    async fn fetch_one(&mut self, uid: u32) -> HeimdallResult<RawMessage> {
        self.messages
            .iter()
            .find(|m| m.server_id == uid)
            .cloned()
            .ok_or(HeimdallError::MessageNotFound(uid))
    }

    async fn mark_read(&mut self, _uid: u32) -> HeimdallResult<()> {
        Ok(())
    }

    async fn move_message(&mut self, _uid: u32, _folder: &str) -> HeimdallResult<()> {
        Ok(())
    }

    async fn disconnect(&mut self) -> HeimdallResult<()> {
        Ok(())
    }
}

struct FakeFactory {
    messages: Vec<RawMessage>,
    delay: Duration,
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self, _account: &Account) -> HeimdallResult<Box<dyn MailboxSession>> {
        Ok(Box::new(FakeSession {
            messages: self.messages.clone(),
            delay: self.delay,
        }))
    }
}

fn raw_message(server_id: u32, rfc822: String) -> RawMessage {
    RawMessage {
        server_id,
        folder: "INBOX".to_string(),
        envelope_message_id: None,
        envelope_subject: None,
        envelope_date: None,
        listed_attachments: vec![],
        raw: rfc822.into_bytes(),
    }
}

fn account() -> Account {
    Account::new(
        Uuid::new_v4(),
        "mail.example.com".to_string(),
        993,
        "support@example.com".to_string(),
        "pw".to_string(),
        TransportSecurity::Tls,
    )
    .unwrap()
}

fn orchestrator(
    store: &Arc<InMemoryStore>,
    messages: Vec<RawMessage>,
    delay: Duration,
) -> PollingOrchestrator {
    PollingOrchestrator::new(
        Arc::new(FakeFactory { messages, delay }),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(ReopenOnInbound),
    )
}

/// Three unread messages in one conversation; the first has a broken
/// MIME structure but intact headers. All three must land in one thread
/// keyed by the first message's id.
#[tokio::test]
async fn test_conversation_reassembled_across_malformed_body() {
    // boundary never appears in the body: no parts, no extractable body
    let first = raw_message(
        1,
        concat!(
            "Message-ID: <root@customer.example>\r\n",
            "From: Alice <alice@customer.example>\r\n",
            "To: support@example.com\r\n",
            "Subject: Printer on fire\r\n",
            "Date: Mon, 5 Jan 2026 10:00:00 +0000\r\n",
            "Content-Type: multipart/alternative; boundary=\"never-appears\"\r\n",
            "\r\n",
            "this content sits outside any boundary\r\n",
        )
        .to_string(),
    );
    let second = raw_message(
        2,
        concat!(
            "Message-ID: <reply1@example.com>\r\n",
            "In-Reply-To: <root@customer.example>\r\n",
            "References: <root@customer.example>\r\n",
            "From: Support <support@example.com>\r\n",
            "To: alice@customer.example\r\n",
            "Subject: Re: Printer on fire\r\n",
            "Date: Mon, 5 Jan 2026 11:00:00 +0000\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "Have you tried turning it off?\r\n",
        )
        .to_string(),
    );
    let third = raw_message(
        3,
        concat!(
            "Message-ID: <reply2@customer.example>\r\n",
            "In-Reply-To: <reply1@example.com>\r\n",
            "References: <root@customer.example> <reply1@example.com>\r\n",
            "From: Alice <alice@customer.example>\r\n",
            "To: support@example.com\r\n",
            "Subject: Re: Printer on fire\r\n",
            "Date: Mon, 5 Jan 2026 12:00:00 +0000\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "It is off. Still on fire.\r\n",
        )
        .to_string(),
    );

    let store = Arc::new(InMemoryStore::new());
    AccountRepository::insert(&*store, &account()).await.unwrap();
    let orch = orchestrator(&store, vec![first, second, third], Duration::ZERO);

    let run = orch.run_polling_job().await.unwrap();
    assert_eq!(run.emails_fetched, 3);
    assert!(run.is_complete_success());

    let threads = ThreadRepository::list_all(&*store).await.unwrap();
    assert_eq!(threads.len(), 1);

    let thread = &threads[0];
    assert_eq!(thread.thread_key, "<root@customer.example>");
    assert_eq!(thread.message_count, 3);
    assert_eq!(thread.status, ThreadStatus::Open);
    assert!(thread
        .participants
        .iter()
        .any(|p| p.contains("alice@customer.example")));

    let emails = store.list_by_thread(thread.id).await.unwrap();
    assert_eq!(emails.len(), 3);

    // the malformed first message threads with no extractable body
    let root = emails
        .iter()
        .find(|e| e.message_id == "<root@customer.example>")
        .unwrap();
    assert!(root.body_text.is_none());
    assert!(root.body_html.is_none());
}

/// A second trigger during a run fails fast; the lock is released once
/// the winning run finishes.
#[tokio::test]
async fn test_concurrent_trigger_rejected_then_lock_released() {
    let message = raw_message(
        1,
        concat!(
            "Message-ID: <solo@example.com>\r\n",
            "From: alice@customer.example\r\n",
            "To: support@example.com\r\n",
            "Subject: hello\r\n",
            "Date: Mon, 5 Jan 2026 10:00:00 +0000\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "hi\r\n",
        )
        .to_string(),
    );

    let store = Arc::new(InMemoryStore::new());
    AccountRepository::insert(&*store, &account()).await.unwrap();
    let orch = Arc::new(orchestrator(
        &store,
        vec![message],
        Duration::from_millis(100),
    ));

    let (first, second) = tokio::join!(orch.run_polling_job(), orch.run_polling_job());

    let outcomes = [first, second];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let rejected = outcomes
        .iter()
        .filter(|r| matches!(r, Err(HeimdallError::JobAlreadyRunning)))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(rejected, 1);

    // lock released: a fresh run goes through
    assert!(orch.run_polling_job().await.is_ok());
}

/// Unparseable messages are skipped without aborting the account
#[tokio::test]
async fn test_empty_message_skipped() {
    let empty = raw_message(1, String::new());
    let good = raw_message(
        2,
        concat!(
            "Message-ID: <good@example.com>\r\n",
            "From: alice@customer.example\r\n",
            "To: support@example.com\r\n",
            "Subject: fine\r\n",
            "Date: Mon, 5 Jan 2026 10:00:00 +0000\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "all good\r\n",
        )
        .to_string(),
    );

    let store = Arc::new(InMemoryStore::new());
    AccountRepository::insert(&*store, &account()).await.unwrap();
    let orch = orchestrator(&store, vec![empty, good], Duration::ZERO);

    let run = orch.run_polling_job().await.unwrap();
    assert!(run.is_complete_success());

    let threads = ThreadRepository::list_all(&*store).await.unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].thread_key, "<good@example.com>");
}
