//! Heimdall Core Library
//!
//! This crate contains the email ingestion engine for Heimdall Desk,
//! including:
//! - Domain models (Account, ParsedEmail, Thread)
//! - IMAP connection management
//! - The message parsing pipeline (headers, bodies, attachments,
//!   threading)
//! - Text and HTML sanitizers
//! - Thread reconciliation and the polling orchestrator

pub mod account;
pub mod connection;
pub mod email;
pub mod error;
pub mod integrity;
pub mod parser;
pub mod reconcile;
pub mod repository;
pub mod sanitize;
pub mod sync;
pub mod thread;

// Re-export commonly used types
pub use account::{Account, TransportSecurity, MAX_SYNC_FAILURES};
pub use connection::{
    AttachmentSummary, ImapConnection, ImapSessionFactory, MailboxSession, RawMessage,
    SessionFactory, DEFAULT_OPERATION_TIMEOUT,
};
pub use email::{Attachment, EmailAddress, ParsedEmail, ThreadingInfo};
pub use error::{HeimdallError, HeimdallResult};
pub use integrity::{IntegrityChecker, IntegrityReport};
pub use parser::MessageParser;
pub use reconcile::{ReopenOnInbound, StatusPolicy, ThreadEngine};
pub use repository::{
    AccountRepository, EmailRepository, InMemoryStore, StoredEmail, ThreadRepository,
};
pub use sync::{
    AccountSyncError, AccountSyncOutcome, AccountSynchronizer, PollingOrchestrator, SyncRun,
    AUTO_ARCHIVE_AFTER_DAYS, FETCH_BATCH_LIMIT, INTEGRITY_CHECK_EVERY,
};
pub use thread::{Thread, ThreadStatus, THREAD_PREVIEW_CHARS};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Heimdall Desk";
