//! Mailbox account management for Heimdall Desk

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{HeimdallError, HeimdallResult};

/// Number of consecutive failed syncs before an account is soft-disabled
pub const MAX_SYNC_FAILURES: u32 = 5;

/// Transport security mode for the mailbox connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportSecurity {
    /// Implicit TLS on connect
    Tls,
    /// Plaintext connection upgraded via STARTTLS
    StartTls,
    /// No transport security
    None,
}

impl std::fmt::Display for TransportSecurity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportSecurity::Tls => write!(f, "TLS"),
            TransportSecurity::StartTls => write!(f, "STARTTLS"),
            TransportSecurity::None => write!(f, "None"),
        }
    }
}

/// Account represents one remote mailbox polled by the ingestion engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique account ID
    pub id: Uuid,
    /// Owning user ID
    pub owner_id: Uuid,
    /// Server hostname
    pub host: String,
    /// Server port
    pub port: u16,
    /// Login username
    pub username: String,
    /// Login secret (password or app password)
    pub secret: String,
    /// Transport security mode
    pub security: TransportSecurity,
    /// Folder to ingest from
    pub folder: String,
    /// Whether the account participates in polling runs
    pub active: bool,
    /// Last successful sync time
    pub last_sync: Option<OffsetDateTime>,
    /// Consecutive failed sync count
    pub error_count: u32,
    /// Last error message
    pub last_error: Option<String>,
    /// Account creation time
    pub created_at: OffsetDateTime,
    /// Last modification time
    pub updated_at: OffsetDateTime,
}

impl Account {
    /// Create a new account
    pub fn new(
        owner_id: Uuid,
        host: String,
        port: u16,
        username: String,
        secret: String,
        security: TransportSecurity,
    ) -> HeimdallResult<Self> {
        if host.is_empty() {
            return Err(HeimdallError::connection("Account host cannot be empty"));
        }
        if username.is_empty() {
            return Err(HeimdallError::connection("Account username cannot be empty"));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            owner_id,
            host,
            port,
            username,
            secret,
            security,
            folder: "INBOX".to_string(),
            active: true,
            last_sync: None,
            error_count: 0,
            last_error: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        })
    }

    /// Check if the account should be polled
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Record a successful sync: resets the failure counter and stamps
    /// the last-sync time
    pub fn record_success(&mut self) {
        self.error_count = 0;
        self.last_error = None;
        self.last_sync = Some(OffsetDateTime::now_utc());
        self.updated_at = OffsetDateTime::now_utc();
    }

    /// Record a failed sync. After `MAX_SYNC_FAILURES` consecutive
    /// failures the account is soft-disabled; it stays in the repository
    /// but no longer participates in polling runs.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.error_count += 1;
        self.last_error = Some(error.into());
        self.updated_at = OffsetDateTime::now_utc();

        if self.error_count >= MAX_SYNC_FAILURES {
            self.active = false;
            tracing::warn!(
                account_id = %self.id,
                failures = self.error_count,
                "account soft-disabled after repeated sync failures"
            );
        }
    }

    /// Re-enable a soft-disabled account
    pub fn reactivate(&mut self) {
        self.active = true;
        self.error_count = 0;
        self.last_error = None;
        self.updated_at = OffsetDateTime::now_utc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_account() -> Account {
        Account::new(
            Uuid::new_v4(),
            "mail.example.com".to_string(),
            993,
            "support@example.com".to_string(),
            "hunter2".to_string(),
            TransportSecurity::Tls,
        )
        .unwrap()
    }

    #[test]
    fn test_account_creation() {
        let account = test_account();
        assert!(account.is_active());
        assert_eq!(account.folder, "INBOX");
        assert_eq!(account.error_count, 0);
        assert!(account.last_sync.is_none());
    }

    #[test]
    fn test_empty_host_rejected() {
        let result = Account::new(
            Uuid::new_v4(),
            "".to_string(),
            993,
            "user".to_string(),
            "pw".to_string(),
            TransportSecurity::Tls,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_soft_disable_after_repeated_failures() {
        let mut account = test_account();
        for _ in 0..MAX_SYNC_FAILURES - 1 {
            account.record_failure("connection refused");
        }
        assert!(account.is_active());

        account.record_failure("connection refused");
        assert!(!account.is_active());
        assert_eq!(account.error_count, MAX_SYNC_FAILURES);
    }

    #[test]
    fn test_success_resets_failure_counter() {
        let mut account = test_account();
        account.record_failure("timeout");
        account.record_failure("timeout");
        account.record_success();

        assert_eq!(account.error_count, 0);
        assert!(account.last_error.is_none());
        assert!(account.last_sync.is_some());
    }

    #[test]
    fn test_reactivate() {
        let mut account = test_account();
        for _ in 0..MAX_SYNC_FAILURES {
            account.record_failure("auth failed");
        }
        assert!(!account.is_active());

        account.reactivate();
        assert!(account.is_active());
        assert_eq!(account.error_count, 0);
    }
}
