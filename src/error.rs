//! Error types for Heimdall Core

use uuid::Uuid;

/// Result type alias for Heimdall operations
pub type HeimdallResult<T> = Result<T, HeimdallError>;

/// Main error type for Heimdall Core
#[derive(Debug, thiserror::Error)]
pub enum HeimdallError {
    /// Transport or authentication failure while talking to the mailbox
    #[error("Connection error: {0}")]
    Connection(String),

    /// An operation was attempted on a session that is not connected
    #[error("Not connected to mailbox server")]
    NotConnected,

    /// The requested folder does not exist on the server
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// The requested message does not exist in the selected folder
    #[error("Message not found: uid {0}")]
    MessageNotFound(u32),

    /// A folder-scoped operation was attempted before selecting a folder
    #[error("No folder selected")]
    NoFolderSelected,

    /// A mailbox operation failed with a transport diagnostic
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// Structured extraction of a single message failed
    #[error("Parse failure: {0}")]
    Parse(String),

    /// Attachment extraction failed (callers degrade to an empty list)
    #[error("Attachment extraction failed: {0}")]
    AttachmentExtraction(String),

    /// A polling run was triggered while another is in progress
    #[error("Polling job already running")]
    JobAlreadyRunning,

    /// A polling run was triggered with no active accounts
    #[error("No active accounts to poll")]
    NoActiveAccounts,

    /// Account lookup failed
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    /// The account exists but is not active
    #[error("Account is inactive: {0}")]
    AccountInactive(Uuid),

    /// Persistence collaborator failure
    #[error("Repository error: {0}")]
    Repository(String),

    /// MIME parsing errors
    #[error("MIME parsing error: {0}")]
    Mime(#[from] mailparse::MailParseError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation exceeded its transport timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl HeimdallError {
    /// Create a new connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a new operation failure
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::OperationFailed(msg.into())
    }

    /// Create a new parse failure
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new repository error
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Check if this error is worth retrying at a later run
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::OperationFailed(_)
                | Self::Timeout(_)
                | Self::Io(_)
                | Self::FolderNotFound(_)
                | Self::MessageNotFound(_)
        )
    }

    /// Check if this is an orchestration-level precondition failure,
    /// returned to the caller before any account is touched
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::JobAlreadyRunning
                | Self::NoActiveAccounts
                | Self::AccountNotFound(_)
                | Self::AccountInactive(_)
        )
    }
}
