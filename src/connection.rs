//! Mailbox connection management for Heimdall Desk
//!
//! One [`ImapConnection`] holds one authenticated session against a remote
//! mailbox. The [`MailboxSession`] trait is the seam the sync layer talks
//! through, so tests can substitute an in-memory session. Retry policy does
//! not live here; every failure surfaces as a typed error for the
//! orchestrator to classify.

use async_imap::imap_proto::{BodyStructure, ContentEncoding};
use async_imap::types::Fetch;
use async_imap::Session;
use async_native_tls::{TlsConnector, TlsStream};
use async_trait::async_trait;
use futures::TryStreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::account::{Account, TransportSecurity};
use crate::error::{HeimdallError, HeimdallResult};

/// Fetch query: identity, structure and full body in one round trip
const FETCH_QUERY: &str = "(UID ENVELOPE BODYSTRUCTURE BODY.PEEK[])";

/// Default bound on any single mailbox operation
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Attachment entry from the server-side structure enumeration.
///
/// Carries no raw bytes; the structural-walk fallback in the attachment
/// parser is the only path that reads part content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentSummary {
    /// Filename from the disposition or content-type parameters
    pub filename: Option<String>,
    /// MIME type as `type/subtype`
    pub mime_type: String,
    /// Declared size in bytes
    pub size: usize,
    /// Declared transfer encoding
    pub encoding: Option<String>,
    /// Content-ID with angle brackets trimmed
    pub content_id: Option<String>,
}

/// Opaque protocol-level message, addressed by server UID within a folder.
///
/// Ephemeral: fetched per run and handed to the parser, never persisted.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Server-assigned UID
    pub server_id: u32,
    /// Folder the message was fetched from
    pub folder: String,
    /// Message-ID from the structured envelope, when the server supplied one
    pub envelope_message_id: Option<String>,
    /// Subject from the structured envelope
    pub envelope_subject: Option<String>,
    /// Date string from the structured envelope
    pub envelope_date: Option<String>,
    /// Server-side attachment enumeration (high-level accessor)
    pub listed_attachments: Vec<AttachmentSummary>,
    /// Full raw message bytes (structural-tree accessor)
    pub raw: Vec<u8>,
}

/// Operations the sync layer needs from a connected mailbox session
#[async_trait]
pub trait MailboxSession: Send {
    /// List folder names on the server
    async fn list_folders(&mut self) -> HeimdallResult<Vec<String>>;

    /// Select a folder; subsequent message operations are scoped to it
    async fn select_folder(&mut self, name: &str) -> HeimdallResult<()>;

    /// Number of messages in the selected folder
    async fn message_count(&mut self) -> HeimdallResult<u32>;

    /// Fetch up to `limit` messages from the selected folder. Ordering is
    /// server-defined; callers must not rely on it.
    async fn fetch_messages(
        &mut self,
        limit: usize,
        unread_only: bool,
    ) -> HeimdallResult<Vec<RawMessage>>;

    /// Fetch a single message by UID
    async fn fetch_one(&mut self, uid: u32) -> HeimdallResult<RawMessage>;

    /// Mark a message as read
    async fn mark_read(&mut self, uid: u32) -> HeimdallResult<()>;

    /// Move a message to another folder
    async fn move_message(&mut self, uid: u32, folder: &str) -> HeimdallResult<()>;

    /// Log out and drop the session
    async fn disconnect(&mut self) -> HeimdallResult<()>;
}

/// Creates one session per account; the seam the orchestrator uses so
/// tests can inject fake sessions
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open an authenticated session for the account
    async fn open(&self, account: &Account) -> HeimdallResult<Box<dyn MailboxSession>>;
}

/// IMAP-backed mailbox session
pub struct ImapConnection {
    session: Option<Session<TlsStream<TcpStream>>>,
    selected: Option<SelectedFolder>,
    host: String,
    op_timeout: Duration,
}

struct SelectedFolder {
    name: String,
    exists: u32,
}

impl ImapConnection {
    /// Connect and authenticate against an IMAP server.
    ///
    /// Only implicit TLS is supported; STARTTLS and plaintext modes fail
    /// with a typed connection error.
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        secret: &str,
        security: TransportSecurity,
    ) -> HeimdallResult<Self> {
        Self::connect_with_timeout(
            host,
            port,
            username,
            secret,
            security,
            DEFAULT_OPERATION_TIMEOUT,
        )
        .await
    }

    /// Connect with an explicit per-operation timeout
    pub async fn connect_with_timeout(
        host: &str,
        port: u16,
        username: &str,
        secret: &str,
        security: TransportSecurity,
        op_timeout: Duration,
    ) -> HeimdallResult<Self> {
        if security != TransportSecurity::Tls {
            return Err(HeimdallError::connection(format!(
                "unsupported transport security mode {security}; only implicit TLS is supported"
            )));
        }

        let tcp = timeout(op_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| HeimdallError::timeout(format!("connecting to {host}:{port}")))?
            .map_err(|e| HeimdallError::connection(format!("tcp connect to {host}:{port}: {e}")))?;

        let tls = timeout(op_timeout, TlsConnector::new().connect(host, tcp))
            .await
            .map_err(|_| HeimdallError::timeout(format!("TLS handshake with {host}")))?
            .map_err(|e| HeimdallError::connection(format!("TLS handshake with {host}: {e}")))?;

        let client = async_imap::Client::new(tls);
        let session = timeout(op_timeout, client.login(username, secret))
            .await
            .map_err(|_| HeimdallError::timeout(format!("login to {host}")))?
            .map_err(|(e, _)| HeimdallError::connection(format!("login to {host}: {e}")))?;

        info!(host, username, "connected to mailbox server");

        Ok(Self {
            session: Some(session),
            selected: None,
            host: host.to_string(),
            op_timeout,
        })
    }

    /// Connect using the connection parameters stored on an account
    pub async fn for_account(account: &Account) -> HeimdallResult<Self> {
        Self::connect(
            &account.host,
            account.port,
            &account.username,
            &account.secret,
            account.security,
        )
        .await
    }

    fn session(&mut self) -> HeimdallResult<&mut Session<TlsStream<TcpStream>>> {
        self.session.as_mut().ok_or(HeimdallError::NotConnected)
    }

    fn selected(&self) -> HeimdallResult<&SelectedFolder> {
        self.selected.as_ref().ok_or(HeimdallError::NoFolderSelected)
    }

    async fn fetch_set(&mut self, set: &str, by_uid: bool) -> HeimdallResult<Vec<RawMessage>> {
        let folder = self.selected()?.name.clone();
        let op_timeout = self.op_timeout;
        let session = self.session()?;

        // the two fetch calls return distinct opaque stream types, so
        // each branch collects its own
        let fetches: Vec<Fetch> = match timeout(op_timeout, async {
            if by_uid {
                let stream = session.uid_fetch(set, FETCH_QUERY).await?;
                stream.try_collect::<Vec<_>>().await
            } else {
                let stream = session.fetch(set, FETCH_QUERY).await?;
                stream.try_collect::<Vec<_>>().await
            }
        })
        .await
        {
            Err(_) => return Err(HeimdallError::timeout(format!("fetching {set}"))),
            Ok(Err(e)) => return Err(map_imap_error("fetch", e)),
            Ok(Ok(v)) => v,
        };

        let mut out = Vec::with_capacity(fetches.len());
        for fetch in fetches {
            match raw_message_from_fetch(&fetch, &folder) {
                Some(raw) => out.push(raw),
                None => debug!(folder, "skipping FETCH response without UID"),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl MailboxSession for ImapConnection {
    async fn list_folders(&mut self) -> HeimdallResult<Vec<String>> {
        let op_timeout = self.op_timeout;
        let session = self.session()?;

        let names = match timeout(op_timeout, async {
            let stream = session.list(Some(""), Some("*")).await?;
            stream.try_collect::<Vec<_>>().await
        })
        .await
        {
            Err(_) => return Err(HeimdallError::timeout("listing folders".to_string())),
            Ok(Err(e)) => return Err(map_imap_error("list folders", e)),
            Ok(Ok(v)) => v,
        };

        Ok(names.iter().map(|n| n.name().to_string()).collect())
    }

    async fn select_folder(&mut self, name: &str) -> HeimdallResult<()> {
        let op_timeout = self.op_timeout;
        let session = self.session()?;

        let mailbox = match timeout(op_timeout, session.select(name)).await {
            Err(_) => return Err(HeimdallError::timeout(format!("selecting {name}"))),
            Ok(Err(async_imap::error::Error::No(diag))) => {
                warn!(folder = name, %diag, "folder selection rejected");
                return Err(HeimdallError::FolderNotFound(name.to_string()));
            }
            Ok(Err(e)) => return Err(map_imap_error("select folder", e)),
            Ok(Ok(m)) => m,
        };

        debug!(folder = name, exists = mailbox.exists, "folder selected");
        self.selected = Some(SelectedFolder {
            name: name.to_string(),
            exists: mailbox.exists,
        });
        Ok(())
    }

    async fn message_count(&mut self) -> HeimdallResult<u32> {
        Ok(self.selected()?.exists)
    }

    async fn fetch_messages(
        &mut self,
        limit: usize,
        unread_only: bool,
    ) -> HeimdallResult<Vec<RawMessage>> {
        let exists = self.selected()?.exists;
        if exists == 0 || limit == 0 {
            return Ok(Vec::new());
        }

        if unread_only {
            let op_timeout = self.op_timeout;
            let session = self.session()?;
            let uids = match timeout(op_timeout, session.uid_search("UNSEEN")).await {
                Err(_) => return Err(HeimdallError::timeout("searching unseen".to_string())),
                Ok(Err(e)) => return Err(map_imap_error("search unseen", e)),
                Ok(Ok(v)) => v,
            };
            if uids.is_empty() {
                return Ok(Vec::new());
            }
            let mut uids: Vec<u32> = uids.into_iter().collect();
            uids.sort_unstable();
            uids.truncate(limit);
            let set = uids
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            self.fetch_set(&set, true).await
        } else {
            let start = exists.saturating_sub(limit as u32).saturating_add(1).max(1);
            let set = format!("{start}:{exists}");
            self.fetch_set(&set, false).await
        }
    }

    async fn fetch_one(&mut self, uid: u32) -> HeimdallResult<RawMessage> {
        self.selected()?;
        let messages = self.fetch_set(&uid.to_string(), true).await?;
        messages
            .into_iter()
            .find(|m| m.server_id == uid)
            .ok_or(HeimdallError::MessageNotFound(uid))
    }

    async fn mark_read(&mut self, uid: u32) -> HeimdallResult<()> {
        self.selected()?;
        let op_timeout = self.op_timeout;
        let session = self.session()?;

        match timeout(op_timeout, async {
            let mut responses = session
                .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
                .await?;
            while responses.try_next().await?.is_some() {
                // drain STORE responses
            }
            Ok::<_, async_imap::error::Error>(())
        })
        .await
        {
            Err(_) => Err(HeimdallError::timeout(format!("storing flags on {uid}"))),
            Ok(Err(e)) => Err(map_imap_error("store flags", e)),
            Ok(Ok(())) => Ok(()),
        }
    }

    async fn move_message(&mut self, uid: u32, folder: &str) -> HeimdallResult<()> {
        self.selected()?;
        let op_timeout = self.op_timeout;
        let session = self.session()?;

        match timeout(op_timeout, session.uid_mv(uid.to_string(), folder)).await {
            Err(_) => Err(HeimdallError::timeout(format!("moving {uid} to {folder}"))),
            Ok(Err(e)) => Err(map_imap_error("move message", e)),
            Ok(Ok(())) => Ok(()),
        }
    }

    async fn disconnect(&mut self) -> HeimdallResult<()> {
        if let Some(mut session) = self.session.take() {
            self.selected = None;
            match timeout(self.op_timeout, session.logout()).await {
                Err(_) => debug!(host = %self.host, "logout timed out"),
                Ok(Err(e)) => debug!(host = %self.host, "logout failed: {e}"),
                Ok(Ok(())) => {}
            }
            info!(host = %self.host, "disconnected from mailbox server");
        }
        Ok(())
    }
}

impl Drop for ImapConnection {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(host = %self.host, "connection dropped without logout");
        }
    }
}

/// Opens real IMAP connections for accounts
pub struct ImapSessionFactory;

#[async_trait]
impl SessionFactory for ImapSessionFactory {
    async fn open(&self, account: &Account) -> HeimdallResult<Box<dyn MailboxSession>> {
        let conn = ImapConnection::for_account(account).await?;
        Ok(Box::new(conn))
    }
}

fn map_imap_error(what: &str, e: async_imap::error::Error) -> HeimdallError {
    match e {
        async_imap::error::Error::Io(io) => {
            HeimdallError::Connection(format!("{what}: {io}"))
        }
        async_imap::error::Error::ConnectionLost => {
            HeimdallError::Connection(format!("{what}: connection lost"))
        }
        other => HeimdallError::OperationFailed(format!("{what}: {other}")),
    }
}

fn raw_message_from_fetch(fetch: &Fetch, folder: &str) -> Option<RawMessage> {
    let uid = fetch.uid?;

    let envelope = fetch.envelope();
    let envelope_message_id = envelope
        .and_then(|e| e.message_id.as_ref())
        .map(|v| String::from_utf8_lossy(v).trim().to_string())
        .filter(|s| !s.is_empty());
    let envelope_subject = envelope
        .and_then(|e| e.subject.as_ref())
        .map(|v| String::from_utf8_lossy(v).to_string());
    let envelope_date = envelope
        .and_then(|e| e.date.as_ref())
        .map(|v| String::from_utf8_lossy(v).to_string());

    let mut listed_attachments = Vec::new();
    if let Some(structure) = fetch.bodystructure() {
        collect_listed_attachments(structure, &mut listed_attachments);
    }

    let raw = fetch.body().map(<[u8]>::to_vec).unwrap_or_default();

    Some(RawMessage {
        server_id: uid,
        folder: folder.to_string(),
        envelope_message_id,
        envelope_subject,
        envelope_date,
        listed_attachments,
        raw,
    })
}

/// Walk the server-reported structure tree collecting parts with an
/// explicit attachment disposition. This feeds the attachment parser's
/// primary path; parts the server does not flag fall through to the
/// structural MIME walk over the raw bytes.
fn collect_listed_attachments(structure: &BodyStructure<'_>, out: &mut Vec<AttachmentSummary>) {
    match structure {
        BodyStructure::Basic { common, other, .. }
        | BodyStructure::Text { common, other, .. } => {
            let is_attachment = common
                .disposition
                .as_ref()
                .map(|d| d.ty.eq_ignore_ascii_case("attachment"))
                .unwrap_or(false);
            if !is_attachment {
                return;
            }

            let disposition_filename = common.disposition.as_ref().and_then(|d| {
                param_lookup(d.params.as_deref(), "filename")
            });
            let name_param = param_lookup(common.ty.params.as_deref(), "name");

            out.push(AttachmentSummary {
                filename: disposition_filename.or(name_param),
                mime_type: format!("{}/{}", common.ty.ty, common.ty.subtype).to_lowercase(),
                size: other.octets as usize,
                encoding: encoding_name(&other.transfer_encoding),
                content_id: other
                    .id
                    .as_ref()
                    .map(|id| id.trim_matches(&['<', '>'][..]).to_string()),
            });
        }
        BodyStructure::Message { body, .. } => {
            collect_listed_attachments(body, out);
        }
        BodyStructure::Multipart { bodies, .. } => {
            for body in bodies {
                collect_listed_attachments(body, out);
            }
        }
    }
}

fn param_lookup(
    params: Option<&[(std::borrow::Cow<'_, str>, std::borrow::Cow<'_, str>)]>,
    key: &str,
) -> Option<String> {
    params?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.to_string())
}

fn encoding_name(encoding: &ContentEncoding<'_>) -> Option<String> {
    let name = match encoding {
        ContentEncoding::SevenBit => "7bit",
        ContentEncoding::EightBit => "8bit",
        ContentEncoding::Binary => "binary",
        ContentEncoding::Base64 => "base64",
        ContentEncoding::QuotedPrintable => "quoted-printable",
        ContentEncoding::Other(other) => return Some(other.to_string().to_lowercase()),
    };
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_plaintext_mode_rejected() {
        let result = ImapConnection::connect(
            "mail.example.com",
            143,
            "user",
            "pw",
            TransportSecurity::None,
        )
        .await;

        match result {
            Err(HeimdallError::Connection(msg)) => {
                assert!(msg.contains("only implicit TLS"));
            }
            Err(other) => panic!("expected connection error, got {other:?}"),
            Ok(_) => panic!("expected connection error, got a session"),
        }
    }

    #[tokio::test]
    async fn test_starttls_mode_rejected() {
        let result = ImapConnection::connect(
            "mail.example.com",
            143,
            "user",
            "pw",
            TransportSecurity::StartTls,
        )
        .await;
        assert!(matches!(result, Err(HeimdallError::Connection(_))));
    }

    #[tokio::test]
    async fn test_factory_propagates_connection_error() {
        // Unresolvable host fails fast with a typed error, not a panic.
        let account = Account::new(
            Uuid::new_v4(),
            "imap.invalid".to_string(),
            993,
            "user".to_string(),
            "pw".to_string(),
            TransportSecurity::None,
        )
        .unwrap();

        let result = ImapSessionFactory.open(&account).await;
        assert!(matches!(result, Err(HeimdallError::Connection(_))));
    }
}
