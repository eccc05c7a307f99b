//! Parsed email model for Heimdall Desk

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Email address with an optional display name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name
    pub name: Option<String>,
    /// Address part
    pub email: String,
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{} <{}>", name, self.email)
        } else {
            write!(f, "{}", self.email)
        }
    }
}

/// Attachment extracted from a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Filename (decoded from MIME encoded-words where needed)
    pub filename: String,
    /// MIME type
    pub mime_type: String,
    /// Content size in bytes
    pub size: usize,
    /// Transfer encoding
    pub encoding: Option<String>,
    /// Content-ID for inline/embedded parts, angle brackets trimmed
    pub content_id: Option<String>,
    /// True only when an explicit inline disposition was present
    pub is_inline: bool,
    /// Raw content bytes; empty when the part was not fetched
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub content: Vec<u8>,
}

/// Threading metadata extracted from message headers.
///
/// Immutable once computed; the reconciliation engine joins emails into
/// threads through [`ThreadingInfo::thread_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadingInfo {
    /// Own message identifier
    pub message_id: String,
    /// In-Reply-To header value, if present
    pub in_reply_to: Option<String>,
    /// References chain, oldest first
    pub references: Vec<String>,
}

impl ThreadingInfo {
    /// The identifier used to join this email to a thread: the oldest
    /// reference, else the in-reply-to, else the message's own id.
    pub fn thread_key(&self) -> &str {
        self.references
            .first()
            .map(String::as_str)
            .or(self.in_reply_to.as_deref())
            .unwrap_or(&self.message_id)
    }

    /// Whether the message is a direct reply
    pub fn is_reply(&self) -> bool {
        self.in_reply_to.is_some()
    }

    /// Whether the message belongs to an existing conversation
    pub fn is_threaded(&self) -> bool {
        !self.references.is_empty() || self.in_reply_to.is_some()
    }

    /// Depth in the conversation, as reported by the references chain
    pub fn thread_depth(&self) -> usize {
        self.references.len()
    }
}

/// Immutable result of parsing one raw message.
///
/// Identity fields (`message_id`, `subject`, `from`) are never empty; a
/// synthetic identifier is generated when the protocol omits one. Either
/// body may be absent (attachment-only messages have neither).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedEmail {
    /// Message identifier (possibly synthesized)
    pub message_id: String,
    /// True when `message_id` was synthesized from server id and date
    pub message_id_generated: bool,
    /// Decoded subject
    pub subject: String,
    /// Sender as `Name <email>` or bare address
    pub from: String,
    /// To recipients, normalized
    pub to: Vec<String>,
    /// Cc recipients, normalized
    pub cc: Vec<String>,
    /// Bcc recipients, normalized
    pub bcc: Vec<String>,
    /// Sent date
    pub sent_at: OffsetDateTime,
    /// Sanitized plain-text body
    pub body_text: Option<String>,
    /// Sanitized HTML body
    pub body_html: Option<String>,
    /// Extracted attachments
    pub attachments: Vec<Attachment>,
    /// Threading metadata
    pub threading: ThreadingInfo,
    /// Raw header map
    pub headers: BTreeMap<String, String>,
    /// False for the raw-display variant whose bodies bypassed the
    /// sanitizers; that variant must never be persisted as canonical
    pub sanitized: bool,
}

impl ParsedEmail {
    /// Whether the email carries any attachments
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// All participant addresses: sender plus to/cc recipients
    pub fn participants(&self) -> Vec<&str> {
        std::iter::once(self.from.as_str())
            .chain(self.to.iter().map(String::as_str))
            .chain(self.cc.iter().map(String::as_str))
            .collect()
    }

    /// Preview text for thread listings, taken from the plain-text body
    pub fn preview(&self, max_chars: usize) -> String {
        let source = self
            .body_text
            .as_deref()
            .unwrap_or(self.subject.as_str());
        let preview: String = source.chars().take(max_chars).collect();
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(
        message_id: &str,
        in_reply_to: Option<&str>,
        references: Vec<&str>,
    ) -> ThreadingInfo {
        ThreadingInfo {
            message_id: message_id.to_string(),
            in_reply_to: in_reply_to.map(str::to_string),
            references: references.into_iter().map(str::to_string).collect(),
        }
    }

    #[test]
    fn test_thread_key_prefers_first_reference() {
        let t = info("<c@x>", Some("<b@x>"), vec!["<a@x>", "<b@x>"]);
        assert_eq!(t.thread_key(), "<a@x>");
        assert_eq!(t.thread_depth(), 2);
        assert!(t.is_reply());
        assert!(t.is_threaded());
    }

    #[test]
    fn test_thread_key_falls_back_to_in_reply_to() {
        let t = info("<b@x>", Some("<a@x>"), vec![]);
        assert_eq!(t.thread_key(), "<a@x>");
    }

    #[test]
    fn test_thread_key_falls_back_to_own_id() {
        let t = info("<a@x>", None, vec![]);
        assert_eq!(t.thread_key(), "<a@x>");
        assert!(!t.is_reply());
        assert!(!t.is_threaded());
        assert_eq!(t.thread_depth(), 0);
    }

    #[test]
    fn test_parsed_email_json_round_trip() {
        let email = ParsedEmail {
            message_id: "<a@x>".to_string(),
            message_id_generated: false,
            subject: "Héllo".to_string(),
            from: "Alice <alice@example.com>".to_string(),
            to: vec!["support@example.com".to_string()],
            cc: vec![],
            bcc: vec![],
            sent_at: time::macros::datetime!(2026-01-05 10:00 UTC),
            body_text: Some("hi".to_string()),
            body_html: None,
            attachments: vec![],
            threading: info("<a@x>", None, vec![]),
            headers: BTreeMap::new(),
            sanitized: true,
        };

        let json = serde_json::to_string(&email).unwrap();
        let back: ParsedEmail = serde_json::from_str(&json).unwrap();
        assert_eq!(back.message_id, email.message_id);
        assert_eq!(back.sent_at, email.sent_at);
        assert_eq!(back.threading, email.threading);
    }

    #[test]
    fn test_email_address_display() {
        let with_name = EmailAddress {
            name: Some("Jo Doe".to_string()),
            email: "jo@example.com".to_string(),
        };
        assert_eq!(with_name.to_string(), "Jo Doe <jo@example.com>");

        let bare = EmailAddress {
            name: None,
            email: "jo@example.com".to_string(),
        };
        assert_eq!(bare.to_string(), "jo@example.com");
    }
}
