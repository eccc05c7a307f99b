//! Header extraction
//!
//! The raw header block is the primary source for the message identifier
//! because some servers omit it from the structured envelope. When both
//! sources come up empty a deterministic synthetic identifier is derived
//! from the server id and sent date, so identity fields are never empty.

use mailparse::{addrparse, dateparse, MailAddr, ParsedMail};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::connection::RawMessage;
use crate::error::HeimdallResult;

static MESSAGE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<>\s]+>").unwrap());

static COMPACT_DATE: &[FormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");

/// Headers extracted from one raw message
#[derive(Debug, Clone)]
pub struct ParsedHeaders {
    /// Message identifier, angle brackets retained for extracted ids
    pub message_id: String,
    /// True when the identifier was synthesized
    pub message_id_generated: bool,
    /// Decoded subject, never empty
    pub subject: String,
    /// Sender, normalized
    pub from: String,
    /// To recipients, normalized
    pub to: Vec<String>,
    /// Cc recipients, normalized
    pub cc: Vec<String>,
    /// Bcc recipients, normalized
    pub bcc: Vec<String>,
    /// Sent date
    pub sent_at: OffsetDateTime,
    /// In-Reply-To identifier
    pub in_reply_to: Option<String>,
    /// References chain, oldest first
    pub references: Vec<String>,
    /// Raw header map
    pub raw_headers: BTreeMap<String, String>,
}

/// Extract structured headers from a raw message
pub fn parse_headers(raw: &RawMessage, mail: &ParsedMail<'_>) -> HeimdallResult<ParsedHeaders> {
    let raw_headers = header_map(mail);
    let sent_at = extract_sent_date(raw, mail);

    let (message_id, message_id_generated) = extract_message_id(raw, mail, sent_at);

    let subject = header_value(mail, "Subject")
        .filter(|s| !s.trim().is_empty())
        .or_else(|| raw.envelope_subject.clone())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "(no subject)".to_string());

    let from = address_list(mail, "From")
        .into_iter()
        .next()
        .unwrap_or_else(|| "unknown".to_string());

    let in_reply_to = header_value(mail, "In-Reply-To")
        .and_then(|v| MESSAGE_ID.find(&v).map(|m| m.as_str().to_string()));

    let references = header_value(mail, "References")
        .map(|v| {
            MESSAGE_ID
                .find_iter(&v)
                .map(|m| m.as_str().to_string())
                .collect()
        })
        .unwrap_or_default();

    Ok(ParsedHeaders {
        message_id,
        message_id_generated,
        subject,
        from,
        to: address_list(mail, "To"),
        cc: address_list(mail, "Cc"),
        bcc: address_list(mail, "Bcc"),
        sent_at,
        in_reply_to,
        references,
        raw_headers,
    })
}

/// Case-insensitive header lookup; values are MIME-word decoded to UTF-8
pub fn header_value(mail: &ParsedMail<'_>, key: &str) -> Option<String> {
    mail.headers
        .iter()
        .find(|h| h.get_key_ref().eq_ignore_ascii_case(key))
        .map(|h| h.get_value())
}

fn header_map(mail: &ParsedMail<'_>) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for header in &mail.headers {
        map.insert(header.get_key().to_string(), header.get_value());
    }
    map
}

fn extract_message_id(
    raw: &RawMessage,
    mail: &ParsedMail<'_>,
    sent_at: OffsetDateTime,
) -> (String, bool) {
    // primary: the raw header block
    if let Some(value) = header_value(mail, "Message-ID") {
        if let Some(found) = MESSAGE_ID.find(&value) {
            return (found.as_str().to_string(), false);
        }
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return (format!("<{trimmed}>"), false);
        }
    }

    // fallback: structured envelope field, unless it merely echoes the
    // server-assigned id
    if let Some(envelope_id) = &raw.envelope_message_id {
        if !envelope_id.is_empty() && *envelope_id != raw.server_id.to_string() {
            if MESSAGE_ID.is_match(envelope_id) {
                return (envelope_id.clone(), false);
            }
            return (format!("<{envelope_id}>"), false);
        }
    }

    let compact = sent_at
        .format(COMPACT_DATE)
        .unwrap_or_else(|_| "00000000000000".to_string());
    (
        format!("{}.{compact}@generated.local", raw.server_id),
        true,
    )
}

fn extract_sent_date(raw: &RawMessage, mail: &ParsedMail<'_>) -> OffsetDateTime {
    let from_header = header_value(mail, "Date")
        .and_then(|v| dateparse(&v).ok())
        .or_else(|| {
            raw.envelope_date
                .as_deref()
                .and_then(|v| dateparse(v).ok())
        });

    // a fixed sentinel keeps the synthetic message id stable across
    // re-fetches of the same dateless message
    from_header
        .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Parse an address header into normalized `Name <email>` strings
fn address_list(mail: &ParsedMail<'_>, key: &str) -> Vec<String> {
    let Some(value) = header_value(mail, key) else {
        return Vec::new();
    };
    if value.trim().is_empty() {
        return Vec::new();
    }

    match addrparse(&value) {
        Ok(parsed) => {
            let mut out = Vec::new();
            for addr in parsed.iter() {
                match addr {
                    MailAddr::Single(single) => out.push(format_address(
                        single.display_name.as_deref(),
                        &single.addr,
                    )),
                    MailAddr::Group(group) => {
                        for single in &group.addrs {
                            out.push(format_address(
                                single.display_name.as_deref(),
                                &single.addr,
                            ));
                        }
                    }
                }
            }
            out
        }
        // unparseable address headers are kept verbatim rather than lost
        Err(_) => vec![value.trim().to_string()],
    }
}

fn format_address(name: Option<&str>, email: &str) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => format!("{} <{}>", name.trim(), email),
        _ => email.to_string(),
    }
}
