//! Attachment extraction
//!
//! Primary path: the server-side attachment enumeration carried on the
//! raw message. When a server leaves that enumeration empty (a missing
//! disposition header is enough), the fallback walks the MIME part tree
//! itself. Attachment loss must never abort message parsing, so walk
//! failures degrade to an empty list.

use mailparse::{parse_header, DispositionType, ParsedMail};
use tracing::warn;

use crate::connection::RawMessage;
use crate::email::Attachment;
use crate::parser::headers::header_value;

/// Extract attachments for one message
pub fn parse_attachments(raw: &RawMessage, mail: &ParsedMail<'_>) -> Vec<Attachment> {
    if !raw.listed_attachments.is_empty() {
        return raw
            .listed_attachments
            .iter()
            .map(|summary| Attachment {
                filename: summary
                    .filename
                    .clone()
                    .map(|name| decode_mime_words(&name))
                    .unwrap_or_else(|| "attachment.bin".to_string()),
                mime_type: summary.mime_type.clone(),
                size: summary.size,
                encoding: summary.encoding.clone(),
                content_id: summary.content_id.clone(),
                // the enumeration only lists explicit attachment parts
                is_inline: false,
                content: Vec::new(),
            })
            .collect();
    }

    walk_parts(mail)
}

/// Structural fallback: recurse over the MIME tree, deciding per leaf
fn walk_parts(mail: &ParsedMail<'_>) -> Vec<Attachment> {
    let mut out = Vec::new();
    if let Err(e) = collect(mail, &mut out) {
        warn!("attachment tree walk failed, degrading to empty list: {e}");
        return Vec::new();
    }
    out
}

fn collect(
    mail: &ParsedMail<'_>,
    out: &mut Vec<Attachment>,
) -> Result<(), mailparse::MailParseError> {
    if !mail.subparts.is_empty() {
        for part in &mail.subparts {
            collect(part, out)?;
        }
        return Ok(());
    }

    // an explicit disposition header is required for the inline flag;
    // mailparse defaults to inline when the header is absent, which is
    // not the same thing
    let has_disposition_header = header_value(mail, "Content-Disposition").is_some();
    let disposition = mail.get_content_disposition();

    let explicit_attachment =
        has_disposition_header && disposition.disposition == DispositionType::Attachment;
    let explicit_inline =
        has_disposition_header && disposition.disposition == DispositionType::Inline;

    let filename = disposition
        .params
        .get("filename")
        .cloned()
        .or_else(|| mail.ctype.params.get("name").cloned())
        .map(|name| decode_mime_words(&name));

    let is_attachment = if explicit_attachment {
        true
    } else {
        filename.is_some() && !explicit_inline
    };

    if !is_attachment {
        return Ok(());
    }

    let content = mail.get_body_raw().unwrap_or_default();
    let content_id = header_value(mail, "Content-ID")
        .map(|id| id.trim().trim_matches(&['<', '>'][..]).to_string());

    out.push(Attachment {
        filename: filename.unwrap_or_else(|| "attachment.bin".to_string()),
        mime_type: mail.ctype.mimetype.to_ascii_lowercase(),
        size: content.len(),
        encoding: header_value(mail, "Content-Transfer-Encoding")
            .map(|e| e.trim().to_ascii_lowercase()),
        content_id,
        is_inline: explicit_inline,
        content,
    });
    Ok(())
}

/// Decode RFC 2047 encoded words in parameter values, leaving plain
/// values untouched
fn decode_mime_words(value: &str) -> String {
    if !value.contains("=?") {
        return value.to_string();
    }
    let synthetic = format!("X: {value}");
    match parse_header(synthetic.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => value.to_string(),
    }
}
