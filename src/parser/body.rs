//! Body extraction
//!
//! Plain-text and HTML bodies are pulled independently from the MIME
//! tree; either or both may be absent (attachment-only messages have
//! neither). Extraction failures are never fatal to the message: they
//! degrade to empty bodies and a log line.

use mailparse::ParsedMail;
use tracing::warn;

use crate::parser::headers::header_value;

/// Unsanitized body content of one message
#[derive(Debug, Clone, Default)]
pub struct ParsedBody {
    /// Decoded plain-text body
    pub text: Option<String>,
    /// Decoded HTML body
    pub html: Option<String>,
}

/// Extract text and HTML bodies from a parsed message
pub fn parse_body(mail: &ParsedMail<'_>) -> ParsedBody {
    let text = match extract_body(mail, "text/plain") {
        Ok(text) => text,
        Err(e) => {
            warn!("text body extraction failed: {e}");
            None
        }
    };
    let html = match extract_body(mail, "text/html") {
        Ok(html) => html,
        Err(e) => {
            warn!("html body extraction failed: {e}");
            None
        }
    };
    ParsedBody { text, html }
}

/// Depth-first search for the first non-attachment leaf of `mime_type`
fn extract_body(
    mail: &ParsedMail<'_>,
    mime_type: &str,
) -> Result<Option<String>, mailparse::MailParseError> {
    if mail.subparts.is_empty() {
        if mail.ctype.mimetype.eq_ignore_ascii_case(mime_type) && !is_attachment_part(mail) {
            return mail.get_body().map(Some);
        }
        return Ok(None);
    }

    for part in &mail.subparts {
        if let Some(body) = extract_body(part, mime_type)? {
            return Ok(Some(body));
        }
    }
    Ok(None)
}

fn is_attachment_part(mail: &ParsedMail<'_>) -> bool {
    header_value(mail, "Content-Disposition")
        .map(|d| d.trim_start().to_ascii_lowercase().starts_with("attachment"))
        .unwrap_or(false)
}
