//! Message parsing pipeline for Heimdall Desk
//!
//! One raw protocol message goes in, one [`ParsedEmail`] comes out. The
//! stages run in a fixed order: headers, bodies, sanitization,
//! attachments, threading. A header-stage failure fails the message;
//! body and attachment problems degrade instead (absent bodies, empty
//! attachment list) because a support inbox must not drop a customer
//! email over a mangled MIME part.

pub mod attachments;
pub mod body;
pub mod headers;
pub mod threading;

use mailparse::parse_mail;
use std::time::Instant;
use tracing::{debug, warn};

use crate::connection::RawMessage;
use crate::email::ParsedEmail;
use crate::error::{HeimdallError, HeimdallResult};
use crate::sanitize::{normalize_text, sanitize_html};

pub use attachments::parse_attachments;
pub use body::{parse_body, ParsedBody};
pub use headers::{parse_headers, ParsedHeaders};
pub use threading::derive_threading;

/// Pipeline façade turning raw protocol messages into parsed emails
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageParser;

impl MessageParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a raw message into its canonical, sanitized form.
    ///
    /// This is the variant the ingestion pipeline stores; bodies have
    /// been through the text and HTML sanitizers.
    pub fn parse(&self, raw: &RawMessage) -> HeimdallResult<ParsedEmail> {
        self.run(raw, true)
    }

    /// Parse a raw message without sanitizing the bodies.
    ///
    /// For raw-display and debugging surfaces only; the result carries
    /// `sanitized = false` and must never be persisted as the canonical
    /// copy.
    pub fn parse_unsanitized(&self, raw: &RawMessage) -> HeimdallResult<ParsedEmail> {
        self.run(raw, false)
    }

    fn run(&self, raw: &RawMessage, sanitize: bool) -> HeimdallResult<ParsedEmail> {
        let started = Instant::now();

        let result = self.run_stages(raw, sanitize);
        match &result {
            Ok(email) => {
                debug!(
                    server_id = raw.server_id,
                    message_id = %email.message_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "message parsed"
                );
            }
            Err(e) => {
                warn!(
                    server_id = raw.server_id,
                    folder = %raw.folder,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "message parse failed: {e}"
                );
            }
        }
        result
    }

    fn run_stages(&self, raw: &RawMessage, sanitize: bool) -> HeimdallResult<ParsedEmail> {
        if raw.raw.is_empty() {
            return Err(HeimdallError::parse(format!(
                "message {} has no body content",
                raw.server_id
            )));
        }

        let mail = parse_mail(&raw.raw)?;

        let headers = parse_headers(raw, &mail)?;
        let body = parse_body(&mail);

        let (body_text, body_html) = if sanitize {
            (
                body.text.as_deref().map(normalize_text),
                body.html.as_deref().map(|h| sanitize_html(h)),
            )
        } else {
            (body.text, body.html)
        };

        let attachments = parse_attachments(raw, &mail);
        let threading = derive_threading(
            &headers.message_id,
            headers.in_reply_to.as_deref(),
            &headers.references,
        );

        Ok(ParsedEmail {
            message_id: headers.message_id,
            message_id_generated: headers.message_id_generated,
            subject: headers.subject,
            from: headers.from,
            to: headers.to,
            cc: headers.cc,
            bcc: headers.bcc,
            sent_at: headers.sent_at,
            body_text,
            body_html,
            attachments,
            threading,
            headers: headers.raw_headers,
            sanitized: sanitize,
        })
    }
}
