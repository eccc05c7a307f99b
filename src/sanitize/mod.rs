//! Content sanitization for Heimdall Desk
//!
//! Text normalization and HTML XSS-stripping, independent of the parsing
//! pipeline. Both sanitizers are idempotent: feeding their output back in
//! yields the same output.

pub mod html;
pub mod text;

pub use html::{sanitize_html, sanitize_html_strict};
pub use text::{
    extract_emails, extract_urls, normalize_bytes, normalize_text, repair_utf8,
    strip_quoted_reply, truncate_words,
};
