//! Threading metadata derivation
//!
//! Pure function over already-extracted headers; no I/O and no second
//! look at the raw message.

use crate::email::ThreadingInfo;

/// Derive threading info from extracted header fields
pub fn derive_threading(
    message_id: &str,
    in_reply_to: Option<&str>,
    references: &[String],
) -> ThreadingInfo {
    ThreadingInfo {
        message_id: message_id.to_string(),
        in_reply_to: in_reply_to.map(str::to_string),
        references: references.to_vec(),
    }
}
