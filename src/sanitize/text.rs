//! Plain-text normalization

use once_cell::sync::Lazy;
use regex::Regex;

static HORIZONTAL_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static EXCESS_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());
static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).unwrap());
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

/// Localized "on <date> <author> wrote:" reply markers
static REPLY_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(on .{1,200} wrote:|am .{1,200} schrieb .{0,100}:|le .{1,200} a écrit\s?:|el .{1,200} escribió\s?:)\s*$")
        .unwrap()
});

/// Repair a byte buffer into valid UTF-8.
///
/// Valid UTF-8 passes through unchanged; otherwise the buffer is decoded
/// as windows-1252 (covering the common latin-1 legacy mail bodies); the
/// last resort reinterprets as UTF-8 discarding invalid sequences.
pub fn repair_utf8(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    if !had_errors {
        return decoded.into_owned();
    }

    String::from_utf8_lossy(bytes).into_owned()
}

/// Normalize plain text for storage and display.
///
/// Strips control characters other than `\n`/`\r`/`\t`, unifies line
/// breaks to `\n`, collapses runs of horizontal whitespace to one space,
/// trims trailing whitespace per line and caps consecutive blank lines
/// at two.
pub fn normalize_text(input: &str) -> String {
    let without_controls: String = input
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect();

    let unified = without_controls.replace("\r\n", "\n").replace('\r', "\n");

    let lines: Vec<String> = unified
        .split('\n')
        .map(|line| {
            let collapsed = HORIZONTAL_WS.replace_all(line, " ");
            collapsed.trim_end().to_string()
        })
        .collect();

    let joined = lines.join("\n");
    EXCESS_BLANK_LINES.replace_all(&joined, "\n\n\n").into_owned()
}

/// Repair encoding, then normalize
pub fn normalize_bytes(bytes: &[u8]) -> String {
    normalize_text(&repair_utf8(bytes))
}

/// Strip quoted reply content: drops `>`-prefixed lines and everything
/// from the first localized "on ... wrote:" marker onward.
pub fn strip_quoted_reply(text: &str) -> String {
    let mut kept = Vec::new();
    for line in text.split('\n') {
        if REPLY_MARKER.is_match(line) {
            break;
        }
        if line.trim_start().starts_with('>') {
            continue;
        }
        kept.push(line);
    }
    kept.join("\n").trim_end().to_string()
}

/// Extract bare URLs from text
pub fn extract_urls(text: &str) -> Vec<String> {
    URL.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Extract email addresses from text
pub fn extract_emails(text: &str) -> Vec<String> {
    EMAIL
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Truncate at a word boundary, appending `suffix` when cut
pub fn truncate_words(text: &str, max_chars: usize, suffix: &str) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut: String = text.chars().take(max_chars).collect();
    let boundary = cut.rfind(char::is_whitespace).unwrap_or(cut.len());
    let mut out = cut[..boundary].trim_end().to_string();
    out.push_str(suffix);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unifies_line_breaks() {
        assert_eq!(normalize_text("a\r\nb\rc\nd"), "a\nb\nc\nd");
    }

    #[test]
    fn test_normalize_strips_control_characters() {
        let input = "hel\u{0}lo\u{7} wor\u{1b}ld\tkeep\ntabs";
        let out = normalize_text(input);
        assert!(!out.contains('\u{0}'));
        assert!(!out.contains('\u{7}'));
        assert!(!out.contains('\u{1b}'));
        assert!(out.contains('\t') || out.contains("keep"));
        assert!(out.contains('\n'));
    }

    #[test]
    fn test_normalize_output_has_no_stray_controls() {
        let input = "a\u{2}b\u{3}\nc\u{8}";
        for c in normalize_text(input).chars() {
            assert!(!c.is_control() || matches!(c, '\n' | '\r' | '\t'));
        }
    }

    #[test]
    fn test_normalize_collapses_blank_lines() {
        let input = "para one\n\n\n\n\n\npara two";
        assert_eq!(normalize_text(input), "para one\n\n\npara two");
    }

    #[test]
    fn test_normalize_collapses_horizontal_whitespace_and_trims() {
        let input = "hello    world   \nnext\t\tline  ";
        assert_eq!(normalize_text(input), "hello world\nnext line");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let input = "a\r\n\n\n\n\nb    c\t\td   ";
        let once = normalize_text(input);
        assert_eq!(normalize_text(&once), once);
    }

    #[test]
    fn test_repair_utf8_passthrough() {
        assert_eq!(repair_utf8("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn test_repair_utf8_latin1() {
        // "café" encoded as latin-1: e9 is invalid UTF-8
        let bytes = b"caf\xe9";
        assert_eq!(repair_utf8(bytes), "café");
    }

    #[test]
    fn test_repair_produces_valid_utf8() {
        let bytes = [0x80u8, 0xfe, 0x41, 0xff];
        let out = repair_utf8(&bytes);
        assert!(std::str::from_utf8(out.as_bytes()).is_ok());
    }

    #[test]
    fn test_strip_quoted_reply_drops_quote_lines() {
        let input = "thanks!\n> original line one\n> original line two\nregards";
        assert_eq!(strip_quoted_reply(input), "thanks!\nregards");
    }

    #[test]
    fn test_strip_quoted_reply_cuts_at_marker() {
        let input = "see below\n\nOn Mon, Jan 5, 2026 at 10:00 AM Alice wrote:\n> hi\n> there";
        assert_eq!(strip_quoted_reply(input), "see below");
    }

    #[test]
    fn test_strip_quoted_reply_localized_marker() {
        let input = "danke\nAm 05.01.2026 um 10:00 schrieb Alice:\n> hallo";
        assert_eq!(strip_quoted_reply(input), "danke");
    }

    #[test]
    fn test_extract_urls() {
        let text = "see https://example.com/a?b=1 and http://other.net.";
        let urls = extract_urls(text);
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], "https://example.com/a?b=1");
    }

    #[test]
    fn test_extract_emails() {
        let text = "contact alice@example.com or bob.smith+tag@mail.example.org";
        let emails = extract_emails(text);
        assert_eq!(
            emails,
            vec!["alice@example.com", "bob.smith+tag@mail.example.org"]
        );
    }

    #[test]
    fn test_truncate_words() {
        assert_eq!(truncate_words("short text", 50, "..."), "short text");
        assert_eq!(truncate_words("the quick brown fox jumps", 14, "..."), "the quick...");
    }
}
