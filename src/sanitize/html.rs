//! HTML sanitization
//!
//! Allow-list based cleaning on top of `ammonia`. Scripts, styles and
//! event handlers fall away because they are never allowed in. The final
//! cleaning pass normalizes whatever the linkifier and empty-element
//! collapse produced, which is what keeps `sanitize(sanitize(x)) ==
//! sanitize(x)`.

use ammonia::Builder;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

/// Structural and formatting tags kept by the default sanitizer
const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "b", "blockquote", "br", "code", "dd", "div", "dl", "dt", "em", "h1", "h2",
    "h3", "h4", "h5", "h6", "hr", "i", "img", "li", "ol", "p", "pre", "q", "s", "small",
    "span", "strike", "strong", "sub", "sup", "table", "tbody", "td", "tfoot", "th", "thead",
    "tr", "u", "ul",
];

/// Minimal tag set for zero-trust contexts
const STRICT_TAGS: &[&str] = &[
    "p", "br", "b", "i", "em", "strong", "u", "blockquote", "ul", "ol", "li",
];

/// CSS properties that survive in `style` attributes
const ALLOWED_CSS_PROPERTIES: &[&str] = &[
    "color",
    "background-color",
    "font-family",
    "font-size",
    "font-style",
    "font-weight",
    "text-align",
    "text-decoration",
    "line-height",
    "margin",
    "padding",
    "border",
    "width",
    "height",
];

static BARE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+[^\s<>"'.,;:!?)]"#).unwrap());

/// Tag markup and whole anchors; the linkifier never touches these spans
static PROTECTED_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<a\b.*?</a>|<[^>]+>").unwrap());

static EMPTY_ELEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(p|div|span|li|ul|ol|blockquote|b|i|em|strong|u|h[1-6])(\s[^>]*)?>\s*</([a-z0-9]+)>")
        .unwrap()
});

fn builder() -> Builder<'static> {
    let mut tag_attributes: HashMap<&str, HashSet<&str>> = HashMap::new();
    tag_attributes.insert("a", ["href", "title"].into_iter().collect());
    tag_attributes.insert(
        "img",
        ["src", "alt", "width", "height"].into_iter().collect(),
    );
    tag_attributes.insert("td", ["colspan", "rowspan"].into_iter().collect());
    tag_attributes.insert("th", ["colspan", "rowspan"].into_iter().collect());

    let mut b = Builder::default();
    b.tags(ALLOWED_TAGS.iter().copied().collect())
        .tag_attributes(tag_attributes)
        .generic_attributes(["style"].into_iter().collect())
        .url_schemes(["http", "https", "mailto"].into_iter().collect())
        .link_rel(Some("noopener noreferrer nofollow"))
        .set_tag_attribute_value("a", "target", "_blank")
        .attribute_filter(|_element, attribute, value| {
            if attribute == "style" {
                filter_css(value).map(Cow::Owned)
            } else {
                Some(Cow::Borrowed(value))
            }
        });
    b
}

fn strict_builder() -> Builder<'static> {
    let mut b = Builder::default();
    b.tags(STRICT_TAGS.iter().copied().collect())
        .tag_attributes(HashMap::new())
        .generic_attributes(HashSet::new())
        .url_schemes(HashSet::new())
        .link_rel(None);
    b
}

/// Keep only allow-listed CSS declarations; drop the attribute entirely
/// when nothing survives
fn filter_css(style: &str) -> Option<String> {
    let kept: Vec<String> = style
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let value = value.trim();
            if value.is_empty() || !ALLOWED_CSS_PROPERTIES.contains(&prop.as_str()) {
                return None;
            }
            // expressions and url() payloads do not belong in mail styling
            let lowered = value.to_ascii_lowercase();
            if lowered.contains("url(") || lowered.contains("expression") {
                return None;
            }
            Some(format!("{prop}: {value}"))
        })
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("; "))
    }
}

/// Wrap bare URLs in anchors, leaving existing tags and anchors alone.
/// The generated anchors are bare; the final cleaning pass adds the
/// forced rel/target attributes.
fn linkify(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for span in PROTECTED_SPAN.find_iter(html) {
        let gap = &html[last..span.start()];
        out.push_str(&linkify_text(gap));
        out.push_str(span.as_str());
        last = span.end();
    }
    out.push_str(&linkify_text(&html[last..]));
    out
}

fn linkify_text(text: &str) -> String {
    BARE_URL
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let url = &caps[0];
            format!("<a href=\"{url}\">{url}</a>")
        })
        .into_owned()
}

/// Remove elements that ended up with no content, repeating until stable
/// so unwrapping does not leave a freshly emptied parent behind
fn collapse_empty_elements(html: &str) -> String {
    let mut current = html.to_string();
    for _ in 0..16 {
        let next = EMPTY_ELEMENT
            .replace_all(&current, |caps: &regex::Captures<'_>| {
                if caps[1].eq_ignore_ascii_case(&caps[3]) {
                    String::new()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Sanitize HTML for display inside the support inbox.
///
/// Allow-listed structural tags and CSS only, external links forced into
/// a new context with a no-follow relation, external images permitted,
/// bare URLs auto-linkified, empty elements collapsed. Idempotent.
pub fn sanitize_html(input: &str) -> String {
    let cleaned = builder().clean(input).to_string();
    let collapsed = collapse_empty_elements(&cleaned);
    let linkified = linkify(&collapsed);
    builder().clean(&linkified).to_string()
}

/// Stricter variant for zero-trust contexts: minimal tag set, no CSS, no
/// links or external resource loading. Idempotent.
pub fn sanitize_html_strict(input: &str) -> String {
    let cleaned = strict_builder().clean(input).to_string();
    collapse_empty_elements(&cleaned)
}
