//! Raw RFC 822 message → [`NormalizedMessage`].
//!
//! Pure string handling, no I/O. HTML bodies are reduced to plain text
//! before they leave this module.

use std::sync::LazyLock;

use mail_parser::{MessageParser, MimeHeaders, PartType};
use regex::Regex;

use super::NormalizedMessage;

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());
static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").unwrap());
static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p\s*>|</div\s*>").unwrap());
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<.*?>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Reduce an HTML document to a single line of readable text.
///
/// Script/style blocks are dropped, line-breaking tags become newlines,
/// other tags become spaces, a minimal entity set is unescaped and all
/// whitespace runs collapse to one space.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_BLOCK.replace_all(html, "");
    let text = STYLE_BLOCK.replace_all(&text, "");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, " ");

    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");

    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Heuristic for single-part bodies sent as text/plain but containing markup.
fn looks_like_html(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("<html") || lower.contains("<p>")
}

/// Parse a raw message. Returns `None` if the bytes aren't a message at all.
pub fn normalize(raw: &[u8]) -> Option<NormalizedMessage> {
    let parsed = MessageParser::default().parse(raw)?;

    let subject = parsed.subject().unwrap_or("(no subject)").to_string();

    let (sender_display_name, sender_address) = parsed
        .from()
        .and_then(|addr| addr.first())
        .map(|a| {
            (
                a.name().unwrap_or_default().to_string(),
                a.address().unwrap_or_default().to_string(),
            )
        })
        .unwrap_or_default();

    let received_at = received_at(raw_header(raw, "Date").as_deref());

    Some(NormalizedMessage {
        sender_display_name,
        sender_address,
        subject,
        received_at,
        body_text: extract_body(&parsed),
        thread_message_id: raw_header(raw, "Message-ID"),
        thread_references: raw_header(raw, "References"),
    })
}

/// Render the Date header as RFC 3339, falling back to the raw value.
fn received_at(date: Option<&str>) -> String {
    match date {
        Some(raw) => chrono::DateTime::parse_from_rfc2822(raw)
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|_| raw.to_string()),
        None => "unknown".to_string(),
    }
}

/// Pick the body: HTML (converted) over plain text, attachments ignored.
fn extract_body(parsed: &mail_parser::Message<'_>) -> String {
    let mut html: Option<&str> = None;
    let mut text: Option<&str> = None;

    for part in &parsed.parts {
        let is_attachment = part
            .content_disposition()
            .is_some_and(|d: &mail_parser::ContentType| d.ctype().eq_ignore_ascii_case("attachment"));
        if is_attachment {
            continue;
        }
        match &part.body {
            PartType::Html(body) if !body.is_empty() => html = Some(body.as_ref()),
            PartType::Text(body) if !body.is_empty() => text = Some(body.as_ref()),
            _ => {}
        }
    }

    if let Some(html) = html {
        return html_to_text(html);
    }

    match text {
        Some(text) if parsed.parts.len() == 1 && looks_like_html(text) => html_to_text(text),
        Some(text) => text.trim().to_string(),
        None => String::new(),
    }
}

/// Raw (undecoded) value of a top-level header, with folded lines joined.
pub fn raw_header(raw: &[u8], name: &str) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let mut value: Option<String> = None;

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            break;
        }

        if line.starts_with([' ', '\t']) {
            if let Some(v) = value.as_mut() {
                v.push(' ');
                v.push_str(line.trim());
            }
            continue;
        }

        if value.is_some() {
            break;
        }

        if let Some((key, rest)) = line.split_once(':')
            && key.trim().eq_ignore_ascii_case(name)
        {
            value = Some(rest.trim().to_string());
        }
    }

    value.filter(|v| !v.is_empty())
}
