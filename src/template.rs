//! Placeholder substitution and HTML-to-plain-text conversion.
//!
//! The template language is a minimal `{{params.NAME}}` string substitution
//! over a merged parameter map. Unknown placeholders render unchanged.
//! Rendering is a pure function of (template, params), so repeated renders
//! are byte-identical.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{params\.([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("placeholder regex")
    })
}

/// Substitute `{{params.NAME}}` placeholders from the parameter map.
#[must_use]
pub fn render(template: &str, params: &Map<String, Value>) -> String {
    placeholder_re()
        .replace_all(template, |caps: &Captures<'_>| match params.get(&caps[1]) {
            Some(value) => display_value(value),
            None => caps[0].to_owned(),
        })
        .into_owned()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Tags that terminate a paragraph when closed.
const PARAGRAPH_TAGS: [&str; 15] = [
    "p", "div", "section", "article", "header", "footer", "h1", "h2", "h3", "h4", "h5", "h6",
    "ul", "ol", "table",
];

/// Convert an HTML fragment to plain text suitable for SMS bodies.
///
/// Block elements become paragraph breaks, list items become line breaks,
/// entities are unescaped, and anchor targets are appended as numbered
/// bare-link footnotes.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut links: Vec<String> = Vec::new();
    let mut chars = html.char_indices().peekable();
    let mut skip_until: Option<&'static str> = None;

    while let Some((idx, ch)) = chars.next() {
        if ch != '<' {
            if skip_until.is_none() {
                out.push(ch);
            }
            continue;
        }

        let Some(tag_end) = find_tag_end(html, idx) else {
            // Dangling '<' with no closing '>' stays as text.
            if skip_until.is_none() {
                out.push('<');
            }
            continue;
        };
        let tag_body = &html[idx + 1..tag_end];
        while chars.peek().is_some_and(|&(i, _)| i <= tag_end) {
            chars.next();
        }

        let (name, closing) = tag_name(tag_body);
        if let Some(waiting_for) = skip_until {
            if closing && name == waiting_for {
                skip_until = None;
            }
            continue;
        }

        match (name.as_str(), closing) {
            ("style", false) => skip_until = Some("style"),
            ("script", false) => skip_until = Some("script"),
            ("br", _) => out.push('\n'),
            ("a", false) => {
                if let Some(href) = attr_value(tag_body, "href") {
                    if !href.is_empty() {
                        links.push(href);
                    }
                }
            }
            ("li", true) => out.push('\n'),
            (tag, true) if PARAGRAPH_TAGS.contains(&tag) => out.push_str("\n\n"),
            _ => {}
        }
    }

    let mut text = normalize_whitespace(&unescape_entities(&out));
    if !links.is_empty() {
        text.push('\n');
        for (i, link) in links.iter().enumerate() {
            text.push_str(&format!("\n[{}] {link}", i + 1));
        }
    }
    text
}

/// Index of the `>` terminating the tag that starts at `start`, skipping
/// quoted attribute values.
fn find_tag_end(html: &str, start: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (offset, ch) in html[start..].char_indices().skip(1) {
        match (quote, ch) {
            (Some(q), _) if ch == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '>') => return Some(start + offset),
            _ => {}
        }
    }
    None
}

fn tag_name(tag_body: &str) -> (String, bool) {
    let trimmed = tag_body.trim();
    let (closing, rest) = match trimmed.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    (name.to_ascii_lowercase(), closing)
}

/// Extract a (single- or double-) quoted attribute value from a tag body.
fn attr_value(tag_body: &str, attr: &str) -> Option<String> {
    let lower = tag_body.to_ascii_lowercase();
    let key = format!("{attr}=");
    let at = lower.find(&key)?;
    let rest = &tag_body[at + key.len()..];
    let mut rest_chars = rest.chars();
    match rest_chars.next()? {
        quote @ ('"' | '\'') => {
            let value: String = rest_chars.take_while(|&c| c != quote).collect();
            Some(value)
        }
        first => {
            let mut value = String::new();
            value.push(first);
            value.extend(rest_chars.take_while(|c| !c.is_whitespace() && *c != '>'));
            Some(value)
        }
    }
}

fn unescape_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Collapse space runs within lines and blank-line runs between paragraphs,
/// then trim the whole text.
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0usize;
    for line in text.replace("\r\n", "\n").replace('\r', "\n").split('\n') {
        let squeezed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if squeezed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            lines.push(String::new());
        } else {
            blank_run = 0;
            lines.push(squeezed);
        }
    }

    while lines.first().is_some_and(|line| line.is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}
