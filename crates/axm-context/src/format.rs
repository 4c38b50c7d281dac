//! Context block rendering

use axm_types::{AttachmentType, ContentFormat, ContextAttachment};
use std::fmt::Write as _;

/// Separator between the base prompt and blocks, and between blocks
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// Render `base` followed by every attachment as a `<context>` block
///
/// Attachments are stably sorted by priority (`high`, `medium`, `low`,
/// unset); ties keep their input order. With no attachments the base prompt
/// is returned unchanged.
#[must_use]
pub fn format_context(base: &str, attachments: &[ContextAttachment]) -> String {
    if attachments.is_empty() {
        return base.to_string();
    }

    let mut ordered: Vec<&ContextAttachment> = attachments.iter().collect();
    ordered.sort_by_key(|a| a.priority.rank());

    let mut out = String::with_capacity(base.len() + attachments.len() * 64);
    out.push_str(base);
    for attachment in ordered {
        out.push_str(BLOCK_SEPARATOR);
        render_block(&mut out, attachment);
    }
    out
}

/// Render a single block
#[must_use]
pub fn render_attachment(attachment: &ContextAttachment) -> String {
    let mut out = String::new();
    render_block(&mut out, attachment);
    out
}

fn render_block(out: &mut String, attachment: &ContextAttachment) {
    out.push_str("<context");
    push_attr(out, "key", &attachment.key);
    push_attr(out, "type", attachment.attachment_type.as_str());
    push_attr(out, "priority", attachment.priority.as_str());
    push_attr(out, "format", attachment.format.as_str());
    push_attr(out, "tags", &attachment.tags.join(","));
    push_attr(out, "label", &attachment.label);
    match attachment.attachment_type {
        AttachmentType::File => push_attr(out, "path", attachment.path.as_deref().unwrap_or("")),
        AttachmentType::Link => push_attr(out, "url", attachment.url.as_deref().unwrap_or("")),
        AttachmentType::Note => {}
    }
    push_attr(out, "summary", attachment.summary.as_deref().unwrap_or(""));
    out.push_str(">\n");

    let content = render_content(attachment);
    out.push_str(&content);
    if !content.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</context>");
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    let _ = write!(out, " {name}=\"{}\"", escape_attr(value));
}

/// Escape a value for use inside a double-quoted XML attribute
#[must_use]
pub fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn render_content(attachment: &ContextAttachment) -> String {
    match (attachment.attachment_type, attachment.content.as_deref()) {
        (_, Some(content)) => render_formatted(content, &attachment.format),
        (AttachmentType::File, None) => format!(
            "[File: {} - content to be loaded by agent]",
            attachment.path.as_deref().unwrap_or("")
        ),
        (AttachmentType::Link, None) => {
            format!("[Link: {}]", attachment.url.as_deref().unwrap_or(""))
        }
        (AttachmentType::Note, None) => String::new(),
    }
}

/// Format-aware content rendering
///
/// `json` is pretty-printed with two-space indentation when it parses;
/// `log` splits on `" | "` into one trimmed line per segment. Everything
/// else is passed through.
#[must_use]
pub fn render_formatted(content: &str, format: &ContentFormat) -> String {
    match format {
        ContentFormat::Json => serde_json::from_str::<serde_json::Value>(content)
            .ok()
            .and_then(|value| serde_json::to_string_pretty(&value).ok())
            .unwrap_or_else(|| content.to_string()),
        ContentFormat::Log if content.contains(" | ") => content
            .split(" | ")
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => content.to_string(),
    }
}
