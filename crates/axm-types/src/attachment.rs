//! Context attachments
//!
//! Typed pieces of content (file, link, note) that a task carries into the
//! prompt of every run, with priority and format metadata.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    File,
    Link,
    #[default]
    Note,
}

impl AttachmentType {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Link => "link",
            Self::Note => "note",
        }
    }
}

impl fmt::Display for AttachmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attachment priority
///
/// Ordering is `high < medium < low < unset`, which is also the prompt order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
    #[default]
    #[serde(rename = "", alias = "unset")]
    Unset,
}

impl Priority {
    /// Sort rank
    #[inline]
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
            Self::Unset => 3,
        }
    }

    /// Wire name; empty for `Unset`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unset => "",
        }
    }
}

/// Content format of an attachment
///
/// Unknown formats are kept verbatim so they round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentFormat {
    #[default]
    Unspecified,
    Json,
    Yaml,
    Log,
    Markdown,
    Text,
    Other(String),
}

impl ContentFormat {
    /// Wire name; empty for `Unspecified`
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unspecified => "",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Log => "log",
            Self::Markdown => "markdown",
            Self::Text => "text",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ContentFormat {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" => Self::Unspecified,
            "json" => Self::Json,
            "yaml" => Self::Yaml,
            "log" => Self::Log,
            "markdown" => Self::Markdown,
            "text" => Self::Text,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for ContentFormat {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<ContentFormat> for String {
    fn from(value: ContentFormat) -> Self {
        match value {
            ContentFormat::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

/// Structured prompt input attached to a task
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAttachment {
    #[serde(rename = "type")]
    pub attachment_type: AttachmentType,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub format: ContentFormat,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ContextAttachment {
    /// Free-form note
    #[must_use]
    pub fn note(content: impl Into<String>) -> Self {
        Self {
            attachment_type: AttachmentType::Note,
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// File reference; content is loaded by the agent unless supplied
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            attachment_type: AttachmentType::File,
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Link reference
    #[must_use]
    pub fn link(url: impl Into<String>) -> Self {
        Self {
            attachment_type: AttachmentType::Link,
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// With priority
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// With format
    #[inline]
    #[must_use]
    pub fn with_format(mut self, format: impl Into<ContentFormat>) -> Self {
        self.format = format.into();
        self
    }

    /// With key
    #[inline]
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// With label
    #[inline]
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// With tags
    #[inline]
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// With inline content
    #[inline]
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// With summary
    #[inline]
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order() {
        assert!(Priority::High < Priority::Medium);
        assert!(Priority::Low < Priority::Unset);
        assert_eq!(Priority::Unset.as_str(), "");
    }

    #[test]
    fn attachment_deserializes_with_defaults() {
        let att: ContextAttachment =
            serde_json::from_str(r#"{"type":"file","path":"src/main.rs","format":"rust"}"#)
                .unwrap();
        assert_eq!(att.attachment_type, AttachmentType::File);
        assert_eq!(att.priority, Priority::Unset);
        assert_eq!(att.format, ContentFormat::Other("rust".into()));
        assert_eq!(att.format.as_str(), "rust");
    }

    #[test]
    fn empty_priority_is_unset() {
        let att: ContextAttachment =
            serde_json::from_str(r#"{"type":"note","priority":"","content":"x"}"#).unwrap();
        assert_eq!(att.priority, Priority::Unset);
    }
}
