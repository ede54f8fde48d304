use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed page state: the input to an analysis.
///
/// Immutable once captured; the text is already truncated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub title: String,
    pub url: String,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Build a snapshot, keeping at most `max_chars` characters of `text`.
    pub fn capture(
        title: impl Into<String>,
        url: impl Into<String>,
        text: &str,
        max_chars: usize,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            text: truncate_chars(text, max_chars).to_string(),
            captured_at,
        }
    }

    pub fn source(&self) -> SourceContext {
        SourceContext {
            title: self.title.clone(),
            url: self.url.clone(),
        }
    }
}

/// Title/url pair identifying where an analysis came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContext {
    pub title: String,
    pub url: String,
}

/// Prefix of `text` holding at most `max_chars` characters.
/// Never splits a UTF-8 sequence.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
