//! Entry model produced by the parser and consumed by the validator and processor.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::detector::ChangelogFormat;

/// Date found in an entry header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryDate {
    Date(NaiveDate),
    /// Text that looked like a date but could not be interpreted
    Uninterpretable(String),
}

impl EntryDate {
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            EntryDate::Date(date) => Some(*date),
            EntryDate::Uninterpretable(_) => None,
        }
    }
}

impl fmt::Display for EntryDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryDate::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            EntryDate::Uninterpretable(raw) => write!(f, "{}", raw),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Ordinal of the entry within its parse
    pub source_index: usize,
    /// Line of the entry header (1-indexed)
    pub source_line: usize,
    pub reading_time_minutes: usize,
}

/// One versioned entry recovered from a changelog document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedChangelogEntry {
    pub title: String,
    /// Markdown body, may be empty
    pub content: String,
    pub version: Option<String>,
    pub published_at: Option<EntryDate>,
    pub tags: BTreeSet<String>,
    pub metadata: EntryMetadata,
}

impl ParsedChangelogEntry {
    /// Short label used in warnings and reports.
    pub fn label(&self) -> String {
        match (&self.version, self.title.trim().is_empty()) {
            (Some(version), true) => format!("version {}", version),
            (_, false) => format!("\"{}\"", self.title.trim()),
            (None, true) => format!("entry #{}", self.metadata.source_index + 1),
        }
    }

    /// The version, if present and non-blank.
    pub fn version_str(&self) -> Option<&str> {
        self.version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// A header encountered while scanning, kept for diagnostics and previews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogSection {
    pub heading: String,
    /// 1 to 3
    pub level: u8,
    pub content: String,
    pub entries: Vec<ParsedChangelogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseMetadata {
    pub total_sections: usize,
    pub total_entries: usize,
    pub has_versions: bool,
    pub has_dates: bool,
    pub original_format: ChangelogFormat,
    pub parse_warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedChangelog {
    pub sections: Vec<ChangelogSection>,
    pub entries: Vec<ParsedChangelogEntry>,
    pub metadata: ParseMetadata,
}

/// Estimated minutes to read `content` at 200 words per minute.
pub fn estimate_reading_time(content: &str) -> usize {
    let words = content.split_whitespace().count();
    if words == 0 {
        0
    } else {
        words.div_ceil(200).max(1)
    }
}
