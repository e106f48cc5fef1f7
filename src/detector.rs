//! Changelog format detection
//!
//! Classifies raw changelog text by additive heuristics. Detection never fails:
//! anything unrecognised is reported as [`ChangelogFormat::Simple`] with a low
//! confidence.

use serde::{Deserialize, Serialize};

use crate::patterns::{
    section_marker_tag, DATE_PATTERNS, HEADER_PATTERN, INLINE_MARKDOWN_PATTERN,
    LIST_ITEM_PATTERN, RELEASE_HEADER_PATTERN, UNRELEASED_PREFIX_PATTERN,
    VERSION_LINK_FOOTNOTE_PATTERN, VERSION_PATTERNS,
};

/// Detected changelog convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChangelogFormat {
    /// keepachangelog.com layout
    #[serde(rename = "keepachangelog")]
    KeepAChangelog,
    /// GitHub release notes / conventional-changelog output
    #[serde(rename = "github_releases")]
    GitHubReleases,
    /// Markdown with version headers that matches no known template
    #[serde(rename = "custom")]
    Custom,
    /// Plain text or unrecognised layout
    #[default]
    #[serde(rename = "simple")]
    Simple,
}

impl std::fmt::Display for ChangelogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangelogFormat::KeepAChangelog => write!(f, "keepachangelog"),
            ChangelogFormat::GitHubReleases => write!(f, "github_releases"),
            ChangelogFormat::Custom => write!(f, "custom"),
            ChangelogFormat::Simple => write!(f, "simple"),
        }
    }
}

/// Structural signals, computed independently of the format decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatStructure {
    pub has_version_headers: bool,
    pub has_date_headers: bool,
    pub has_type_headers: bool,
    pub uses_list_format: bool,
    pub uses_markdown_syntax: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDetection {
    pub format: ChangelogFormat,
    /// Between 0.0 and 1.0
    pub confidence: f64,
    pub characteristics: Vec<String>,
    pub structure: FormatStructure,
}

const KEEP_A_CHANGELOG_EVIDENCE: f64 = 0.4;
const KEEP_A_CHANGELOG_FIXED: f64 = 0.2;
const GITHUB_RELEASES_EVIDENCE: f64 = 0.3;
const GITHUB_RELEASES_FIXED: f64 = 0.15;
const SECTION_HEADER_EVIDENCE: f64 = 0.2;
const CUSTOM_EVIDENCE: f64 = 0.1;

/// Detect the changelog format of `content`
pub fn detect_format(content: &str) -> FormatDetection {
    let structure = analyze_structure(content);
    let mut format = None;
    let mut confidence: f64 = 0.0;
    let mut characteristics = Vec::new();

    let lowered = content.to_lowercase();
    let has_marker = lowered.contains("keep a changelog");
    let has_unreleased = content.lines().any(|line| {
        HEADER_PATTERN
            .captures(line.trim())
            .is_some_and(|caps| UNRELEASED_PREFIX_PATTERN.is_match(caps[2].trim()))
    });
    let has_footnotes = VERSION_LINK_FOOTNOTE_PATTERN.is_match(content);

    if has_marker || (has_unreleased && has_footnotes) {
        if has_marker {
            characteristics.push("keep a changelog marker".to_string());
        } else {
            characteristics.push("unreleased section with version link footnotes".to_string());
        }
        confidence += KEEP_A_CHANGELOG_EVIDENCE;
        format = Some(ChangelogFormat::KeepAChangelog);
        confidence += KEEP_A_CHANGELOG_FIXED;
    }

    if content
        .lines()
        .any(|line| RELEASE_HEADER_PATTERN.is_match(line.trim()))
    {
        characteristics.push("release headers".to_string());
        confidence += GITHUB_RELEASES_EVIDENCE;
        if format.is_none() {
            format = Some(ChangelogFormat::GitHubReleases);
            confidence += GITHUB_RELEASES_FIXED;
        }
    }

    if structure.has_type_headers {
        characteristics.push("change type section headers".to_string());
        confidence += SECTION_HEADER_EVIDENCE;
    }

    let format = match format {
        Some(format) => format,
        None if structure.uses_markdown_syntax && structure.has_version_headers => {
            characteristics.push("markdown version headers".to_string());
            confidence += CUSTOM_EVIDENCE;
            ChangelogFormat::Custom
        }
        None => ChangelogFormat::Simple,
    };

    log::debug!(
        "Detected changelog format {} (confidence {:.2})",
        format,
        confidence.min(1.0)
    );

    FormatDetection {
        format,
        confidence: confidence.min(1.0),
        characteristics,
        structure,
    }
}

fn analyze_structure(content: &str) -> FormatStructure {
    let mut structure = FormatStructure::default();

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(caps) = HEADER_PATTERN.captures(trimmed) {
            let text = caps[2].trim();
            structure.uses_markdown_syntax = true;
            if VERSION_PATTERNS.iter().any(|p| p.is_match(text)) {
                structure.has_version_headers = true;
            }
            if DATE_PATTERNS.iter().any(|(p, _)| p.is_match(text)) {
                structure.has_date_headers = true;
            }
            if section_marker_tag(text).is_some() {
                structure.has_type_headers = true;
            }
        } else if LIST_ITEM_PATTERN.is_match(line) {
            structure.uses_list_format = true;
        }
        if INLINE_MARKDOWN_PATTERN.is_match(trimmed) {
            structure.uses_markdown_syntax = true;
        }
    }

    structure
}
