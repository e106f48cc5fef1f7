//! Static pattern tables shared by the detector, parser and validator.

use once_cell::sync::Lazy;
use regex::Regex;

/// Version shapes tried in order; the first capture group holds the version.
pub static VERSION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\[v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?)\]",
        r"(?i)\b(?:version|release)\s+v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?)",
        r"(?i)(?:^|[\s(])v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]*[0-9A-Za-z])?)",
        r"(?i)(?:^|\s)v?(\d+\.\d+)(?:\s|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Failed to compile version regex"))
    .collect()
});

const ISO_FORMATS: &[&str] = &["%Y-%m-%d"];
const SLASH_FORMATS: &[&str] = &["%Y/%m/%d"];
const US_FORMATS: &[&str] = &["%m/%d/%Y", "%d/%m/%Y"];
const MONTH_FIRST_FORMATS: &[&str] = &["%B %d %Y", "%b %d %Y"];
const DAY_FIRST_FORMATS: &[&str] = &["%d %B %Y", "%d %b %Y"];

/// Date shapes tried in order, each paired with the chrono formats that can interpret it.
pub static DATE_PATTERNS: Lazy<Vec<(Regex, &'static [&'static str])>> = Lazy::new(|| {
    const MONTH: &str = "(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*";
    vec![
        (
            Regex::new(r"\b\d{4}-\d{1,2}-\d{1,2}\b").expect("Failed to compile ISO date regex"),
            ISO_FORMATS,
        ),
        (
            Regex::new(r"\b\d{4}/\d{1,2}/\d{1,2}\b").expect("Failed to compile slash date regex"),
            SLASH_FORMATS,
        ),
        (
            Regex::new(r"\b\d{1,2}/\d{1,2}/\d{4}\b").expect("Failed to compile US date regex"),
            US_FORMATS,
        ),
        (
            Regex::new(&format!(r"(?i)\b{MONTH}\.?\s+\d{{1,2}},?\s+\d{{4}}\b"))
                .expect("Failed to compile month-first date regex"),
            MONTH_FIRST_FORMATS,
        ),
        (
            Regex::new(&format!(r"(?i)\b\d{{1,2}}\s+{MONTH}\.?,?\s+\d{{4}}\b"))
                .expect("Failed to compile day-first date regex"),
            DAY_FIRST_FORMATS,
        ),
    ]
});

/// Canonical semantic version accepted by the validator.
pub static STRICT_VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^v?\d+\.\d+\.\d+(-[A-Za-z0-9.-]+)?$").expect("Failed to compile semver regex")
});

/// Up to three dot-separated numeric groups followed by whatever suffix remains.
pub static LOOSE_VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?(.*)$").expect("Failed to compile loose version regex")
});

/// Any ATX heading; group 1 holds the hashes, group 2 the text.
pub static HEADER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(#{1,6})\s+(.*?)(?:\s+#+)?\s*$").expect("Failed to compile header regex")
});

/// `[1.2.3] - 2024-01-15`
pub static CLI_HEADER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?)\]\s*[-–—]\s*(.+)$")
        .expect("Failed to compile CLI header regex")
});

/// `[](https://github.com/o/r/compare/v1.0.0...v1.1.0) (2024-01-15)`
pub static COMPARE_LINK_HEADER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[([^\]]*)\]\(([^)]*)\)\s*\(([^)]+)\)\s*$")
        .expect("Failed to compile compare link header regex")
});

/// `[1.2.3] (2024-01-15)`
pub static BRACKET_PAREN_HEADER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[([^\]]+)\]\s*\(([^)]+)\)\s*$")
        .expect("Failed to compile bracketed header regex")
});

/// `[1.2.3] anything`
pub static BRACKET_HEADER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[([^\]]+)\]\s*(.*)$").expect("Failed to compile bracket header regex")
});

pub static UNRELEASED_PREFIX_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\[?\s*(unreleased|latest|current)").expect("Failed to compile unreleased regex")
});

/// `[1.2.3]: https://...` reference-style link definitions at the foot of a changelog
pub static VERSION_LINK_FOOTNOTE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\[(?:v?\d+\.\d+\.\d+[^\]]*|unreleased)\]:\s*https?://")
        .expect("Failed to compile footnote regex")
});

pub static RELEASE_HEADER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^#+\s*(release|v\d+\.\d+\.\d+)").expect("Failed to compile release header regex")
});

pub static LIST_ITEM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+").expect("Failed to compile list item regex")
});

pub static INLINE_MARKDOWN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*\*[^*]+\*\*|`[^`]+`|\[[^\]]*\]\([^)]*\)").expect("Failed to compile inline markdown regex")
});

/// Free-text section headings and the tag each one implies.
pub const SECTION_MARKERS: &[(&str, &str)] = &[
    ("added", "added"),
    ("changed", "changed"),
    ("deprecated", "deprecated"),
    ("removed", "removed"),
    ("fixed", "fixed"),
    ("security", "security"),
    ("features", "feature"),
    ("new features", "feature"),
    ("enhancements", "enhancement"),
    ("improvements", "enhancement"),
    ("bug fixes", "bugfix"),
    ("bugfixes", "bugfix"),
    ("fixes", "fix"),
    ("performance", "performance"),
    ("performance improvements", "performance"),
    ("documentation", "documentation"),
    ("docs", "docs"),
    ("breaking changes", "breaking-changes"),
    ("breaking", "breaking"),
    ("refactor", "refactor"),
    ("code refactoring", "refactor"),
    ("chores", "chore"),
    ("maintenance", "maintenance"),
    ("miscellaneous", "misc"),
    ("reverts", "revert"),
    ("tests", "test"),
    ("build system", "build"),
];

/// Tag synonyms folded into a canonical name.
pub const TAG_SYNONYMS: &[(&str, &str)] = &[
    ("bug", "fix"),
    ("bugfix", "fix"),
    ("bugs", "fix"),
    ("fixed", "fix"),
    ("fixes", "fix"),
    ("feature", "feat"),
    ("features", "feat"),
    ("enhancement", "feat"),
    ("documentation", "docs"),
    ("doc", "docs"),
    ("breaking", "breaking-change"),
    ("breaking-changes", "breaking-change"),
    ("performance", "perf"),
    ("optimization", "perf"),
    ("maintenance", "chore"),
    ("housekeeping", "chore"),
    ("misc", "chore"),
];

/// Looks up the tag implied by a section heading, ignoring case and trailing colons.
pub fn section_marker_tag(heading: &str) -> Option<&'static str> {
    let key = heading.trim().trim_end_matches(':').trim().to_lowercase();
    SECTION_MARKERS
        .iter()
        .find(|(marker, _)| *marker == key)
        .map(|(_, tag)| *tag)
}

/// Returns the canonical tag name for a known synonym.
pub fn canonical_tag(tag: &str) -> Option<&'static str> {
    let key = tag.trim().to_lowercase();
    TAG_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == key)
        .map(|(_, canonical)| *canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_marker_lookup() {
        assert_eq!(section_marker_tag("Bug Fixes"), Some("bugfix"));
        assert_eq!(section_marker_tag("  Added: "), Some("added"));
        assert_eq!(section_marker_tag("Random notes"), None);
    }

    #[test]
    fn test_canonical_tag() {
        assert_eq!(canonical_tag("Bugfix"), Some("fix"));
        assert_eq!(canonical_tag("housekeeping"), Some("chore"));
        assert_eq!(canonical_tag("fix"), None);
    }

    #[test]
    fn test_strict_version_pattern() {
        assert!(STRICT_VERSION_PATTERN.is_match("1.2.3"));
        assert!(STRICT_VERSION_PATTERN.is_match("v1.2.3-beta.1"));
        assert!(!STRICT_VERSION_PATTERN.is_match("1.2"));
        assert!(!STRICT_VERSION_PATTERN.is_match("version 1.2.3"));
    }

    #[test]
    fn test_header_pattern_strips_closing_hashes() {
        let caps = HEADER_PATTERN.captures("## 1.0.0 ##").unwrap();
        assert_eq!(&caps[1], "##");
        assert_eq!(&caps[2], "1.0.0");
    }
}
