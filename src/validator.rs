//! Entry validation, batch previews and option checks
//!
//! Nothing in here fails on malformed input. Problems are reported as
//! [`ValidationError`]s with a severity; only `Error` severity makes an entry
//! invalid.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::entry::{EntryDate, ParsedChangelogEntry};
use crate::importer::{
    ConflictResolution, DateHandling, ImportOptions, ImportStrategy, RawImportOptions,
};
use crate::patterns::{canonical_tag, LOOSE_VERSION_PATTERN, STRICT_VERSION_PATTERN};

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_CONTENT_LENGTH: usize = 50_000;
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    MissingTitle,
    ContentTooLong,
    InvalidVersion,
    InvalidDate,
    MissingContent,
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationErrorKind::MissingTitle => write!(f, "missing_title"),
            ValidationErrorKind::ContentTooLong => write!(f, "content_too_long"),
            ValidationErrorKind::InvalidVersion => write!(f, "invalid_version"),
            ValidationErrorKind::InvalidDate => write!(f, "invalid_date"),
            ValidationErrorKind::MissingContent => write!(f, "missing_content"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single problem found on one field of an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    #[serde(rename = "type")]
    pub kind: ValidationErrorKind,
    pub message: String,
    pub field: String,
    pub value: Option<String>,
    pub severity: Severity,
}

impl ValidationError {
    fn error(kind: ValidationErrorKind, field: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field: field.to_string(),
            value: None,
            severity: Severity::Error,
        }
    }

    fn warning(kind: ValidationErrorKind, field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(kind, field, message)
        }
    }

    fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

/// A parsed entry together with its validation outcome.
///
/// `is_valid` is true exactly when `errors` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedEntry {
    #[serde(flatten)]
    pub entry: ParsedChangelogEntry,
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
    /// Field name to proposed replacement value
    pub suggested_fixes: BTreeMap<String, String>,
}

impl AsRef<ParsedChangelogEntry> for ValidatedEntry {
    fn as_ref(&self) -> &ParsedChangelogEntry {
        &self.entry
    }
}

impl AsRef<ParsedChangelogEntry> for ParsedChangelogEntry {
    fn as_ref(&self) -> &ParsedChangelogEntry {
        self
    }
}

/// Aggregate view of a validated batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPreview {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub invalid_entries: usize,
    /// Versions appearing on two or more entries of the batch, in first-seen order
    pub duplicate_versions: Vec<String>,
    pub missing_titles: usize,
    pub missing_content: usize,
    pub suggested_version_mappings: BTreeMap<String, String>,
    pub suggested_tag_mappings: BTreeMap<String, String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ImportPreview {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable summary of the batch
    pub fn to_text(&self) -> String {
        let mut output = String::new();

        output.push_str("Import Preview\n");
        output.push_str("==============\n");
        output.push_str(&format!("Entries:         {}\n", self.total_entries));
        output.push_str(&format!("Valid:           {}\n", self.valid_entries));
        output.push_str(&format!("Invalid:         {}\n", self.invalid_entries));
        output.push_str(&format!("Missing titles:  {}\n", self.missing_titles));
        output.push_str(&format!("Missing content: {}\n\n", self.missing_content));

        if !self.duplicate_versions.is_empty() {
            output.push_str("Duplicate Versions\n");
            output.push_str("------------------\n");
            for version in &self.duplicate_versions {
                output.push_str(&format!("{}\n", version));
            }
            output.push('\n');
        }

        if !self.suggested_version_mappings.is_empty() || !self.suggested_tag_mappings.is_empty() {
            output.push_str("Suggestions\n");
            output.push_str("-----------\n");
            for (from, to) in &self.suggested_version_mappings {
                output.push_str(&format!("version {} -> {}\n", from, to));
            }
            for (from, to) in &self.suggested_tag_mappings {
                output.push_str(&format!("tag {} -> {}\n", from, to));
            }
            output.push('\n');
        }

        if !self.warnings.is_empty() {
            output.push_str("Warnings\n");
            output.push_str("--------\n");
            for warning in &self.warnings {
                output.push_str(&format!("⚠ {}\n", warning));
            }
            output.push('\n');
        }

        if !self.errors.is_empty() {
            output.push_str("Errors\n");
            output.push_str("------\n");
            for error in &self.errors {
                output.push_str(&format!("✗ {}\n", error));
            }
            output.push('\n');
        }

        output
    }
}

/// Result of [`validate_entries`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchValidation {
    pub validated_entries: Vec<ValidatedEntry>,
    pub preview: ImportPreview,
}

/// An entry whose version is already present in the target changelog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConflict {
    /// Position of the entry in the checked batch
    pub index: usize,
    pub version: String,
    pub title: String,
}

/// Result of [`validate_options`]; `options` is set only when `errors` is empty
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionsValidation {
    pub options: Option<ImportOptions>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Validate one entry
pub fn validate_entry(entry: &ParsedChangelogEntry) -> ValidatedEntry {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut suggested_fixes = BTreeMap::new();

    let title = entry.title.trim();
    if title.is_empty() {
        errors.push(ValidationError::error(
            ValidationErrorKind::MissingTitle,
            "title",
            "Entry title is required",
        ));
    } else if title.chars().count() > MAX_TITLE_LENGTH {
        warnings.push(
            ValidationError::warning(
                ValidationErrorKind::ContentTooLong,
                "title",
                format!("Title is longer than {} characters", MAX_TITLE_LENGTH),
            )
            .with_value(title),
        );
        suggested_fixes.insert("title".to_string(), truncate_title(title));
    }

    if entry.content.trim().is_empty() {
        warnings.push(ValidationError::warning(
            ValidationErrorKind::MissingContent,
            "content",
            "Entry has no content",
        ));
        if !title.is_empty() {
            suggested_fixes.insert("content".to_string(), title.to_string());
        }
    } else {
        let length = entry.content.chars().count();
        if length > MAX_CONTENT_LENGTH {
            errors.push(
                ValidationError::error(
                    ValidationErrorKind::ContentTooLong,
                    "content",
                    format!(
                        "Content is {} characters long (maximum {})",
                        length, MAX_CONTENT_LENGTH
                    ),
                )
                .with_value(length.to_string()),
            );
        }
    }

    if let Some(version) = entry.version_str() {
        if !STRICT_VERSION_PATTERN.is_match(version) {
            warnings.push(
                ValidationError::warning(
                    ValidationErrorKind::InvalidVersion,
                    "version",
                    format!("Version \"{}\" is not a semantic version", version),
                )
                .with_value(version),
            );
            if let Some(sanitized) = sanitize_version(version) {
                suggested_fixes.insert("version".to_string(), sanitized);
            }
        }
    }

    if let Some(EntryDate::Uninterpretable(raw)) = &entry.published_at {
        errors.push(
            ValidationError::error(
                ValidationErrorKind::InvalidDate,
                "published_at",
                format!("Could not interpret \"{}\" as a date", raw),
            )
            .with_value(raw.as_str()),
        );
    }

    ValidatedEntry {
        entry: entry.clone(),
        is_valid: errors.is_empty(),
        errors,
        warnings,
        suggested_fixes,
    }
}

/// Validate a batch and build its preview
pub fn validate_entries(entries: &[ParsedChangelogEntry]) -> BatchValidation {
    let validated_entries: Vec<ValidatedEntry> = entries.iter().map(validate_entry).collect();
    let preview = build_preview(&validated_entries);

    log::debug!(
        "Validated {} entries ({} valid, {} invalid)",
        preview.total_entries,
        preview.valid_entries,
        preview.invalid_entries
    );

    BatchValidation {
        validated_entries,
        preview,
    }
}

fn build_preview(validated: &[ValidatedEntry]) -> ImportPreview {
    let mut preview = ImportPreview {
        total_entries: validated.len(),
        ..Default::default()
    };

    let mut version_counts: HashMap<&str, usize> = HashMap::new();
    let mut version_order = Vec::new();

    for item in validated {
        if item.is_valid {
            preview.valid_entries += 1;
        } else {
            preview.invalid_entries += 1;
        }

        let label = item.entry.label();
        for error in &item.errors {
            if error.kind == ValidationErrorKind::MissingTitle {
                preview.missing_titles += 1;
            }
            preview.errors.push(format!("{}: {}", label, error.message));
        }
        for warning in &item.warnings {
            if warning.kind == ValidationErrorKind::MissingContent {
                preview.missing_content += 1;
            }
            preview.warnings.push(format!("{}: {}", label, warning.message));
        }

        if let Some(version) = item.entry.version_str() {
            let count = version_counts.entry(version).or_insert(0);
            if *count == 0 {
                version_order.push(version);
            }
            *count += 1;
            if let Some(fix) = item.suggested_fixes.get("version") {
                preview
                    .suggested_version_mappings
                    .insert(version.to_string(), fix.clone());
            }
        }

        for tag in &item.entry.tags {
            if let Some(mapped) = suggest_tag(tag) {
                preview.suggested_tag_mappings.insert(tag.clone(), mapped);
            }
        }
    }

    preview.duplicate_versions = version_order
        .into_iter()
        .filter(|version| version_counts.get(version).is_some_and(|count| *count > 1))
        .map(str::to_string)
        .collect();

    preview
}

fn suggest_tag(tag: &str) -> Option<String> {
    let normalized = tag.trim().to_lowercase();
    let target = canonical_tag(&normalized)
        .map(str::to_string)
        .unwrap_or(normalized);
    (!target.is_empty() && target != tag).then_some(target)
}

fn truncate_title(title: &str) -> String {
    let keep = MAX_TITLE_LENGTH - ELLIPSIS.len();
    let mut truncated: String = title.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// Best-effort repair of a version string into `MAJOR.MINOR.PATCH[-pre]`.
///
/// Returns `None` when no numeric group can be found.
pub fn sanitize_version(raw: &str) -> Option<String> {
    let mut rest = raw.trim();
    for prefix in ["version", "release"] {
        if rest
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            rest = rest[prefix.len()..].trim_start();
        }
    }
    let rest = rest.trim_start_matches(['v', 'V']).trim_start();

    let caps = LOOSE_VERSION_PATTERN.captures(rest)?;
    let number = |idx: usize| -> String {
        caps.get(idx)
            .map(|m| {
                m.as_str()
                    .parse::<u64>()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|_| m.as_str().to_string())
            })
            .unwrap_or_else(|| "0".to_string())
    };

    let mut sanitized = format!("{}.{}.{}", number(1), number(2), number(3));
    let suffix: String = caps
        .get(4)
        .map(|m| m.as_str())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .collect();
    let suffix = suffix.trim_matches(|c| c == '.' || c == '-');
    if !suffix.is_empty() {
        sanitized.push('-');
        sanitized.push_str(suffix);
    }

    STRICT_VERSION_PATTERN
        .is_match(&sanitized)
        .then_some(sanitized)
}

/// Entries whose version already exists in `existing_versions`
pub fn check_conflicts<E: AsRef<ParsedChangelogEntry>>(
    entries: &[E],
    existing_versions: &[String],
) -> Vec<VersionConflict> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let entry = entry.as_ref();
            let version = entry.version_str()?;
            existing_versions
                .iter()
                .any(|existing| existing.trim() == version)
                .then(|| VersionConflict {
                    index,
                    version: version.to_string(),
                    title: entry.title.clone(),
                })
        })
        .collect()
}

/// Turn untyped options into [`ImportOptions`], rejecting unknown enum values
pub fn validate_options(raw: &RawImportOptions) -> OptionsValidation {
    let mut errors = Vec::new();
    let defaults = ImportOptions::default();

    let strategy = match raw.strategy.as_deref().map(str::parse::<ImportStrategy>) {
        None => Some(defaults.strategy),
        Some(Ok(value)) => Some(value),
        Some(Err(e)) => {
            errors.push(e.to_string());
            None
        }
    };
    let conflict_resolution = match raw.conflict_resolution.as_deref().map(str::parse::<ConflictResolution>) {
        None => Some(defaults.conflict_resolution),
        Some(Ok(value)) => Some(value),
        Some(Err(e)) => {
            errors.push(e.to_string());
            None
        }
    };
    let date_handling = match raw.date_handling.as_deref().map(str::parse::<DateHandling>) {
        None => Some(defaults.date_handling),
        Some(Ok(value)) => Some(value),
        Some(Err(e)) => {
            errors.push(e.to_string());
            None
        }
    };

    let (Some(strategy), Some(conflict_resolution), Some(date_handling)) =
        (strategy, conflict_resolution, date_handling)
    else {
        return OptionsValidation {
            options: None,
            errors,
            warnings: Vec::new(),
        };
    };

    let options = ImportOptions {
        strategy,
        conflict_resolution,
        date_handling,
        auto_generate_versions: raw
            .auto_generate_versions
            .unwrap_or(defaults.auto_generate_versions),
        publish_imported_entries: raw
            .publish_imported_entries
            .unwrap_or(defaults.publish_imported_entries),
        preserve_existing_entries: raw
            .preserve_existing_entries
            .unwrap_or(defaults.preserve_existing_entries),
        default_tags: raw
            .default_tags
            .iter()
            .flatten()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect(),
    };

    OptionsValidation {
        warnings: options.warnings(),
        options: Some(options),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(title: &str, content: &str, version: Option<&str>) -> ParsedChangelogEntry {
        ParsedChangelogEntry {
            title: title.to_string(),
            content: content.to_string(),
            version: version.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_entry() {
        let mut e = entry("Version 1.0.0", "- Added things", Some("1.0.0"));
        e.published_at = Some(EntryDate::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
        let validated = validate_entry(&e);
        assert!(validated.is_valid);
        assert!(validated.errors.is_empty());
        assert!(validated.warnings.is_empty());
        assert!(validated.suggested_fixes.is_empty());
    }

    #[test]
    fn test_missing_title_is_error() {
        let validated = validate_entry(&entry("   ", "body", None));
        assert!(!validated.is_valid);
        assert_eq!(validated.errors[0].kind, ValidationErrorKind::MissingTitle);
        assert_eq!(validated.errors[0].severity, Severity::Error);
    }

    #[test]
    fn test_long_title_is_warning_with_fix() {
        let title = "x".repeat(250);
        let validated = validate_entry(&entry(&title, "body", None));
        assert!(validated.is_valid);
        assert_eq!(validated.warnings[0].kind, ValidationErrorKind::ContentTooLong);
        let fix = &validated.suggested_fixes["title"];
        assert_eq!(fix.chars().count(), 200);
        assert!(fix.ends_with("..."));
    }

    #[test]
    fn test_long_content_is_error() {
        let content = "a".repeat(MAX_CONTENT_LENGTH + 1);
        let validated = validate_entry(&entry("Big", &content, None));
        assert!(!validated.is_valid);
        assert_eq!(validated.errors[0].kind, ValidationErrorKind::ContentTooLong);
        assert_eq!(validated.errors[0].field, "content");
    }

    #[test]
    fn test_content_at_limit_is_valid() {
        let content = "a".repeat(MAX_CONTENT_LENGTH);
        assert!(validate_entry(&entry("Big", &content, None)).is_valid);
    }

    #[test]
    fn test_missing_content_suggests_title() {
        let validated = validate_entry(&entry("Version 2.0.0", "", Some("2.0.0")));
        assert!(validated.is_valid);
        assert_eq!(validated.warnings[0].kind, ValidationErrorKind::MissingContent);
        assert_eq!(validated.suggested_fixes["content"], "Version 2.0.0");
    }

    #[test]
    fn test_invalid_version_is_warning() {
        let validated = validate_entry(&entry("Release", "body", Some("1.2")));
        assert!(validated.is_valid);
        assert_eq!(validated.warnings[0].kind, ValidationErrorKind::InvalidVersion);
        assert_eq!(validated.warnings[0].value.as_deref(), Some("1.2"));
        assert_eq!(validated.suggested_fixes["version"], "1.2.0");
    }

    #[test]
    fn test_uninterpretable_date_is_error() {
        let mut e = entry("Version 1.0.0", "body", Some("1.0.0"));
        e.published_at = Some(EntryDate::Uninterpretable("2024-13-45".to_string()));
        let validated = validate_entry(&e);
        assert!(!validated.is_valid);
        assert_eq!(validated.errors[0].kind, ValidationErrorKind::InvalidDate);
    }

    #[test]
    fn test_validity_matches_errors() {
        let entries = vec![
            entry("", "", Some("bogus")),
            entry("Fine", "body", Some("1.0.0")),
            entry(&"t".repeat(300), &"c".repeat(60_000), Some("v2")),
        ];
        for item in validate_entries(&entries).validated_entries {
            assert_eq!(item.is_valid, item.errors.is_empty());
        }
    }

    #[test]
    fn test_sanitize_version() {
        assert_eq!(sanitize_version("Version 1.2").as_deref(), Some("1.2.0"));
        assert_eq!(sanitize_version("release v3").as_deref(), Some("3.0.0"));
        assert_eq!(sanitize_version("v1.2.3 beta_1").as_deref(), Some("1.2.3-beta1"));
        assert_eq!(sanitize_version("01.02.03").as_deref(), Some("1.2.3"));
        assert_eq!(sanitize_version("1.2.3.4").as_deref(), Some("1.2.3-4"));
        assert_eq!(sanitize_version("latest"), None);
    }

    #[test]
    fn test_batch_preview() {
        let mut tagged = entry("Version 1.0.0", "a", Some("1.0.0"));
        tagged.tags.insert("bugfix".to_string());
        tagged.tags.insert("Security".to_string());
        tagged.tags.insert("fix".to_string());
        let entries = vec![
            tagged,
            entry("Version 1.0.0 again", "b", Some("1.0.0")),
            entry("", "c", None),
            entry("Empty", "", Some("2.1")),
        ];

        let batch = validate_entries(&entries);
        let preview = &batch.preview;
        assert_eq!(preview.total_entries, 4);
        assert_eq!(preview.valid_entries + preview.invalid_entries, preview.total_entries);
        assert_eq!(preview.invalid_entries, 1);
        assert_eq!(preview.duplicate_versions, vec!["1.0.0".to_string()]);
        assert_eq!(preview.missing_titles, 1);
        assert_eq!(preview.missing_content, 1);
        assert_eq!(preview.suggested_version_mappings["2.1"], "2.1.0");
        assert_eq!(preview.suggested_tag_mappings["bugfix"], "fix");
        assert_eq!(preview.suggested_tag_mappings["Security"], "security");
        assert!(!preview.suggested_tag_mappings.contains_key("fix"));
        assert_eq!(preview.errors.len(), 1);
        assert!(preview.warnings.iter().any(|w| w.starts_with("\"Empty\"")));
    }

    #[test]
    fn test_empty_batch_preview() {
        let batch = validate_entries(&[]);
        assert_eq!(batch.preview, ImportPreview::default());
    }

    #[test]
    fn test_check_conflicts() {
        let entries = vec![
            entry("A", "a", Some("1.0.0")),
            entry("B", "b", Some("2.0.0")),
            entry("C", "c", None),
        ];
        let existing = vec!["2.0.0".to_string(), "3.0.0".to_string()];
        let conflicts = check_conflicts(&entries, &existing);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].index, 1);
        assert_eq!(conflicts[0].version, "2.0.0");
    }

    #[test]
    fn test_validate_options_rejects_unknown_values() {
        let raw = RawImportOptions {
            strategy: Some("upsert".to_string()),
            date_handling: Some("backdate".to_string()),
            ..Default::default()
        };
        let result = validate_options(&raw);
        assert!(result.options.is_none());
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_validate_options_defaults_and_warning() {
        let result = validate_options(&RawImportOptions::default());
        assert_eq!(result.options, Some(ImportOptions::default()));
        assert!(result.warnings.is_empty());

        let raw = RawImportOptions {
            strategy: Some("replace".to_string()),
            default_tags: Some(vec![" imported ".to_string(), "".to_string()]),
            ..Default::default()
        };
        let result = validate_options(&raw);
        let options = result.options.unwrap();
        assert_eq!(options.strategy, ImportStrategy::Replace);
        assert_eq!(options.default_tags.len(), 1);
        assert!(options.default_tags.contains("imported"));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_preview_to_text() {
        let batch = validate_entries(&[entry("Version 1.0.0", "", Some("1.0.0"))]);
        let text = batch.preview.to_text();
        assert!(text.contains("Import Preview"));
        assert!(text.contains("Entries:         1"));
        assert!(text.contains("⚠ \"Version 1.0.0\": Entry has no content"));
    }
}
