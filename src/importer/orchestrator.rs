//! Entry point for callers: detection, previews, full imports and advice.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::options::{ConflictResolution, DateHandling, ImportOptions, ImportStrategy, RawImportOptions};
use super::processor::ImportProcessor;
use super::report::ImportResult;
use crate::detector::{detect_format, FormatDetection};
use crate::entry::ParsedChangelog;
use crate::parser::{looks_like_version_header, parse_changelog};
use crate::store::{ChangelogStore, ImportAuthorizer};
use crate::validator::{validate_entries, validate_options, ImportPreview, ValidatedEntry};

pub const MIN_CONTENT_BYTES: usize = 10;
pub const MAX_CONTENT_BYTES: usize = 1024 * 1024;
/// Above this many entries an import is better done in batches
pub const LARGE_IMPORT_ENTRIES: usize = 50;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("No valid entries found")]
    NoEntries,
    #[error("invalid import options: {}", .0.join("; "))]
    InvalidOptions(Vec<String>),
}

/// Result of [`ChangelogImporter::preview_import`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewOutcome {
    pub parsed: ParsedChangelog,
    pub preview: ImportPreview,
    pub validated_entries: Vec<ValidatedEntry>,
}

/// Result of [`ChangelogImporter::perform_complete_import`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteImport {
    pub parsed: ParsedChangelog,
    pub preview: ImportPreview,
    pub result: ImportResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStats {
    pub size_bytes: usize,
    pub line_count: usize,
    pub heading_count: usize,
    pub list_item_count: usize,
    pub link_count: usize,
    /// Level 1 and 2 headings that look like version headers
    pub estimated_entries: usize,
}

/// Result of [`ChangelogImporter::validate_content`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentCheck {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stats: ContentStats,
}

/// Heuristic advice; never applied automatically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecommendations {
    pub recommended_strategy: ImportStrategy,
    pub recommended_options: ImportOptions,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Ties parsing, validation and processing together
pub struct ChangelogImporter {
    processor: ImportProcessor,
}

impl ChangelogImporter {
    pub fn new(store: Arc<dyn ChangelogStore>, authorizer: Arc<dyn ImportAuthorizer>) -> Self {
        Self {
            processor: ImportProcessor::new(store, authorizer),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.processor = self.processor.with_cancellation(token);
        self
    }

    pub fn detect_format(&self, content: &str) -> FormatDetection {
        detect_format(content)
    }

    /// Parse and validate without writing anything
    pub fn preview_import(&self, content: &str) -> Result<PreviewOutcome, ImportError> {
        let parsed = parse_changelog(content);
        if parsed.entries.is_empty() {
            return Err(ImportError::NoEntries);
        }
        let batch = validate_entries(&parsed.entries);
        Ok(PreviewOutcome {
            parsed,
            preview: batch.preview,
            validated_entries: batch.validated_entries,
        })
    }

    /// Parse, validate and import `content` into the changelog of `target_id`.
    ///
    /// Only unusable options and an empty parse are returned as errors. Every
    /// other problem, including permission denial, is reported inside the
    /// returned [`ImportResult`].
    pub async fn perform_complete_import(
        &self,
        content: &str,
        target_id: &str,
        options: &RawImportOptions,
        actor_id: &str,
    ) -> Result<CompleteImport, ImportError> {
        let checked = validate_options(options);
        let Some(options) = checked.options else {
            return Err(ImportError::InvalidOptions(checked.errors));
        };

        let PreviewOutcome {
            parsed,
            preview,
            validated_entries,
        } = self.preview_import(content)?;
        log::info!(
            "Parsed {} entries ({} valid) from {} changelog",
            preview.total_entries,
            preview.valid_entries,
            parsed.metadata.original_format
        );

        let result = self
            .processor
            .process_import(target_id, &validated_entries, &options, actor_id)
            .await;

        Ok(CompleteImport {
            parsed,
            preview,
            result,
        })
    }

    /// Cheap pre-flight check run before a full parse
    pub fn validate_content(&self, content: &str) -> ContentCheck {
        let mut check = ContentCheck {
            stats: ContentStats {
                size_bytes: content.len(),
                line_count: content.lines().count(),
                ..Default::default()
            },
            ..Default::default()
        };

        if content.trim().len() < MIN_CONTENT_BYTES {
            check.errors.push(format!(
                "Content is too short (minimum {} bytes)",
                MIN_CONTENT_BYTES
            ));
        }
        if content.len() > MAX_CONTENT_BYTES {
            check
                .errors
                .push("Content exceeds the maximum size of 1MB".to_string());
        } else {
            scan_markdown(content, &mut check.stats);
        }

        if check.errors.is_empty() {
            let stats = &check.stats;
            if stats.heading_count == 0 && stats.list_item_count == 0 {
                check
                    .warnings
                    .push("Content does not look like Markdown (no headings or lists)".to_string());
            }
            if stats.estimated_entries == 0 {
                check
                    .warnings
                    .push("No version headers found; the content may not yield any entries".to_string());
            }
        }

        check.is_valid = check.errors.is_empty();
        check
    }

    pub fn get_import_recommendations(&self, content: &str) -> ImportRecommendations {
        let parsed = parse_changelog(content);
        let count = parsed.entries.len();
        let mut warnings = parsed.metadata.parse_warnings.clone();
        let mut suggestions = Vec::new();

        let recommended_strategy = if count > LARGE_IMPORT_ENTRIES {
            suggestions.push(format!(
                "Large changelog ({} entries); consider importing it in smaller batches",
                count
            ));
            ImportStrategy::Append
        } else {
            ImportStrategy::Merge
        };

        let date_handling = if parsed.metadata.has_dates {
            DateHandling::Preserve
        } else {
            if count > 0 {
                suggestions
                    .push("No release dates found; entries will be dated at import time".to_string());
            }
            DateHandling::Current
        };

        let auto_generate_versions = count > 0 && !parsed.metadata.has_versions;
        if auto_generate_versions {
            suggestions.push(
                "No versions found; enable auto_generate_versions to number the entries".to_string(),
            );
        }

        if count > 0 {
            let preview = validate_entries(&parsed.entries).preview;
            for version in &preview.duplicate_versions {
                warnings.push(format!("Version {} appears more than once", version));
            }
            if preview.invalid_entries > 0 {
                warnings.push(format!(
                    "{} of {} entries failed validation and will not be imported",
                    preview.invalid_entries, preview.total_entries
                ));
            }
            if !preview.suggested_tag_mappings.is_empty() {
                suggestions.push("Some tags have canonical names; see the preview for mappings".to_string());
            }
        }

        let recommended_options = ImportOptions {
            strategy: recommended_strategy,
            conflict_resolution: ConflictResolution::Skip,
            date_handling,
            auto_generate_versions,
            ..ImportOptions::default()
        };

        ImportRecommendations {
            recommended_strategy,
            recommended_options,
            warnings,
            suggestions,
        }
    }
}

/// Count Markdown constructs and version-like level 1 and 2 headings
fn scan_markdown(content: &str, stats: &mut ContentStats) {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut heading_text: Option<String> = None;
    for event in Parser::new_ext(content, options) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                stats.heading_count += 1;
                if matches!(level, HeadingLevel::H1 | HeadingLevel::H2) {
                    heading_text = Some(String::new());
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(text) = heading_text.take() {
                    if looks_like_version_header(text.trim()) {
                        stats.estimated_entries += 1;
                    }
                }
            }
            Event::Start(Tag::Item) => stats.list_item_count += 1,
            Event::Start(Tag::Link { .. }) => stats.link_count += 1,
            Event::Text(text) | Event::Code(text) => {
                if let Some(buffer) = heading_text.as_mut() {
                    buffer.push_str(&text);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AllowAll, MemoryStore};

    const SAMPLE: &str = "# Changelog\n\n## [1.1.0] - 2024-02-01\n### Added\n- Export\n\n## [1.0.0] - 2024-01-15\n- First release\n";

    fn importer() -> ChangelogImporter {
        ChangelogImporter::new(Arc::new(MemoryStore::new()), Arc::new(AllowAll))
    }

    #[test]
    fn test_preview_rejects_empty_parse() {
        let err = importer().preview_import("just some words").unwrap_err();
        assert!(matches!(err, ImportError::NoEntries));
        assert_eq!(err.to_string(), "No valid entries found");
    }

    #[test]
    fn test_preview_import() {
        let outcome = importer().preview_import(SAMPLE).unwrap();
        assert_eq!(outcome.preview.total_entries, 2);
        assert_eq!(outcome.validated_entries.len(), 2);
        assert!(outcome.parsed.metadata.has_dates);
    }

    #[tokio::test]
    async fn test_invalid_options_are_rejected() {
        let options = RawImportOptions {
            conflict_resolution: Some("ask".to_string()),
            ..Default::default()
        };
        let err = importer()
            .perform_complete_import(SAMPLE, "p", &options, "me")
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidOptions(ref errors) if errors.len() == 1));
    }

    #[tokio::test]
    async fn test_complete_import() {
        let outcome = importer()
            .perform_complete_import(SAMPLE, "p", &RawImportOptions::default(), "me")
            .await
            .unwrap();
        assert!(outcome.result.success);
        assert_eq!(outcome.result.imported_count, 2);
        assert_eq!(outcome.result.created_entries[0].version.as_deref(), Some("1.1.0"));
    }

    #[test]
    fn test_validate_content_bounds() {
        let check = importer().validate_content("tiny");
        assert!(!check.is_valid);
        assert_eq!(check.errors.len(), 1);

        let huge = "a".repeat(MAX_CONTENT_BYTES + 1);
        let check = importer().validate_content(&huge);
        assert!(!check.is_valid);
        assert_eq!(check.stats.heading_count, 0);
    }

    #[test]
    fn test_validate_content_stats() {
        let check = importer().validate_content(SAMPLE);
        assert!(check.is_valid);
        assert!(check.warnings.is_empty());
        assert_eq!(check.stats.heading_count, 4);
        assert_eq!(check.stats.list_item_count, 2);
        assert_eq!(check.stats.estimated_entries, 2);
    }

    #[test]
    fn test_validate_content_plain_text_warns() {
        let check = importer().validate_content("This is a plain paragraph of text.");
        assert!(check.is_valid);
        assert_eq!(check.warnings.len(), 2);
    }

    #[test]
    fn test_recommendations_small_changelog() {
        let advice = importer().get_import_recommendations(SAMPLE);
        assert_eq!(advice.recommended_strategy, ImportStrategy::Merge);
        assert_eq!(advice.recommended_options.conflict_resolution, ConflictResolution::Skip);
        assert_eq!(advice.recommended_options.date_handling, DateHandling::Preserve);
        assert!(!advice.recommended_options.auto_generate_versions);
        assert!(advice.warnings.is_empty());
    }

    #[test]
    fn test_recommendations_large_changelog() {
        let mut content = String::new();
        for i in 0..60 {
            content.push_str(&format!("## 1.{}.0\n- change {}\n\n", i, i));
        }
        let advice = importer().get_import_recommendations(&content);
        assert_eq!(advice.recommended_strategy, ImportStrategy::Append);
        assert_eq!(advice.recommended_options.date_handling, DateHandling::Current);
        assert!(advice.suggestions.iter().any(|s| s.contains("smaller batches")));
    }
}
