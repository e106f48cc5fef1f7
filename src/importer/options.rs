//! Import options and strategy types for changelog import

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;

/// An option value that names no known variant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {option} \"{value}\" (expected one of: {expected})")]
pub struct UnknownOptionValue {
    pub option: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// How imported entries combine with entries already in the target changelog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStrategy {
    /// Keep existing entries, resolve version conflicts
    #[default]
    Merge,
    /// Delete existing entries first, inside one transaction
    Replace,
    /// Add entries after the existing ones, resolving conflicts like merge
    Append,
}

impl std::fmt::Display for ImportStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportStrategy::Merge => write!(f, "merge"),
            ImportStrategy::Replace => write!(f, "replace"),
            ImportStrategy::Append => write!(f, "append"),
        }
    }
}

impl FromStr for ImportStrategy {
    type Err = UnknownOptionValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "merge" => Ok(ImportStrategy::Merge),
            "replace" => Ok(ImportStrategy::Replace),
            "append" => Ok(ImportStrategy::Append),
            _ => Err(UnknownOptionValue {
                option: "strategy",
                value: s.to_string(),
                expected: "merge, replace, append",
            }),
        }
    }
}

/// What to do when an imported version already exists in the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    #[default]
    Skip,
    /// Write the entry regardless of the existing version
    Overwrite,
    /// Ask the user; without an interactive channel this behaves like skip
    Prompt,
}

impl std::fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictResolution::Skip => write!(f, "skip"),
            ConflictResolution::Overwrite => write!(f, "overwrite"),
            ConflictResolution::Prompt => write!(f, "prompt"),
        }
    }
}

impl FromStr for ConflictResolution {
    type Err = UnknownOptionValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(ConflictResolution::Skip),
            "overwrite" => Ok(ConflictResolution::Overwrite),
            "prompt" => Ok(ConflictResolution::Prompt),
            _ => Err(UnknownOptionValue {
                option: "conflict resolution",
                value: s.to_string(),
                expected: "skip, overwrite, prompt",
            }),
        }
    }
}

/// Which timestamps imported entries receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateHandling {
    /// Use the date from the changelog header when there is one
    #[default]
    Preserve,
    /// Stamp every entry with the import time
    Current,
    /// Order-based dating; currently stamps like `Current`
    Sequence,
}

impl std::fmt::Display for DateHandling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateHandling::Preserve => write!(f, "preserve"),
            DateHandling::Current => write!(f, "current"),
            DateHandling::Sequence => write!(f, "sequence"),
        }
    }
}

impl FromStr for DateHandling {
    type Err = UnknownOptionValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "preserve" => Ok(DateHandling::Preserve),
            "current" => Ok(DateHandling::Current),
            "sequence" => Ok(DateHandling::Sequence),
            _ => Err(UnknownOptionValue {
                option: "date handling",
                value: s.to_string(),
                expected: "preserve, current, sequence",
            }),
        }
    }
}

/// Options for one import run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    pub strategy: ImportStrategy,
    pub conflict_resolution: ConflictResolution,
    pub date_handling: DateHandling,
    /// Give versionless entries the next patch version
    pub auto_generate_versions: bool,
    pub publish_imported_entries: bool,
    /// Under `replace`, keep the existing entries instead of deleting them
    pub preserve_existing_entries: bool,
    pub default_tags: BTreeSet<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            strategy: ImportStrategy::Merge,
            conflict_resolution: ConflictResolution::Skip,
            date_handling: DateHandling::Preserve,
            auto_generate_versions: false,
            publish_imported_entries: true,
            preserve_existing_entries: true,
            default_tags: BTreeSet::new(),
        }
    }
}

impl ImportOptions {
    /// Create new import options with the given strategy
    pub fn new(strategy: ImportStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    pub fn with_conflict_resolution(mut self, resolution: ConflictResolution) -> Self {
        self.conflict_resolution = resolution;
        self
    }

    pub fn with_date_handling(mut self, date_handling: DateHandling) -> Self {
        self.date_handling = date_handling;
        self
    }

    pub fn with_preserve_existing(mut self, preserve: bool) -> Self {
        self.preserve_existing_entries = preserve;
        self
    }

    pub fn with_publish(mut self, publish: bool) -> Self {
        self.publish_imported_entries = publish;
        self
    }

    pub fn with_auto_generate_versions(mut self, enabled: bool) -> Self {
        self.auto_generate_versions = enabled;
        self
    }

    pub fn with_default_tag(mut self, tag: impl Into<String>) -> Self {
        self.default_tags.insert(tag.into());
        self
    }

    /// Non-fatal warnings about option combinations that contradict each other
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.strategy == ImportStrategy::Replace && self.preserve_existing_entries {
            warnings.push(
                "Strategy \"replace\" with preserve_existing_entries keeps existing entries; nothing will be replaced"
                    .to_string(),
            );
        }
        warnings
    }
}

/// Import options as supplied by config files, CLI flags or other untyped callers.
///
/// Enum values are plain strings here; [`crate::validator::validate_options`]
/// turns them into [`ImportOptions`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawImportOptions {
    pub strategy: Option<String>,
    pub conflict_resolution: Option<String>,
    pub date_handling: Option<String>,
    pub auto_generate_versions: Option<bool>,
    pub publish_imported_entries: Option<bool>,
    pub preserve_existing_entries: Option<bool>,
    pub default_tags: Option<Vec<String>>,
}

impl RawImportOptions {
    /// Overlay `other` on top of `self`; fields set in `other` win
    pub fn merged_with(self, other: RawImportOptions) -> Self {
        Self {
            strategy: other.strategy.or(self.strategy),
            conflict_resolution: other.conflict_resolution.or(self.conflict_resolution),
            date_handling: other.date_handling.or(self.date_handling),
            auto_generate_versions: other.auto_generate_versions.or(self.auto_generate_versions),
            publish_imported_entries: other
                .publish_imported_entries
                .or(self.publish_imported_entries),
            preserve_existing_entries: other
                .preserve_existing_entries
                .or(self.preserve_existing_entries),
            default_tags: other.default_tags.or(self.default_tags),
        }
    }
}
