//! Result types for changelog import runs

use super::options::ImportStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// An entry written to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedEntry {
    pub id: String,
    pub title: String,
    pub version: Option<String>,
}

/// An entry that could not be imported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryError {
    /// Label of the entry (title, version or position)
    pub entry: String,
    pub message: String,
}

impl std::fmt::Display for EntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.entry, self.message)
    }
}

/// Reason a whole run was aborted
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum RunFailure {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Authorization check failed: {0}")]
    Authorization(String),
    #[error("Could not prepare target changelog: {0}")]
    Changelog(String),
    #[error("Could not read existing entries: {0}")]
    ExistingEntries(String),
    #[error("Transaction failed: {0}")]
    Transaction(String),
    #[error("Import cancelled")]
    Cancelled,
}

/// Counters kept by the processor during one run
#[derive(Debug, Clone)]
pub struct ImportStats {
    pub processed: usize,
    pub imported: usize,
    pub skipped: usize,
    pub errors: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for ImportStats {
    fn default() -> Self {
        Self::start()
    }
}

impl ImportStats {
    pub fn start() -> Self {
        Self {
            processed: 0,
            imported: 0,
            skipped: 0,
            errors: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn elapsed(&self) -> Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }
}

/// Outcome of one import run.
///
/// `success` is a "mostly succeeded" signal: it is true when fewer than half
/// of the submitted entries ended in an error. It is false for an empty batch
/// and whenever `failure` is set. Use the counts for anything stricter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub success: bool,
    pub strategy: ImportStrategy,
    pub imported_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub created_entries: Vec<CreatedEntry>,
    pub warnings: Vec<String>,
    pub errors: Vec<EntryError>,
    pub processing_time_ms: u64,
    /// Set when the run was aborted as a whole
    pub failure: Option<RunFailure>,
}

impl ImportResult {
    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Convert to human-readable text format
    pub fn to_text(&self) -> String {
        let mut output = String::new();

        output.push_str("Changelog Import Report\n");
        output.push_str("=======================\n");
        output.push_str(&format!("Strategy: {}\n", self.strategy));
        output.push_str(&format!("Time:     {}ms\n\n", self.processing_time_ms));

        output.push_str("Statistics\n");
        output.push_str("----------\n");
        output.push_str(&format!("Imported:        {}\n", self.imported_count));
        output.push_str(&format!("Skipped:         {}\n", self.skipped_count));
        output.push_str(&format!("Errors:          {}\n", self.error_count));
        output.push_str(&format!("Warnings:        {}\n\n", self.warnings.len()));

        if !self.created_entries.is_empty() {
            output.push_str("Created\n");
            output.push_str("-------\n");
            for created in &self.created_entries {
                match &created.version {
                    Some(version) => output.push_str(&format!(
                        "✓ {} [{}] ({})\n",
                        created.title, version, created.id
                    )),
                    None => output.push_str(&format!("✓ {} ({})\n", created.title, created.id)),
                }
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

        output.push_str("Result\n");
        output.push_str("------\n");
        if let Some(failure) = &self.failure {
            output.push_str(&format!("✗ Import aborted: {}\n", failure));
        } else if !self.success {
            output.push_str("✗ Import failed for most entries\n");
        } else if self.error_count > 0 || !self.warnings.is_empty() {
            output.push_str("✓ Import completed with warnings\n");
            output.push_str("ℹ Review warnings and errors above\n");
        } else {
            output.push_str("✓ Import completed successfully\n");
        }

        output
    }
}
