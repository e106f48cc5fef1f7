//! Changelog import
//!
//! [`ChangelogImporter`] is the caller-facing entry point. It parses and
//! validates content, then hands the validated batch to [`ImportProcessor`],
//! which writes it into a store under one of three strategies:
//! - Merge: keep existing entries, resolve version conflicts
//! - Replace: wipe existing entries inside one transaction
//! - Append: like merge, for adding onto the end of a changelog

mod options;
mod orchestrator;
mod processor;
mod report;

pub use options::{
    ConflictResolution, DateHandling, ImportOptions, ImportStrategy, RawImportOptions,
    UnknownOptionValue,
};
pub use orchestrator::{
    ChangelogImporter, CompleteImport, ContentCheck, ContentStats, ImportError,
    ImportRecommendations, PreviewOutcome, LARGE_IMPORT_ENTRIES, MAX_CONTENT_BYTES,
    MIN_CONTENT_BYTES,
};
pub use processor::{ImportProcessor, REPLACED_WARNING};
pub use report::{CreatedEntry, EntryError, ImportResult, ImportStats, RunFailure};
