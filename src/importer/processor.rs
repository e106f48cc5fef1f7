//! Writes validated entries into a changelog store.
//!
//! A run is: permission check, changelog lookup, then either the `replace`
//! path (one transaction) or the `merge`/`append` path (conflict resolution
//! against a snapshot of the stored versions, then plain writes). Run-level
//! failures never surface as `Err`; they are reported through
//! [`ImportResult::failure`] with every unwritten entry marked as errored.

use chrono::{DateTime, NaiveTime, Utc};
use semver::Version;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::options::{ConflictResolution, DateHandling, ImportOptions, ImportStrategy};
use super::report::{CreatedEntry, EntryError, ImportResult, ImportStats, RunFailure};
use crate::store::{ChangelogStore, ImportAuthorizer, NewEntry};
use crate::validator::{check_conflicts, ValidatedEntry};

pub const REPLACED_WARNING: &str = "All existing entries were replaced";
const FAILED_VALIDATION: &str = "Entry failed validation";

/// What to do with one entry of the batch
#[derive(Debug)]
enum ImportAction {
    Write { index: usize },
    /// Write despite a stored entry with the same version
    Overwrite { index: usize, notice: String },
    Skip { index: usize, reason: String },
}

impl ImportAction {
    fn index(&self) -> usize {
        match self {
            ImportAction::Write { index }
            | ImportAction::Overwrite { index, .. }
            | ImportAction::Skip { index, .. } => *index,
        }
    }
}

/// Mutable bookkeeping for a single run
struct RunState {
    stats: ImportStats,
    created: Vec<CreatedEntry>,
    warnings: Vec<String>,
    errors: Vec<EntryError>,
    next_version: Option<Version>,
    /// Last version that could be numbered from, once patch numbers run out
    exhausted_after: Option<Version>,
    tag_ids: HashMap<String, String>,
}

impl RunState {
    fn new(options: &ImportOptions) -> Self {
        Self {
            stats: ImportStats::start(),
            created: Vec::new(),
            warnings: options.warnings(),
            errors: Vec::new(),
            next_version: None,
            exhausted_after: None,
            tag_ids: HashMap::new(),
        }
    }

    fn start_auto_versions(&mut self, existing_versions: &[String], entries: &[ValidatedEntry]) {
        match next_version(existing_versions, entries) {
            Ok(next) => self.next_version = Some(next),
            Err(highest) => self.exhausted_after = Some(highest),
        }
    }

    fn entry_error(&mut self, entry: &ValidatedEntry, message: impl Into<String>) {
        self.stats.errors += 1;
        self.errors.push(EntryError {
            entry: entry.entry.label(),
            message: message.into(),
        });
    }

    /// Discard everything written so far and report every entry as errored
    fn fail_all(&mut self, entries: &[ValidatedEntry], failure: &RunFailure) {
        self.created.clear();
        self.errors.clear();
        self.stats.imported = 0;
        self.stats.skipped = 0;
        self.stats.errors = 0;
        for entry in entries {
            self.entry_error(entry, failure.to_string());
        }
    }

    fn into_result(
        mut self,
        total: usize,
        strategy: ImportStrategy,
        failure: Option<RunFailure>,
    ) -> ImportResult {
        self.stats.finish();
        let error_count = self.errors.len();
        let success = failure.is_none() && total > 0 && error_count * 2 < total;

        log::info!(
            "Import finished: {} imported, {} skipped, {} errors in {}ms",
            self.stats.imported,
            self.stats.skipped,
            error_count,
            self.stats.elapsed().as_millis()
        );

        ImportResult {
            success,
            strategy,
            imported_count: self.stats.imported,
            skipped_count: self.stats.skipped,
            error_count,
            created_entries: self.created,
            warnings: self.warnings,
            errors: self.errors,
            processing_time_ms: u64::try_from(self.stats.elapsed().as_millis()).unwrap_or(u64::MAX),
            failure,
        }
    }
}

/// Imports validated entries into a [`ChangelogStore`]
pub struct ImportProcessor {
    store: Arc<dyn ChangelogStore>,
    authorizer: Arc<dyn ImportAuthorizer>,
    cancel: Option<CancellationToken>,
}

impl ImportProcessor {
    pub fn new(store: Arc<dyn ChangelogStore>, authorizer: Arc<dyn ImportAuthorizer>) -> Self {
        Self {
            store,
            authorizer,
            cancel: None,
        }
    }

    /// Abort the run when `token` is cancelled; checked before every write
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Import `entries` into the changelog of `target_id` on behalf of `actor_id`
    pub async fn process_import(
        &self,
        target_id: &str,
        entries: &[ValidatedEntry],
        options: &ImportOptions,
        actor_id: &str,
    ) -> ImportResult {
        let mut run = RunState::new(options);
        log::info!(
            "Importing {} entries into {} (strategy {}, conflicts {}, dates {})",
            entries.len(),
            target_id,
            options.strategy,
            options.conflict_resolution,
            options.date_handling
        );
        if options.date_handling == DateHandling::Sequence {
            log::info!("Date handling \"sequence\" stamps entries with the import time");
        }

        match self.authorizer.can_import(actor_id, target_id).await {
            Ok(permission) if permission.allowed => {}
            Ok(permission) => {
                let reason = permission
                    .reason
                    .unwrap_or_else(|| format!("{} may not import into {}", actor_id, target_id));
                return self.abort(run, entries, options, RunFailure::PermissionDenied(reason));
            }
            Err(e) => {
                return self.abort(run, entries, options, RunFailure::Authorization(e.to_string()));
            }
        }

        let changelog_id = match self.store.find_or_create_changelog(target_id).await {
            Ok(changelog) => changelog.id,
            Err(e) => return self.abort(run, entries, options, RunFailure::Changelog(e.to_string())),
        };

        let failure = match options.strategy {
            ImportStrategy::Replace => {
                self.run_replace(&changelog_id, entries, options, &mut run)
                    .await
            }
            ImportStrategy::Merge | ImportStrategy::Append => {
                self.run_merge(&changelog_id, entries, options, &mut run)
                    .await
            }
        };

        run.into_result(entries.len(), options.strategy, failure)
    }

    fn abort(
        &self,
        mut run: RunState,
        entries: &[ValidatedEntry],
        options: &ImportOptions,
        failure: RunFailure,
    ) -> ImportResult {
        log::warn!("Import aborted: {}", failure);
        run.fail_all(entries, &failure);
        run.into_result(entries.len(), options.strategy, Some(failure))
    }

    async fn run_replace(
        &self,
        changelog_id: &str,
        entries: &[ValidatedEntry],
        options: &ImportOptions,
        run: &mut RunState,
    ) -> Option<RunFailure> {
        if let Err(e) = self.store.begin_transaction().await {
            let failure = RunFailure::Transaction(e.to_string());
            run.fail_all(entries, &failure);
            return Some(failure);
        }

        let failure = self
            .replace_in_transaction(changelog_id, entries, options, run)
            .await;
        if let Some(failure) = failure {
            log::warn!("Rolling back replace import: {}", failure);
            if let Err(e) = self.store.rollback_transaction().await {
                log::warn!("Rollback failed: {}", e);
            }
            run.fail_all(entries, &failure);
            return Some(failure);
        }

        if let Err(e) = self.store.commit_transaction().await {
            let failure = RunFailure::Transaction(e.to_string());
            log::warn!("Commit failed, rolling back: {}", e);
            if let Err(e) = self.store.rollback_transaction().await {
                log::warn!("Rollback failed: {}", e);
            }
            run.fail_all(entries, &failure);
            return Some(failure);
        }

        if !options.preserve_existing_entries {
            run.warnings.push(REPLACED_WARNING.to_string());
        }
        None
    }

    async fn replace_in_transaction(
        &self,
        changelog_id: &str,
        entries: &[ValidatedEntry],
        options: &ImportOptions,
        run: &mut RunState,
    ) -> Option<RunFailure> {
        let existing_versions = if options.preserve_existing_entries {
            match self.existing_versions(changelog_id).await {
                Ok(versions) => versions,
                Err(failure) => return Some(failure),
            }
        } else {
            match self.store.delete_all_entries(changelog_id).await {
                Ok(deleted) => log::info!("Deleted {} existing entries", deleted),
                Err(e) => return Some(RunFailure::Transaction(e.to_string())),
            }
            Vec::new()
        };

        if options.auto_generate_versions {
            run.start_auto_versions(&existing_versions, entries);
        }

        let actions = (0..entries.len())
            .map(|index| ImportAction::Write { index })
            .collect::<Vec<_>>();
        self.execute(changelog_id, entries, &actions, options, run)
            .await
            .map(|_| RunFailure::Cancelled)
    }

    async fn run_merge(
        &self,
        changelog_id: &str,
        entries: &[ValidatedEntry],
        options: &ImportOptions,
        run: &mut RunState,
    ) -> Option<RunFailure> {
        let existing_versions = match self.existing_versions(changelog_id).await {
            Ok(versions) => versions,
            Err(failure) => {
                run.fail_all(entries, &failure);
                return Some(failure);
            }
        };

        let actions = determine_actions(entries, &existing_versions, options);
        if options.auto_generate_versions {
            run.start_auto_versions(&existing_versions, entries);
        }

        let cancelled_at = self
            .execute(changelog_id, entries, &actions, options, run)
            .await?;
        for action in &actions[cancelled_at..] {
            run.entry_error(&entries[action.index()], RunFailure::Cancelled.to_string());
        }
        Some(RunFailure::Cancelled)
    }

    async fn existing_versions(&self, changelog_id: &str) -> Result<Vec<String>, RunFailure> {
        let existing = self
            .store
            .list_entries(changelog_id)
            .await
            .map_err(|e| RunFailure::ExistingEntries(e.to_string()))?;
        Ok(existing
            .into_iter()
            .filter_map(|entry| entry.version)
            .map(|version| version.trim().to_string())
            .filter(|version| !version.is_empty())
            .collect())
    }

    /// Run `actions` in order. Returns the position of the first action left
    /// unexecuted because the run was cancelled.
    async fn execute(
        &self,
        changelog_id: &str,
        entries: &[ValidatedEntry],
        actions: &[ImportAction],
        options: &ImportOptions,
        run: &mut RunState,
    ) -> Option<usize> {
        let now = Utc::now();
        for (position, action) in actions.iter().enumerate() {
            if self.is_cancelled() {
                log::warn!(
                    "Import cancelled before {}",
                    entries[action.index()].entry.label()
                );
                return Some(position);
            }
            run.stats.processed += 1;
            match action {
                ImportAction::Skip { index, reason } => {
                    log::debug!("Skipping {}: {}", entries[*index].entry.label(), reason);
                    run.stats.skipped += 1;
                    run.warnings.push(reason.clone());
                }
                ImportAction::Write { index } => {
                    self.write_entry(changelog_id, &entries[*index], options, now, run)
                        .await;
                }
                ImportAction::Overwrite { index, notice } => {
                    run.warnings.push(notice.clone());
                    self.write_entry(changelog_id, &entries[*index], options, now, run)
                        .await;
                }
            }
        }
        None
    }

    async fn write_entry(
        &self,
        changelog_id: &str,
        validated: &ValidatedEntry,
        options: &ImportOptions,
        now: DateTime<Utc>,
        run: &mut RunState,
    ) {
        if !validated.is_valid {
            run.entry_error(validated, FAILED_VALIDATION);
            return;
        }
        let entry = &validated.entry;

        let mut version = entry.version_str().map(str::to_string);
        if version.is_none() {
            if let Some(next) = run.next_version.take() {
                run.warnings
                    .push(format!("Assigned version {} to {}", next, entry.label()));
                version = Some(next.to_string());
                match bump_patch(&next) {
                    Some(after) => run.next_version = Some(after),
                    None => run.exhausted_after = Some(next),
                }
            } else if let Some(last) = &run.exhausted_after {
                log::warn!("No patch version follows {}", last);
                run.warnings.push(format!(
                    "Cannot assign a version to {}: no patch version follows {}",
                    entry.label(),
                    last
                ));
            }
        }

        let mut tag_ids = Vec::new();
        for name in tag_names(validated, options) {
            if let Some(id) = run.tag_ids.get(&name) {
                tag_ids.push(id.clone());
                continue;
            }
            match self.store.find_or_create_tag(&name).await {
                Ok(tag) => {
                    run.tag_ids.insert(name, tag.id.clone());
                    tag_ids.push(tag.id);
                }
                Err(e) => {
                    run.entry_error(validated, format!("Could not resolve tag \"{}\": {}", name, e));
                    return;
                }
            }
        }

        let created_at = entry_timestamp(validated, options.date_handling, now);
        let new_entry = NewEntry {
            changelog_id: changelog_id.to_string(),
            title: entry.title.trim().to_string(),
            content: entry.content.clone(),
            version: version.clone(),
            created_at,
            published_at: options.publish_imported_entries.then_some(created_at),
            is_published: options.publish_imported_entries,
            tag_ids,
            reading_time_minutes: entry.metadata.reading_time_minutes,
        };

        match self.store.create_entry(new_entry).await {
            Ok(record) => {
                log::debug!("Created entry {} for {}", record.id, entry.label());
                run.stats.imported += 1;
                run.created.push(CreatedEntry {
                    id: record.id,
                    title: record.title,
                    version,
                });
            }
            Err(e) => {
                log::warn!("Failed to write {}: {}", entry.label(), e);
                run.entry_error(validated, e.to_string());
            }
        }
    }
}

/// Conflict resolution for `merge` and `append`
fn determine_actions(
    entries: &[ValidatedEntry],
    existing_versions: &[String],
    options: &ImportOptions,
) -> Vec<ImportAction> {
    let conflicts: HashSet<usize> = check_conflicts(entries, existing_versions)
        .into_iter()
        .map(|conflict| conflict.index)
        .collect();

    entries
        .iter()
        .enumerate()
        .map(|(index, validated)| {
            if !conflicts.contains(&index) {
                return ImportAction::Write { index };
            }
            let label = validated.entry.label();
            let version = validated.entry.version_str().unwrap_or_default();
            match options.conflict_resolution {
                ConflictResolution::Skip => ImportAction::Skip {
                    index,
                    reason: format!("Skipped {}: version {} already exists", label, version),
                },
                ConflictResolution::Prompt => {
                    log::warn!(
                        "No interactive channel to confirm version {}, skipping",
                        version
                    );
                    ImportAction::Skip {
                        index,
                        reason: format!(
                            "Skipped {}: version {} already exists (confirmation needed, not available here)",
                            label, version
                        ),
                    }
                }
                ConflictResolution::Overwrite => ImportAction::Overwrite {
                    index,
                    notice: format!(
                        "Overwriting {}: version {} already exists",
                        label, version
                    ),
                },
            }
        })
        .collect()
}

/// Next patch version above every semantic version already stored or in the batch.
///
/// `Err` carries the highest version when its patch number cannot be incremented.
fn next_version(existing_versions: &[String], entries: &[ValidatedEntry]) -> Result<Version, Version> {
    let highest = existing_versions
        .iter()
        .map(String::as_str)
        .chain(entries.iter().filter_map(|e| e.entry.version_str()))
        .filter_map(|v| Version::parse(v.trim_start_matches(['v', 'V'])).ok())
        .max();
    match highest {
        Some(v) => bump_patch(&v).ok_or(v),
        None => Ok(Version::new(0, 0, 1)),
    }
}

fn bump_patch(version: &Version) -> Option<Version> {
    version
        .patch
        .checked_add(1)
        .map(|patch| Version::new(version.major, version.minor, patch))
}

/// Normalized tag names of the entry plus the default tags, empties dropped
fn tag_names(validated: &ValidatedEntry, options: &ImportOptions) -> BTreeSet<String> {
    validated
        .entry
        .tags
        .iter()
        .chain(options.default_tags.iter())
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

fn entry_timestamp(
    validated: &ValidatedEntry,
    date_handling: DateHandling,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match date_handling {
        DateHandling::Preserve => validated
            .entry
            .published_at
            .as_ref()
            .and_then(|date| date.as_date())
            .map(|date| date.and_time(NaiveTime::MIN).and_utc())
            .unwrap_or(now),
        DateHandling::Current | DateHandling::Sequence => now,
    }
}
