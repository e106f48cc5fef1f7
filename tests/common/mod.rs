//! Shared fixtures and store doubles for the integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use changelog_import::store::{
    ChangelogRecord, ChangelogStore, EntryRecord, ImportAuthorizer, MemoryStore, NewEntry,
    Permission, StoreError, TagRecord,
};

pub const KEEP_A_CHANGELOG: &str = r#"# Changelog

All notable changes to this project will be documented in this file.

The format is based on [Keep a Changelog](https://keepachangelog.com/en/1.0.0/).

## [Unreleased]

## [1.1.0] - 2024-02-01
### Added
- Export to CSV
- Dark mode

### Fixed
- Crash when the config file is empty

## [1.0.0] - 2024-01-15
### Added
- First stable release

[Unreleased]: https://github.com/acme/app/compare/v1.1.0...HEAD
[1.1.0]: https://github.com/acme/app/compare/v1.0.0...v1.1.0
[1.0.0]: https://github.com/acme/app/releases/tag/v1.0.0
"#;

pub const GITHUB_RELEASES: &str = r#"# [2.1.0](https://github.com/acme/app/compare/v2.0.0...v2.1.0) (2024-03-10)

### Features

* **api:** paginate list endpoints

### Bug Fixes

* **auth:** refresh expired tokens

# [2.0.0](https://github.com/acme/app/compare/v1.9.0...v2.0.0) (2024-02-20)

### Features

* drop the legacy v1 API
"#;

pub const CLI_STYLE: &str = r#"## [3.0.0] - 2024-04-02

- Rewrite the command parser

## [2.9.1] - 2024-03-28

- Fix exit codes on Windows
"#;

pub const NO_VERSIONS: &str = r#"## Spring cleanup

- Removed unused assets

## Winter polish

- Smoother animations
"#;

/// Wraps a [`MemoryStore`] with switchable failures
#[derive(Default)]
pub struct FaultyStore {
    pub inner: Arc<MemoryStore>,
    /// `create_entry` fails for titles containing any of these
    pub fail_titles: Vec<String>,
    pub fail_changelog: bool,
    pub fail_list: bool,
    pub fail_commit: bool,
    /// Cancel the token once this many entries have been created
    pub cancel_after: Option<(usize, CancellationToken)>,
    created: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn failing_titles(mut self, titles: &[&str]) -> Self {
        self.fail_titles = titles.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn failing_changelog(mut self) -> Self {
        self.fail_changelog = true;
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn cancelling_after(mut self, writes: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((writes, token));
        self
    }
}

#[async_trait]
impl ChangelogStore for FaultyStore {
    async fn find_or_create_changelog(
        &self,
        target_id: &str,
    ) -> Result<ChangelogRecord, StoreError> {
        if self.fail_changelog {
            return Err(StoreError::Backend("changelog table is locked".to_string()));
        }
        self.inner.find_or_create_changelog(target_id).await
    }

    async fn list_entries(&self, changelog_id: &str) -> Result<Vec<EntryRecord>, StoreError> {
        if self.fail_list {
            return Err(StoreError::Backend("entries unavailable".to_string()));
        }
        self.inner.list_entries(changelog_id).await
    }

    async fn delete_all_entries(&self, changelog_id: &str) -> Result<usize, StoreError> {
        self.inner.delete_all_entries(changelog_id).await
    }

    async fn create_entry(&self, entry: NewEntry) -> Result<EntryRecord, StoreError> {
        if self.fail_titles.iter().any(|t| entry.title.contains(t.as_str())) {
            return Err(StoreError::Backend(format!("rejected {}", entry.title)));
        }
        let record = self.inner.create_entry(entry).await?;
        let created = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after {
            if created >= *limit {
                token.cancel();
            }
        }
        Ok(record)
    }

    async fn find_or_create_tag(&self, name: &str) -> Result<TagRecord, StoreError> {
        self.inner.find_or_create_tag(name).await
    }

    async fn begin_transaction(&self) -> Result<(), StoreError> {
        self.inner.begin_transaction().await
    }

    async fn commit_transaction(&self) -> Result<(), StoreError> {
        if self.fail_commit {
            return Err(StoreError::Transaction("commit rejected".to_string()));
        }
        self.inner.commit_transaction().await
    }

    async fn rollback_transaction(&self) -> Result<(), StoreError> {
        self.inner.rollback_transaction().await
    }
}

pub struct DenyAll;

#[async_trait]
impl ImportAuthorizer for DenyAll {
    async fn can_import(&self, actor_id: &str, _target_id: &str) -> Result<Permission, StoreError> {
        Ok(Permission::deny(format!("{} is read-only", actor_id)))
    }
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}
