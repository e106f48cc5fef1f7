//! Storage and authorization collaborators used by the import processor.
//!
//! The processor only talks to these traits. [`MemoryStore`] is the bundled
//! implementation used by the command line tool and the tests.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("transaction failed: {0}")]
    Transaction(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The changelog an import writes into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogRecord {
    pub id: String,
    /// Caller-side identifier of the destination (project, repository, ...)
    pub target_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub id: String,
    pub changelog_id: String,
    pub title: String,
    pub content: String,
    pub version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub is_published: bool,
    pub tag_ids: Vec<String>,
    pub reading_time_minutes: usize,
}

/// Data for an entry that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub changelog_id: String,
    pub title: String,
    pub content: String,
    pub version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub is_published: bool,
    pub tag_ids: Vec<String>,
    pub reading_time_minutes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub id: String,
    /// Normalized (trimmed, lowercase) name
    pub name: String,
}

#[async_trait]
pub trait ChangelogStore: Send + Sync {
    /// Look up the changelog for `target_id`, creating it when absent
    async fn find_or_create_changelog(&self, target_id: &str)
        -> Result<ChangelogRecord, StoreError>;
    async fn list_entries(&self, changelog_id: &str) -> Result<Vec<EntryRecord>, StoreError>;
    /// Returns the number of deleted entries
    async fn delete_all_entries(&self, changelog_id: &str) -> Result<usize, StoreError>;
    async fn create_entry(&self, entry: NewEntry) -> Result<EntryRecord, StoreError>;
    /// `name` is already normalized by the caller
    async fn find_or_create_tag(&self, name: &str) -> Result<TagRecord, StoreError>;
    async fn begin_transaction(&self) -> Result<(), StoreError>;
    async fn commit_transaction(&self) -> Result<(), StoreError>;
    async fn rollback_transaction(&self) -> Result<(), StoreError>;
}

/// Answer of an [`ImportAuthorizer`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl Permission {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait ImportAuthorizer: Send + Sync {
    async fn can_import(&self, actor_id: &str, target_id: &str) -> Result<Permission, StoreError>;
}

/// Grants every request; for single-user hosts such as the CLI
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl ImportAuthorizer for AllowAll {
    async fn can_import(&self, _actor_id: &str, _target_id: &str) -> Result<Permission, StoreError> {
        Ok(Permission::allow())
    }
}
