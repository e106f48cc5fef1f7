//! In-memory changelog store with snapshot transactions and JSON persistence.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{ChangelogRecord, ChangelogStore, EntryRecord, NewEntry, StoreError, TagRecord};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    /// Keyed by target id
    changelogs: BTreeMap<String, ChangelogRecord>,
    entries: Vec<EntryRecord>,
    /// Keyed by normalized tag name
    tags: BTreeMap<String, TagRecord>,
    next_id: u64,
}

impl StoreState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{}", prefix, self.next_id)
    }
}

/// A [`ChangelogStore`] that keeps everything in memory.
///
/// Only one transaction can be open at a time. `begin_transaction` takes a
/// snapshot of the whole state and `rollback_transaction` restores it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    snapshot: Mutex<Option<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store saved with [`MemoryStore::save`]; a missing file gives an empty store
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            log::debug!("Store file {} not found, starting empty", path.display());
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let state: StoreState = serde_json::from_str(&content)?;
        Ok(Self {
            state: Mutex::new(state),
            snapshot: Mutex::new(None),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(&*self.lock_state()?)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn changelog_for(&self, target_id: &str) -> Result<Option<ChangelogRecord>, StoreError> {
        Ok(self.lock_state()?.changelogs.get(target_id).cloned())
    }

    /// All stored entries of the changelog belonging to `target_id`
    pub fn entries_for_target(&self, target_id: &str) -> Result<Vec<EntryRecord>, StoreError> {
        let state = self.lock_state()?;
        let Some(changelog) = state.changelogs.get(target_id) else {
            return Ok(Vec::new());
        };
        Ok(state
            .entries
            .iter()
            .filter(|entry| entry.changelog_id == changelog.id)
            .cloned()
            .collect())
    }

    pub fn tags(&self) -> Result<Vec<TagRecord>, StoreError> {
        Ok(self.lock_state()?.tags.values().cloned().collect())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("store state lock poisoned".to_string()))
    }

    fn lock_snapshot(&self) -> Result<MutexGuard<'_, Option<StoreState>>, StoreError> {
        self.snapshot
            .lock()
            .map_err(|_| StoreError::Backend("transaction lock poisoned".to_string()))
    }
}

#[async_trait]
impl ChangelogStore for MemoryStore {
    async fn find_or_create_changelog(
        &self,
        target_id: &str,
    ) -> Result<ChangelogRecord, StoreError> {
        let mut state = self.lock_state()?;
        if let Some(existing) = state.changelogs.get(target_id) {
            return Ok(existing.clone());
        }
        let record = ChangelogRecord {
            id: state.next_id("chl"),
            target_id: target_id.to_string(),
            created_at: Utc::now(),
        };
        log::debug!("Created changelog {} for target {}", record.id, target_id);
        state
            .changelogs
            .insert(target_id.to_string(), record.clone());
        Ok(record)
    }

    async fn list_entries(&self, changelog_id: &str) -> Result<Vec<EntryRecord>, StoreError> {
        let state = self.lock_state()?;
        Ok(state
            .entries
            .iter()
            .filter(|entry| entry.changelog_id == changelog_id)
            .cloned()
            .collect())
    }

    async fn delete_all_entries(&self, changelog_id: &str) -> Result<usize, StoreError> {
        let mut state = self.lock_state()?;
        let before = state.entries.len();
        state
            .entries
            .retain(|entry| entry.changelog_id != changelog_id);
        Ok(before - state.entries.len())
    }

    async fn create_entry(&self, entry: NewEntry) -> Result<EntryRecord, StoreError> {
        let mut state = self.lock_state()?;
        if !state
            .changelogs
            .values()
            .any(|changelog| changelog.id == entry.changelog_id)
        {
            return Err(StoreError::NotFound(format!(
                "changelog {}",
                entry.changelog_id
            )));
        }
        if let Some(missing) = entry
            .tag_ids
            .iter()
            .find(|id| !state.tags.values().any(|tag| &tag.id == *id))
        {
            return Err(StoreError::NotFound(format!("tag {}", missing)));
        }

        let record = EntryRecord {
            id: state.next_id("ent"),
            changelog_id: entry.changelog_id,
            title: entry.title,
            content: entry.content,
            version: entry.version,
            created_at: entry.created_at,
            published_at: entry.published_at,
            is_published: entry.is_published,
            tag_ids: entry.tag_ids,
            reading_time_minutes: entry.reading_time_minutes,
        };
        state.entries.push(record.clone());
        Ok(record)
    }

    async fn find_or_create_tag(&self, name: &str) -> Result<TagRecord, StoreError> {
        let key = name.trim().to_lowercase();
        if key.is_empty() {
            return Err(StoreError::Backend("tag name is empty".to_string()));
        }
        let mut state = self.lock_state()?;
        if let Some(tag) = state.tags.get(&key) {
            return Ok(tag.clone());
        }
        let tag = TagRecord {
            id: state.next_id("tag"),
            name: key.clone(),
        };
        log::debug!("Created tag {} ({})", tag.name, tag.id);
        state.tags.insert(key, tag.clone());
        Ok(tag)
    }

    async fn begin_transaction(&self) -> Result<(), StoreError> {
        let mut snapshot = self.lock_snapshot()?;
        if snapshot.is_some() {
            return Err(StoreError::Transaction(
                "a transaction is already open".to_string(),
            ));
        }
        *snapshot = Some(self.lock_state()?.clone());
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<(), StoreError> {
        self.lock_snapshot()?
            .take()
            .map(|_| ())
            .ok_or_else(|| StoreError::Transaction("no open transaction to commit".to_string()))
    }

    async fn rollback_transaction(&self) -> Result<(), StoreError> {
        let saved = self
            .lock_snapshot()?
            .take()
            .ok_or_else(|| StoreError::Transaction("no open transaction to roll back".to_string()))?;
        *self.lock_state()? = saved;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_entry(changelog_id: &str, title: &str, version: Option<&str>) -> NewEntry {
        NewEntry {
            changelog_id: changelog_id.to_string(),
            title: title.to_string(),
            content: "body".to_string(),
            version: version.map(str::to_string),
            created_at: Utc::now(),
            published_at: None,
            is_published: true,
            tag_ids: Vec::new(),
            reading_time_minutes: 1,
        }
    }

    #[tokio::test]
    async fn test_find_or_create_changelog_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.find_or_create_changelog("project-1").await.unwrap();
        let second = store.find_or_create_changelog("project-1").await.unwrap();
        assert_eq!(first, second);
        let other = store.find_or_create_changelog("project-2").await.unwrap();
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn test_tags_are_normalized() {
        let store = MemoryStore::new();
        let a = store.find_or_create_tag("Feature").await.unwrap();
        let b = store.find_or_create_tag(" feature ").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.name, "feature");
        assert!(store.find_or_create_tag("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_create_entry_requires_changelog() {
        let store = MemoryStore::new();
        let err = store
            .create_entry(new_entry("chl_missing", "A", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let store = MemoryStore::new();
        let changelog = store.find_or_create_changelog("p").await.unwrap();
        store
            .create_entry(new_entry(&changelog.id, "Old", Some("1.0.0")))
            .await
            .unwrap();

        store.begin_transaction().await.unwrap();
        assert_eq!(store.delete_all_entries(&changelog.id).await.unwrap(), 1);
        store
            .create_entry(new_entry(&changelog.id, "New", Some("2.0.0")))
            .await
            .unwrap();
        store.rollback_transaction().await.unwrap();

        let entries = store.list_entries(&changelog.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Old");
    }

    #[tokio::test]
    async fn test_nested_transactions_are_rejected() {
        let store = MemoryStore::new();
        store.begin_transaction().await.unwrap();
        assert!(matches!(
            store.begin_transaction().await,
            Err(StoreError::Transaction(_))
        ));
        store.commit_transaction().await.unwrap();
        assert!(store.commit_transaction().await.is_err());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = MemoryStore::new();
        let changelog = store.find_or_create_changelog("p").await.unwrap();
        let tag = store.find_or_create_tag("fix").await.unwrap();
        let mut entry = new_entry(&changelog.id, "Saved", Some("1.0.0"));
        entry.tag_ids.push(tag.id.clone());
        store.create_entry(entry).await.unwrap();
        store.save(&path).unwrap();

        let loaded = MemoryStore::load(&path).unwrap();
        let entries = loaded.entries_for_target("p").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tag_ids, vec![tag.id.clone()]);
        assert_eq!(loaded.tags().unwrap().len(), 1);

        // ids keep counting after a reload
        let next = loaded.find_or_create_tag("feat").await.unwrap();
        assert_ne!(next.id, tag.id);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::load(&dir.path().join("absent.json")).unwrap();
        assert!(store.entries_for_target("p").unwrap().is_empty());
    }
}
