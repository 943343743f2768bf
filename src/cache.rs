//! Per-project metadata cache that survives restarts.
//!
//! Each project is one JSON blob under the key `project-metadata-{projectId}`.
//! Every mutation is applied to a copy, persisted, and only then committed in
//! memory, so a failed write leaves both storage and memory unchanged.

mod metadata;
mod store;

pub use metadata::{
    CACHE_VERSION, FileMetadata, FileMetadataPatch, ProjectCache, cache_key, file_name_of,
};
pub use store::{CacheStorage, FileCacheStorage, MemoryCacheStorage};

use std::sync::Mutex;

use crate::error::{CacheError, LockResultExt};
use metadata::now_millis;

const LOG_TARGET: &str = "editor_lsp_bridge::cache";

pub struct MetadataCache {
    storage: Box<dyn CacheStorage>,
    current: Mutex<Option<ProjectCache>>,
}

impl MetadataCache {
    pub fn new(storage: Box<dyn CacheStorage>) -> Self {
        Self {
            storage,
            current: Mutex::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryCacheStorage::new()))
    }

    /// Load a project's cache.
    ///
    /// Returns `None` for a cold cache: nothing stored, a blob that does not
    /// decode, or a blob for another project or format version. The project
    /// becomes current either way, starting empty when cold.
    pub fn load(&self, project_id: &str) -> Option<ProjectCache> {
        let loaded = match self.read_blob(project_id) {
            Ok(loaded) => loaded,
            Err(err) => {
                log::warn!(
                    target: LOG_TARGET,
                    "Discarding cache for project {}: {}",
                    project_id,
                    err
                );
                None
            }
        };

        *self.current.lock().recover_poison("MetadataCache::load") = Some(
            loaded
                .clone()
                .unwrap_or_else(|| ProjectCache::new(project_id)),
        );
        loaded
    }

    fn read_blob(&self, project_id: &str) -> Result<Option<ProjectCache>, CacheError> {
        let key = cache_key(project_id);
        let Some(blob) = self.storage.read(&key)? else {
            return Ok(None);
        };

        let cache: ProjectCache =
            serde_json::from_str(&blob).map_err(|err| CacheError::Corruption {
                key: key.clone(),
                message: err.to_string(),
            })?;
        if cache.project_id != project_id {
            return Err(CacheError::Corruption {
                key,
                message: format!("blob belongs to project {}", cache.project_id),
            });
        }
        if cache.cache_version != CACHE_VERSION {
            return Err(CacheError::Corruption {
                key,
                message: format!("unsupported cache version {}", cache.cache_version),
            });
        }
        Ok(Some(cache))
    }

    /// Persist `cache` and make it the current project.
    pub fn save(&self, cache: ProjectCache) -> Result<(), CacheError> {
        self.persist(&cache)?;
        *self.current.lock().recover_poison("MetadataCache::save") = Some(cache);
        Ok(())
    }

    fn persist(&self, cache: &ProjectCache) -> Result<(), CacheError> {
        let blob = serde_json::to_string(cache)?;
        self.storage.write(&cache_key(&cache.project_id), &blob)
    }

    /// Apply `mutate` to a copy of the current project, persist, then commit.
    fn mutate<R>(
        &self,
        mutate: impl FnOnce(&mut ProjectCache) -> R,
    ) -> Result<R, CacheError> {
        let mut current = self.current.lock().recover_poison("MetadataCache::mutate");
        let Some(committed) = current.as_ref() else {
            return Err(CacheError::NotLoaded);
        };

        let mut next = committed.clone();
        let result = mutate(&mut next);
        self.persist(&next)?;
        *current = Some(next);
        Ok(result)
    }

    pub fn project_id(&self) -> Option<String> {
        self.current
            .lock()
            .recover_poison("MetadataCache::project_id")
            .as_ref()
            .map(|cache| cache.project_id.clone())
    }

    pub fn get_file(&self, uri: &str) -> Option<FileMetadata> {
        self.current
            .lock()
            .recover_poison("MetadataCache::get_file")
            .as_ref()
            .and_then(|cache| cache.files.get(uri).cloned())
    }

    /// All cached files ordered by uri.
    pub fn files(&self) -> Vec<FileMetadata> {
        self.current
            .lock()
            .recover_poison("MetadataCache::files")
            .as_ref()
            .map(|cache| cache.files.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Merge `patch` into the entry for `uri`, creating it when absent.
    pub fn update_file(
        &self,
        uri: &str,
        patch: FileMetadataPatch,
    ) -> Result<FileMetadata, CacheError> {
        self.mutate(|cache| {
            let entry = cache
                .files
                .entry(uri.to_string())
                .or_insert_with(|| FileMetadata::new(uri));
            patch.apply_to(entry);
            entry.version += 1;
            entry.last_modified = now_millis();
            entry.clone()
        })
    }

    /// Move the entry for `old_uri` to `new_uri` in one persisted write.
    ///
    /// Returns `Ok(None)` when nothing was cached for `old_uri`.
    pub fn rename_file(
        &self,
        old_uri: &str,
        new_uri: &str,
        new_name: &str,
    ) -> Result<Option<FileMetadata>, CacheError> {
        if self.get_file(old_uri).is_none() {
            return Ok(None);
        }

        self.mutate(|cache| {
            let mut entry = cache.files.remove(old_uri)?;
            entry.uri = new_uri.to_string();
            entry.name = new_name.to_string();
            entry.version += 1;
            entry.last_modified = now_millis();
            cache.files.insert(new_uri.to_string(), entry.clone());
            Some(entry)
        })
    }

    pub fn delete_file(&self, uri: &str) -> Result<Option<FileMetadata>, CacheError> {
        if self.get_file(uri).is_none() {
            return Ok(None);
        }
        self.mutate(|cache| cache.files.remove(uri))
    }

    /// Drop the current project's blob and start empty.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut current = self.current.lock().recover_poison("MetadataCache::clear");
        let Some(cache) = current.as_ref() else {
            return Err(CacheError::NotLoaded);
        };
        let project_id = cache.project_id.clone();
        self.storage.remove(&cache_key(&project_id))?;
        *current = Some(ProjectCache::new(project_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn shared_cache() -> (MetadataCache, Arc<MemoryCacheStorage>) {
        let storage = Arc::new(MemoryCacheStorage::new());
        let cache = MetadataCache::new(Box::new(Arc::clone(&storage)));
        (cache, storage)
    }

    #[test]
    fn missing_blob_is_cold_and_writable() {
        let cache = MetadataCache::in_memory();
        assert!(cache.load("p1").is_none());

        let file = cache
            .update_file("file:///a.js", FileMetadataPatch::language("javascript"))
            .unwrap();

        assert_eq!(file.version, 1);
        assert_eq!(file.name, "a.js");
        assert!(file.last_modified > 0);
    }

    #[test]
    fn malformed_blob_becomes_cold_cache() {
        let (cache, storage) = shared_cache();
        storage.insert_raw(&cache_key("p1"), "{ not json");

        assert!(cache.load("p1").is_none());
        assert!(cache.files().is_empty());
    }

    #[test]
    fn blob_for_other_project_or_version_is_discarded() {
        let (cache, storage) = shared_cache();
        let mut foreign = ProjectCache::new("other");
        foreign
            .files
            .insert("file:///x".into(), FileMetadata::new("file:///x"));
        storage.insert_raw(&cache_key("p1"), &serde_json::to_string(&foreign).unwrap());
        assert!(cache.load("p1").is_none());

        let mut old = ProjectCache::new("p2");
        old.cache_version = "0.1".into();
        storage.insert_raw(&cache_key("p2"), &serde_json::to_string(&old).unwrap());
        assert!(cache.load("p2").is_none());
    }

    #[test]
    fn writes_survive_reload() {
        let (cache, storage) = shared_cache();
        cache.load("p1");
        cache
            .update_file("file:///a.js", FileMetadataPatch::language("javascript"))
            .unwrap();

        let restarted = MetadataCache::new(Box::new(storage));
        let loaded = restarted.load("p1").expect("warm cache");

        assert_eq!(loaded.files["file:///a.js"].language, "javascript");
    }

    #[test]
    fn rename_moves_entry_and_bumps_version() {
        let cache = MetadataCache::in_memory();
        cache.load("p1");
        cache
            .update_file("file:///a.js", FileMetadataPatch::language("javascript"))
            .unwrap();

        let moved = cache
            .rename_file("file:///a.js", "file:///b.js", "b.js")
            .unwrap()
            .unwrap();

        assert_eq!(moved.version, 2);
        assert_eq!(moved.uri, "file:///b.js");
        assert!(cache.get_file("file:///a.js").is_none());
        assert_eq!(cache.get_file("file:///b.js"), Some(moved));
    }

    #[test]
    fn failed_rename_keeps_previous_state() {
        let (cache, storage) = shared_cache();
        cache.load("p1");
        let before = cache
            .update_file("file:///a.js", FileMetadataPatch::default())
            .unwrap();
        storage.set_fail_writes(true);

        let result = cache.rename_file("file:///a.js", "file:///b.js", "b.js");

        assert!(result.is_err());
        assert_eq!(cache.get_file("file:///a.js"), Some(before));
        assert!(cache.get_file("file:///b.js").is_none());
        storage.set_fail_writes(false);
        let reloaded = MetadataCache::new(Box::new(storage))
            .load("p1")
            .unwrap();
        assert!(reloaded.files.contains_key("file:///a.js"));
    }

    #[test]
    fn rename_of_uncached_file_is_noop() {
        let cache = MetadataCache::in_memory();
        cache.load("p1");
        assert_eq!(
            cache.rename_file("file:///a.js", "file:///b.js", "b.js").unwrap(),
            None
        );
    }

    #[test]
    fn mutations_without_project_fail() {
        let cache = MetadataCache::in_memory();
        let err = cache
            .update_file("file:///a.js", FileMetadataPatch::default())
            .unwrap_err();
        assert!(matches!(err, CacheError::NotLoaded));
    }

    #[test]
    fn file_storage_survives_restart_and_clear() {
        let temp = tempdir().expect("Failed to create temp dir");
        let cache = MetadataCache::new(Box::new(FileCacheStorage::new(temp.path())));
        cache.load("p1");
        cache
            .update_file("file:///a.py", FileMetadataPatch::language("python"))
            .unwrap();
        cache.delete_file("file:///missing.py").unwrap();

        let restarted = MetadataCache::new(Box::new(FileCacheStorage::new(temp.path())));
        assert!(restarted.load("p1").is_some());
        restarted.clear().unwrap();

        let again = MetadataCache::new(Box::new(FileCacheStorage::new(temp.path())));
        assert!(again.load("p1").is_none());
    }
}
