//! Storage backends for metadata blobs.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::NamedTempFile;

use crate::error::{CacheError, LockResultExt};

/// Key/value persistence for serialized cache blobs.
pub trait CacheStorage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Replace the blob under `key`. Either the new blob is stored or the old one remains.
    fn write(&self, key: &str, blob: &str) -> Result<(), CacheError>;

    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// A storage shared between cache instances, as a restart would see it.
impl<S: CacheStorage + ?Sized> CacheStorage for Arc<S> {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, blob: &str) -> Result<(), CacheError> {
        (**self).write(key, blob)
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        (**self).remove(key)
    }
}

/// One `<key>.json` file per project under a cache directory.
pub struct FileCacheStorage {
    cache_dir: PathBuf,
}

impl FileCacheStorage {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let file_stem: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.cache_dir.join(format!("{file_stem}.json"))
    }
}

impl CacheStorage for FileCacheStorage {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(self.blob_path(key)) {
            Ok(blob) => Ok(Some(blob)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, blob: &str) -> Result<(), CacheError> {
        fs::create_dir_all(&self.cache_dir)?;

        // Write next to the target so the final rename stays on one filesystem
        let mut temp = NamedTempFile::new_in(&self.cache_dir)?;
        temp.write_all(blob.as_bytes())?;
        temp.flush()?;
        temp.persist(self.blob_path(key))
            .map_err(|err| CacheError::Io(err.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.blob_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-process storage for tests and hosts without a writable cache directory.
#[derive(Default)]
pub struct MemoryCacheStorage {
    blobs: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail with an IO error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store a raw blob, bypassing serialization.
    pub fn insert_raw(&self, key: &str, blob: &str) {
        self.blobs
            .lock()
            .recover_poison("MemoryCacheStorage::insert_raw")
            .insert(key.to_string(), blob.to_string());
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .blobs
            .lock()
            .recover_poison("MemoryCacheStorage::read")
            .get(key)
            .cloned())
    }

    fn write(&self, key: &str, blob: &str) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Io(io::Error::other("storage unavailable")));
        }
        self.insert_raw(key, blob);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Io(io::Error::other("storage unavailable")));
        }
        self.blobs
            .lock()
            .recover_poison("MemoryCacheStorage::remove")
            .remove(key);
        Ok(())
    }
}
