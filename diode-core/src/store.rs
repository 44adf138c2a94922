//! Durable key-value store backing both sync endpoints.
//!
//! One logical map of `String` keys to opaque byte blobs, held in a
//! single file that is rewritten atomically (temp file + rename) on
//! every commit. The store is opened and closed around each mutating
//! operation rather than held across fragment processing, so exactly
//! one transaction exists at any moment and committed state is on
//! disk before the next fragment is touched.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::DiodeError;

/// Handle on a store file. Cheap to keep around; all I/O happens
/// inside [`SyncStore::open`] / [`StoreGuard::commit`].
#[derive(Debug)]
pub struct SyncStore {
    path: PathBuf,
}

impl SyncStore {
    /// Point at a store file. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begin a transaction: read the whole map into memory.
    ///
    /// A missing store file reads as an empty map.
    pub fn open(&self) -> Result<StoreGuard<'_>, DiodeError> {
        let map = match fs::read(&self.path) {
            Ok(bytes) => bincode::deserialize(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(StoreGuard {
            path: &self.path,
            map,
        })
    }
}

/// One open transaction. Mutations stay in memory until
/// [`StoreGuard::commit`]; dropping the guard discards them.
pub struct StoreGuard<'a> {
    path: &'a Path,
    map: HashMap<String, Vec<u8>>,
}

impl StoreGuard<'_> {
    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.map.get(key).map(Vec::as_slice)
    }

    /// Insert or replace a value.
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.map.insert(key.into(), value);
    }

    /// Write the map back to disk and atomically replace the store
    /// file. The temp file is synced before the rename so a crash
    /// leaves either the old state or the new one, never a torn file.
    pub fn commit(self) -> Result<(), DiodeError> {
        let bytes = bincode::serialize(&self.map)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path).map_err(|e| DiodeError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStore::new(dir.path().join("state"));
        let guard = store.open().unwrap();
        assert!(guard.get("sent").is_none());
    }

    #[test]
    fn put_commit_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStore::new(dir.path().join("state"));

        let mut guard = store.open().unwrap();
        guard.put("sent", vec![1, 2, 3]);
        guard.commit().unwrap();

        let guard = store.open().unwrap();
        assert_eq!(guard.get("sent"), Some(&[1u8, 2, 3][..]));
        assert!(guard.get("other").is_none());
    }

    #[test]
    fn dropped_guard_discards_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStore::new(dir.path().join("state"));

        let mut guard = store.open().unwrap();
        guard.put("key", vec![9]);
        drop(guard);

        assert!(store.open().unwrap().get("key").is_none());
    }

    #[test]
    fn commit_replaces_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStore::new(dir.path().join("state"));

        let mut guard = store.open().unwrap();
        guard.put("key", vec![1]);
        guard.commit().unwrap();

        let mut guard = store.open().unwrap();
        guard.put("key", vec![2]);
        guard.commit().unwrap();

        assert_eq!(store.open().unwrap().get("key"), Some(&[2u8][..]));
    }
}
