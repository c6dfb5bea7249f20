//! In-memory implementation of Transfer for tests and the dummy backend

use crate::transfer::{content_etag, Receipt, StorageObject, Transfer, TransferError};
use bytes::Bytes;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use log::info;

type ObjectKey = (String, String);

/// Mock implementation of Transfer.
///
/// Payloads live in memory; a retrieve writes a snapshot file into
/// `snapshot_dir` because the contract hands out local files.
pub struct MockTransfer {
    // (prefix, path) -> (etag, payload)
    objects: Mutex<HashMap<ObjectKey, (String, Bytes)>>,
    snapshot_dir: PathBuf,
}

impl MockTransfer {
    pub fn new() -> Self {
        Self::with_snapshot_dir(std::env::temp_dir())
    }

    pub fn with_snapshot_dir(snapshot_dir: impl AsRef<Path>) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            snapshot_dir: snapshot_dir.as_ref().to_path_buf(),
        }
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<ObjectKey, (String, Bytes)>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
    
    /// Get the number of stored objects
    pub fn object_count(&self) -> usize {
        self.objects().len()
    }

    /// Check if an object exists
    pub fn contains(&self, prefix: &str, path: &str) -> bool {
        self.objects().contains_key(&(prefix.to_string(), path.to_string()))
    }

    /// Current ETag of an object
    pub fn etag_of(&self, prefix: &str, path: &str) -> Option<String> {
        self.objects()
            .get(&(prefix.to_string(), path.to_string()))
            .map(|(etag, _)| etag.clone())
    }
    
    /// Clear all data from the store
    pub fn clear(&self) {
        self.objects().clear();
    }

    fn write_snapshot(&self, payload: &[u8]) -> Result<PathBuf, TransferError> {
        fs::create_dir_all(&self.snapshot_dir)?;
        let mut snapshot = tempfile::Builder::new()
            .prefix("retrieve-")
            .tempfile_in(&self.snapshot_dir)?;
        snapshot.write_all(payload)?;
        snapshot.flush()?;
        let path = snapshot.into_temp_path().keep().map_err(|e| e.error)?;
        Ok(path)
    }
}

impl Default for MockTransfer {
    fn default() -> Self {
        Self::new()
    }
}

fn key_of(object: &StorageObject) -> ObjectKey {
    (object.prefix().to_string(), object.path().to_string())
}

impl Transfer for MockTransfer {
    fn store(&self, object: &StorageObject) -> Result<Receipt, TransferError> {
        let staged = object
            .local_ref()
            .ok_or_else(|| TransferError::MissingPayload(object.key()))?;
        let payload = Bytes::from(fs::read(staged)?);
        let etag = content_etag(&payload);
        let size = payload.len() as u64;
        let previous_size = self
            .objects()
            .insert(key_of(object), (etag.clone(), payload))
            .map(|(_, previous)| previous.len() as u64)
            .unwrap_or(0);
        info!("Mock: Stored {} ({} bytes, was {})", object.key(), size, previous_size);
        Ok(Receipt::stored(etag, size, previous_size))
    }

    fn retrieve(&self, object: &StorageObject) -> Result<Option<Receipt>, TransferError> {
        let Some((etag, payload)) = self.objects().get(&key_of(object)).cloned() else {
            return Ok(None);
        };
        let size = payload.len() as u64;
        if object.etag() == Some(etag.as_str()) {
            return Ok(Some(Receipt::unchanged(etag, size)));
        }
        let snapshot = self.write_snapshot(&payload)?;
        Ok(Some(Receipt::with_file(etag, snapshot, size)))
    }

    fn delete(&self, object: &StorageObject) -> Result<Option<u64>, TransferError> {
        let freed = self
            .objects()
            .remove(&key_of(object))
            .map(|(_, payload)| payload.len() as u64);
        info!("Mock: Deleted {} (freed {:?} bytes)", object.key(), freed);
        Ok(freed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(dir: &Path, data: &[u8]) -> PathBuf {
        let staged = dir.join("upload");
        fs::write(&staged, data).unwrap();
        staged
    }

    #[test]
    fn test_mock_transfer_basic_operations() {
        let dir = tempfile::tempdir().unwrap();
        let store = MockTransfer::with_snapshot_dir(dir.path());
        assert_eq!(store.object_count(), 0);

        let staged = stage(dir.path(), b"Hello, Mock Storage!");
        let receipt = store.store(&StorageObject::for_store("test", "doc1", &staged)).unwrap();
        assert_eq!(receipt.etag, content_etag(b"Hello, Mock Storage!"));
        assert_eq!(receipt.previous_size, 0);

        let again = store.store(&StorageObject::for_store("test", "doc1", &staged)).unwrap();
        assert_eq!((again.size, again.previous_size), (20, 20));
        assert!(store.contains("test", "doc1"));
        assert_eq!(store.etag_of("test", "doc1"), Some(receipt.etag.clone()));

        let retrieved = store
            .retrieve(&StorageObject::for_retrieve("test", "doc1", None))
            .unwrap()
            .unwrap();
        let snapshot = retrieved.local_file.unwrap();
        assert!(snapshot.starts_with(dir.path()));
        assert_eq!(fs::read(&snapshot).unwrap(), b"Hello, Mock Storage!");

        let unchanged = store
            .retrieve(&StorageObject::for_retrieve("test", "doc1", Some(receipt.etag)))
            .unwrap()
            .unwrap();
        assert!(unchanged.is_unchanged());

        assert_eq!(store.delete(&StorageObject::for_delete("test", "doc1")).unwrap(), Some(20));
        assert!(!store.contains("test", "doc1"));
        assert!(store
            .retrieve(&StorageObject::for_retrieve("test", "doc1", None))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_mock_transfer_error_cases() {
        let store = MockTransfer::new();

        assert!(store.store(&StorageObject::for_delete("test", "doc1")).is_err());
        assert!(store
            .store(&StorageObject::for_store("test", "doc1", "/nonexistent/upload"))
            .is_err());
        assert_eq!(store.object_count(), 0);

        // Delete of a missing object is not an error
        assert_eq!(store.delete(&StorageObject::for_delete("test", "nonexistent_key")).unwrap(), None);
    }

    #[test]
    fn test_mock_transfer_keys_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let store = MockTransfer::with_snapshot_dir(dir.path());
        store
            .store(&StorageObject::for_store("prefix-a", "doc", stage(dir.path(), b"a")))
            .unwrap();
        store
            .store(&StorageObject::for_store("prefix-b", "doc", stage(dir.path(), b"b")))
            .unwrap();
        assert_eq!(store.object_count(), 2);

        store.delete(&StorageObject::for_delete("prefix-a", "doc")).unwrap();
        assert!(store.contains("prefix-b", "doc"));

        store.clear();
        assert_eq!(store.object_count(), 0);
    }
}
