//! Local filesystem storage backend
//!
//! Layout: `base_path/{prefix}/{path}` holds the blob and
//! `base_path/{prefix}/{path}.etag` its MD5 ETag. Identifiers never contain
//! a `.`, so the sidecar and the partial files cannot collide with a key.

use crate::config::TransferConfig;
use crate::transfer::{copy_hashing, Receipt, StorageObject, Transfer, TransferError};
use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use log::{debug, info};
use uuid::Uuid;

/// Local filesystem backend
pub struct LocalTransfer {
    base_path: PathBuf,
    temp_path: PathBuf,
    // Serialises the blob/ETag swap against readers and deleters
    index_lock: Mutex<()>,
}

impl LocalTransfer {
    pub fn new(config: &TransferConfig) -> Result<Self, TransferError> {
        let base_path = PathBuf::from(&config.base_path);
        let temp_path = PathBuf::from(&config.temp_path);
        fs::create_dir_all(&base_path)?;
        fs::create_dir_all(&temp_path)?;
        info!("Local transfer rooted at {}", base_path.display());
        Ok(Self {
            base_path,
            temp_path,
            index_lock: Mutex::new(()),
        })
    }

    fn prefix_dir(&self, object: &StorageObject) -> PathBuf {
        self.base_path.join(object.prefix())
    }

    fn blob_path(&self, object: &StorageObject) -> PathBuf {
        self.prefix_dir(object).join(object.path())
    }

    fn etag_path(&self, object: &StorageObject) -> PathBuf {
        self.prefix_dir(object).join(format!("{}.etag", object.path()))
    }

    fn partial_path(&self, object: &StorageObject, kind: &str) -> PathBuf {
        self.prefix_dir(object)
            .join(format!(".{}.{}.{}", object.path(), Uuid::new_v4(), kind))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.index_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_path(&self) -> PathBuf {
        self.temp_path.join(format!("retrieve-{}", Uuid::new_v4()))
    }
}

fn read_etag(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(etag) => Ok(Some(etag.trim().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn size_if_exists(path: &Path) -> io::Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(metadata.len())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Copy from an already open blob; the handle keeps the content stable
/// even if the key is overwritten or deleted meanwhile.
fn copy_snapshot(mut blob: File, snapshot: &Path) -> io::Result<()> {
    let mut output = File::create(snapshot)?;
    if let Err(e) = io::copy(&mut blob, &mut output) {
        drop(output);
        let _ = remove_if_exists(snapshot);
        return Err(e);
    }
    Ok(())
}

impl Transfer for LocalTransfer {
    fn store(&self, object: &StorageObject) -> Result<Receipt, TransferError> {
        let staged = object
            .local_ref()
            .ok_or_else(|| TransferError::MissingPayload(object.key()))?;
        fs::create_dir_all(self.prefix_dir(object))?;

        // Copy and hash outside the lock; only the swap is serialised
        let partial_blob = self.partial_path(object, "partial");
        let partial_etag = self.partial_path(object, "etag");
        let swapped = copy_hashing(staged, &partial_blob).and_then(|(etag, size)| {
            fs::write(&partial_etag, &etag)?;
            let _guard = self.lock();
            let previous_size = size_if_exists(&self.blob_path(object))?.unwrap_or(0);
            fs::rename(&partial_blob, self.blob_path(object))?;
            fs::rename(&partial_etag, self.etag_path(object))?;
            Ok((etag, size, previous_size))
        });

        match swapped {
            Ok((etag, size, previous_size)) => {
                info!("Stored {} ({} bytes, was {}, etag {})", object.key(), size, previous_size, etag);
                Ok(Receipt::stored(etag, size, previous_size))
            }
            Err(e) => {
                let _ = remove_if_exists(&partial_blob);
                let _ = remove_if_exists(&partial_etag);
                Err(e.into())
            }
        }
    }

    fn retrieve(&self, object: &StorageObject) -> Result<Option<Receipt>, TransferError> {
        let snapshot = self.snapshot_path();
        let (current, size, pending_copy) = {
            let _guard = self.lock();
            let Some(current) = read_etag(&self.etag_path(object))? else {
                debug!("No object stored under {}", object.key());
                return Ok(None);
            };
            let blob_path = self.blob_path(object);
            let blob = match File::open(&blob_path) {
                Ok(blob) => blob,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let size = blob.metadata()?.len();

            if object.etag() == Some(current.as_str()) {
                debug!("{} unchanged (etag {})", object.key(), current);
                return Ok(Some(Receipt::unchanged(current, size)));
            }
            // A hard link is instant; a copy across filesystems runs after the lock is released
            let pending_copy = match fs::hard_link(&blob_path, &snapshot) {
                Ok(()) => None,
                Err(_) => Some(blob),
            };
            (current, size, pending_copy)
        };

        if let Some(blob) = pending_copy {
            copy_snapshot(blob, &snapshot)?;
        }
        Ok(Some(Receipt::with_file(current, snapshot, size)))
    }

    fn delete(&self, object: &StorageObject) -> Result<Option<u64>, TransferError> {
        let _guard = self.lock();
        let blob = self.blob_path(object);
        let freed = size_if_exists(&blob)?;
        remove_if_exists(&self.etag_path(object))?;
        remove_if_exists(&blob)?;
        info!("Deleted {} (freed {:?} bytes)", object.key(), freed);
        Ok(freed)
    }
}
