//! Storage Transfer abstraction
//!
//! The gateway never touches blob storage directly. Every backend satisfies
//! the same `store/retrieve/delete` contract on a [`StorageObject`] and is
//! picked once at start-up (see [`config::create_transfer`]). Calls are
//! synchronous and expected to block; the gateway runs them through the
//! [`Offloader`](crate::offload::Offloader).

pub mod config;
pub mod local_store;
pub mod mock_store;

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Read/write granularity used when hashing and copying payloads.
pub const COPY_CHUNK_SIZE: usize = 8 * 1024;

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("storage object {0} has no staged payload")]
    MissingPayload(String),
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),
    #[error("transfer worker failed: {0}")]
    Worker(String),
}

/// Identifies a blob by its two-level key.
///
/// `etag` is only meaningful for conditional retrieval and `local_ref` only
/// for store, so each operation has its own constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageObject {
    prefix: String,
    path: String,
    etag: Option<String>,
    local_ref: Option<PathBuf>,
}

impl StorageObject {
    pub fn for_store(prefix: &str, path: &str, local_ref: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.to_string(),
            path: path.to_string(),
            etag: None,
            local_ref: Some(local_ref.into()),
        }
    }

    pub fn for_retrieve(prefix: &str, path: &str, etag: Option<String>) -> Self {
        Self {
            prefix: prefix.to_string(),
            path: path.to_string(),
            etag,
            local_ref: None,
        }
    }

    pub fn for_delete(prefix: &str, path: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            path: path.to_string(),
            etag: None,
            local_ref: None,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn local_ref(&self) -> Option<&Path> {
        self.local_ref.as_deref()
    }

    /// `prefix/path`, used in log lines and error messages
    pub fn key(&self) -> String {
        format!("{}/{}", self.prefix, self.path)
    }
}

/// Result of a store or retrieve.
///
/// `local_file == None` on a retrieve means the stored ETag matched the
/// conditional one and the payload must not be re-sent. A `local_file`
/// handed out by `retrieve` belongs to the caller, who removes it once the
/// payload has been streamed. `previous_size` is the size of the object a
/// store replaced, 0 when the key was new.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub etag: String,
    pub local_file: Option<PathBuf>,
    pub size: u64,
    pub previous_size: u64,
}

impl Receipt {
    pub fn stored(etag: String, size: u64, previous_size: u64) -> Self {
        Self { etag, local_file: None, size, previous_size }
    }

    pub fn unchanged(etag: String, size: u64) -> Self {
        Self { etag, local_file: None, size, previous_size: 0 }
    }

    pub fn with_file(etag: String, local_file: PathBuf, size: u64) -> Self {
        Self {
            etag,
            local_file: Some(local_file),
            size,
            previous_size: 0,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.local_file.is_none()
    }

    /// Change in stored bytes caused by a store
    pub fn size_delta(&self) -> i64 {
        to_signed(self.size) - to_signed(self.previous_size)
    }
}

pub fn to_signed(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

/// Trait defining the storage backend contract
pub trait Transfer: Send + Sync {
    /// Persist the payload staged at `object.local_ref()` and return its new ETag.
    fn store(&self, object: &StorageObject) -> Result<Receipt, TransferError>;

    /// `Ok(None)` when nothing is stored under the key.
    fn retrieve(&self, object: &StorageObject) -> Result<Option<Receipt>, TransferError>;

    /// Remove the object and return the size it occupied; `Ok(None)` when
    /// nothing was stored, which is not an error.
    fn delete(&self, object: &StorageObject) -> Result<Option<u64>, TransferError>;
}

/// ETag of an in-memory payload: lowercase hex MD5
pub fn content_etag(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}

/// Copy `src` to a new file at `dst`, returning the content ETag and size.
pub fn copy_hashing(src: &Path, dst: &Path) -> io::Result<(String, u64)> {
    let mut input = File::open(src)?;
    let mut output = File::create(dst)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
    let mut size = 0u64;
    loop {
        let read = input.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
        output.write_all(&buffer[..read])?;
        size += read as u64;
    }
    output.flush()?;
    Ok((hex::encode(context.compute().0), size))
}
