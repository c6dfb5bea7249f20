//! Response emission
//!
//! Successful stores and deletes are empty 204s. Retrieval streams the
//! backend's snapshot file in [`CHUNK_SIZE`] pieces with a fixed
//! `Content-Length`; the snapshot is removed once the body stream is dropped,
//! whether the client read it to the end or went away.

use crate::transfer::Receipt;
use actix_web::body::SizedStream;
use actix_web::http::header::ETAG;
use actix_web::HttpResponse;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream};
use log::debug;
use std::io;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

pub const CHUNK_SIZE: usize = 8 * 1024;

/// A retrieve result that owns the backend's snapshot file
pub struct RetrievedPayload {
    pub etag: String,
    pub size: u64,
    snapshot: Option<TempPath>,
}

impl RetrievedPayload {
    pub fn from_receipt(receipt: Receipt) -> io::Result<Self> {
        let snapshot = match receipt.local_file {
            Some(path) => Some(TempPath::try_from_path(path.clone()).map_err(|e| {
                let _ = std::fs::remove_file(&path);
                e
            })?),
            None => None,
        };
        Ok(Self {
            etag: receipt.etag,
            size: receipt.size,
            snapshot,
        })
    }

    pub fn is_unchanged(&self) -> bool {
        self.snapshot.is_none()
    }
}

pub fn stored(receipt: &Receipt) -> HttpResponse {
    HttpResponse::NoContent()
        .insert_header((ETAG, receipt.etag.as_str()))
        .finish()
}

pub fn deleted() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

pub fn not_modified(etag: &str) -> HttpResponse {
    HttpResponse::NotModified().insert_header((ETAG, etag)).finish()
}

/// 200 with the snapshot as body. Headers are complete before the first
/// body byte is produced.
pub async fn payload(retrieved: RetrievedPayload) -> io::Result<HttpResponse> {
    let RetrievedPayload { etag, snapshot, .. } = retrieved;
    let snapshot = snapshot.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "retrieve returned no payload"))?;
    let file = File::open(&snapshot).await?;
    let size = file.metadata().await?.len();
    debug!("Streaming {} bytes from {}", size, snapshot.display());

    let body = SizedStream::new(size, snapshot_chunks(file, snapshot, size));
    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .insert_header((ETAG, etag))
        .no_chunking(size)
        .body(body))
}

struct SnapshotReader {
    file: File,
    _snapshot: TempPath,
    remaining: u64,
}

fn snapshot_chunks(file: File, snapshot: TempPath, size: u64) -> impl Stream<Item = io::Result<Bytes>> {
    let reader = SnapshotReader {
        file,
        _snapshot: snapshot,
        remaining: size,
    };
    stream::unfold(reader, |mut reader| async move {
        if reader.remaining == 0 {
            return None;
        }
        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        match reader.file.read_buf(&mut buf).await {
            Ok(0) => {
                reader.remaining = 0;
                Some((Err(io::Error::from(io::ErrorKind::UnexpectedEof)), reader))
            }
            Ok(_) => {
                buf.truncate(CHUNK_SIZE.min(reader.remaining as usize));
                reader.remaining -= buf.len() as u64;
                Some((Ok(buf.freeze()), reader))
            }
            Err(e) => {
                reader.remaining = 0;
                Some((Err(e), reader))
            }
        }
    })
}
