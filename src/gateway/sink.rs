//! Streaming upload sink
//!
//! Request bodies are written chunk by chunk to a uniquely named transient
//! file. The file is owned by a [`TempPath`], so every path that drops the
//! sink or the finished [`StagedUpload`] without handing it off removes it.

use std::io;
use std::path::Path;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

pub struct UploadSink {
    file: File,
    path: TempPath,
    written: u64,
}

impl UploadSink {
    pub fn create(dir: &Path) -> io::Result<Self> {
        let (file, path) = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(dir)?
            .into_parts();
        Ok(Self {
            file: File::from_std(file),
            path,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn append(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush and close the file, keeping it on disk for the backend.
    pub async fn finish(mut self) -> io::Result<StagedUpload> {
        self.file.flush().await?;
        drop(self.file);
        Ok(StagedUpload {
            path: self.path,
            size: self.written,
        })
    }
}

/// A closed upload waiting for the backend; removed on drop
pub struct StagedUpload {
    path: TempPath,
    size: u64,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_preserves_chunk_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = UploadSink::create(dir.path()).unwrap();
        for chunk in [&b"hel"[..], b"lo ", b"", b"world"] {
            sink.append(chunk).await.unwrap();
        }
        assert_eq!(sink.written(), 11);

        let staged = sink.finish().await.unwrap();
        assert_eq!(staged.size(), 11);
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"hello world");

        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_abandoned_sink_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = UploadSink::create(dir.path()).unwrap();
        sink.append(b"partial").await.unwrap();
        let path = sink.path().to_path_buf();
        assert!(path.exists());

        drop(sink);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_sinks_get_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = UploadSink::create(dir.path()).unwrap();
        let b = UploadSink::create(dir.path()).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().file_name().unwrap().to_string_lossy().starts_with("upload-"));
    }
}
