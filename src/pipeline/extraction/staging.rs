//! Temporary on-disk staging of uploaded documents.
//!
//! Every document is spooled into its own temp file, owned exclusively by
//! a [`StagedDocument`]. Release happens on the blocking pool; dropping an
//! unreleased guard removes the file synchronously so no exit path (error,
//! panic, cancelled future) leaves it behind.

use std::future::Future;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use super::ExtractionError;

/// Size of each read while spooling an upload.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// A source of upload bytes consumed chunk by chunk.
pub trait UploadBody: Send {
    /// Next chunk, or `None` at end of body.
    fn next_chunk(
        &mut self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, ExtractionError>> + Send;
}

/// Adapts any `AsyncRead` into 1 MiB chunks.
pub struct ReaderBody<R> {
    reader: R,
}

impl<R> ReaderBody<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: AsyncRead + Unpin + Send> UploadBody for ReaderBody<R> {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ExtractionError> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut filled = 0;
        while filled < CHUNK_SIZE {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }
}

/// Exclusive owner of one staged upload.
pub struct StagedDocument {
    path: Option<TempPath>,
    size_bytes: u64,
}

impl StagedDocument {
    /// Stream `body` into a fresh temp file under `dir` (system temp dir
    /// when `None`). Fails with `SizeLimitExceeded` as soon as the body
    /// grows past `max_bytes`; the partial file is removed.
    pub async fn spool<B: UploadBody>(
        body: &mut B,
        filename: &str,
        dir: Option<&Path>,
        max_bytes: u64,
    ) -> Result<Self, ExtractionError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pdfintake-").suffix(".pdf");
        let named = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let (file, path) = named.into_parts();

        // The guard owns the path from here on; early returns delete it.
        let mut staged = Self {
            path: Some(path),
            size_bytes: 0,
        };

        let mut file = tokio::fs::File::from_std(file);
        while let Some(chunk) = body.next_chunk().await? {
            staged.size_bytes += chunk.len() as u64;
            if staged.size_bytes > max_bytes {
                return Err(ExtractionError::SizeLimitExceeded {
                    filename: filename.to_string(),
                    max_mb: max_bytes / (1024 * 1024),
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        debug!(
            filename,
            size_bytes = staged.size_bytes,
            "Upload staged to temp file"
        );
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        match &self.path {
            Some(path) => path,
            None => Path::new(""),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Read the staged bytes back off the blocking pool.
    pub async fn read(&self) -> Result<Vec<u8>, ExtractionError> {
        Ok(tokio::fs::read(self.path()).await?)
    }

    /// Delete the temp file on the blocking pool.
    pub async fn release(mut self) -> Result<(), ExtractionError> {
        let Some(path) = self.path.take() else {
            return Ok(());
        };
        let staged_at: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || path.close()).await??;
        debug!(path = %staged_at.display(), "Staged file released");
        Ok(())
    }
}

impl Drop for StagedDocument {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let staged_at = path.to_path_buf();
            if let Err(e) = path.close() {
                warn!(path = %staged_at.display(), error = %e, "Failed to remove staged file");
            }
        }
    }
}
