use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("File size exceeds the limit of {limit_mb} MB")]
    SizeExceeded { limit_mb: u64 },

    /// The client body could not be read
    #[error("Upload stream interrupted: {0}")]
    Interrupted(std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Removes a partially written upload unless it was completed.
///
/// Also covers the request future being dropped mid-write, e.g. on client
/// disconnect, where no error branch ever runs.
struct PartialUpload {
    path: PathBuf,
    completed: bool,
}

impl PartialUpload {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            completed: false,
        }
    }
}

impl Drop for PartialUpload {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed partial upload {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(
                "Failed to remove partial upload {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Streams uploads to disk under a byte cap.
///
/// The body is read and written in chunks of at most `chunk_size` bytes; the
/// running total is checked before each write so a persisted file never grows
/// past the cap.
#[derive(Debug, Clone)]
pub struct UploadIngestor {
    max_upload_size_mb: u64,
    chunk_size: usize,
}

impl UploadIngestor {
    pub fn new(max_upload_size_mb: u64, chunk_size: usize) -> Self {
        Self {
            max_upload_size_mb,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }

    /// Writes `reader` to `dest`, returning the number of bytes stored.
    ///
    /// On any failure, or if the returned future is dropped before it
    /// completes, the partial file is removed.
    pub async fn ingest<R>(&self, reader: &mut R, dest: &Path) -> Result<u64, IngestError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut guard = PartialUpload::new(dest);
        let total = self.write_capped(reader, dest).await?;
        guard.completed = true;
        Ok(total)
    }

    async fn write_capped<R>(&self, reader: &mut R, dest: &Path) -> Result<u64, IngestError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let cap = self.max_bytes();
        let mut file = fs::File::create(dest).await?;
        let mut buffer = vec![0u8; self.chunk_size];
        let mut total: u64 = 0;

        loop {
            let n = reader
                .read(&mut buffer)
                .await
                .map_err(IngestError::Interrupted)?;
            if n == 0 {
                break;
            }

            total += n as u64;
            if total > cap {
                tracing::warn!(
                    "⛔ Upload to {} aborted after {} bytes (limit {} MB)",
                    dest.display(),
                    total,
                    self.max_upload_size_mb
                );
                return Err(IngestError::SizeExceeded {
                    limit_mb: self.max_upload_size_mb,
                });
            }

            file.write_all(&buffer[..n]).await?;
        }

        file.flush().await?;
        tracing::debug!("Stored {} bytes at {}", total, dest.display());
        Ok(total)
    }
}
