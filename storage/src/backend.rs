use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncWrite, AsyncWriteExt};

use crate::metadata::FileMetadata;
use crate::Result;

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// A readable, seekable byte stream. Backends hand these out positioned at
/// byte zero, and the storage system rewinds them freely.
pub trait BlobReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> BlobReader for T {}

pub type FileStream = Box<dyn BlobReader>;

/// A named implementation of the save/load/delete contract.
///
/// The storage system keys backends by [`StorageBackend::storage_type`];
/// that string is what metadata records store to find their owner again.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn storage_type(&self) -> &str;

    /// Preferred granularity for chunked I/O.
    fn save_chunk_size(&self) -> usize;

    /// Drains `stream` into persistent storage and returns a backend-defined
    /// locator for the body.
    async fn save(&self, bucket: &str, file_id: &str, stream: &mut dyn BlobReader) -> Result<String>;

    async fn load(&self, metadata: &FileMetadata) -> Result<FileStream>;

    /// `true` if a body was removed, `false` if there was nothing to remove.
    async fn delete(&self, metadata: &FileMetadata) -> Result<bool>;

    /// Externally reachable URL for the body, when the backend has one.
    fn public_url(&self, _metadata: &FileMetadata) -> Option<String> {
        None
    }
}

/// Copies `reader` into `writer` in `chunk_size` pieces, returning the number
/// of bytes copied.
pub async fn copy_chunked<R, W>(reader: &mut R, writer: &mut W, chunk_size: usize) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }

    writer.flush().await?;
    Ok(total)
}
