use md5::{Digest, Md5};
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::backend::BlobReader;
use crate::Result;

/// Stored in place of a digest when hashing is switched off.
pub const HASH_DISABLED: &str = "-1";

/// Incremental MD5 over seekable byte streams.
#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    enabled: bool,
    chunk_size: usize,
}

impl ContentHasher {
    pub fn new(enabled: bool, chunk_size: usize) -> Self {
        Self {
            enabled,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Hashes the whole stream from byte zero and leaves it rewound to zero.
    /// Returns [`HASH_DISABLED`] without touching the stream when disabled.
    pub async fn hash_stream(&self, stream: &mut dyn BlobReader) -> Result<String> {
        if !self.enabled {
            return Ok(HASH_DISABLED.to_string());
        }

        stream.seek(SeekFrom::Start(0)).await?;
        let mut hasher = Md5::new();
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        stream.seek(SeekFrom::Start(0)).await?;
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub async fn hash_file(&self, path: &Path) -> Result<String> {
        let mut file = tokio::fs::File::open(path).await?;
        self.hash_stream(&mut file).await
    }
}

/// Hex MD5 of a short in-memory value, e.g. a node address.
pub(crate) fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}
