use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};

use crate::backend::{copy_chunked, BlobReader, FileStream, StorageBackend, DEFAULT_CHUNK_SIZE};
use crate::metadata::FileMetadata;
use crate::{validate_component, Result, StorageError};

pub const LOCAL_STORAGE_TYPE: &str = "local";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageOptions {
    pub base_path: PathBuf,
    pub save_chunk_size: usize,
}

impl LocalStorageOptions {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            save_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Keeps each blob as a plain file at `<base>/<bucket>/<file_id>`.
pub struct LocalFileStorage {
    base_path: PathBuf,
    save_chunk_size: usize,
}

impl LocalFileStorage {
    pub async fn new(options: LocalStorageOptions) -> Result<Self> {
        fs::create_dir_all(&options.base_path).await?;
        let base_path = fs::canonicalize(&options.base_path).await?;
        Ok(Self {
            base_path,
            save_chunk_size: options.save_chunk_size.max(1),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn file_path(&self, bucket: &str, file_id: &str) -> Result<PathBuf> {
        validate_component("bucket", bucket)?;
        validate_component("file id", file_id)?;
        Ok(self.base_path.join(bucket).join(file_id))
    }
}

#[async_trait]
impl StorageBackend for LocalFileStorage {
    fn storage_type(&self) -> &str {
        LOCAL_STORAGE_TYPE
    }

    fn save_chunk_size(&self) -> usize {
        self.save_chunk_size
    }

    async fn save(&self, bucket: &str, file_id: &str, stream: &mut dyn BlobReader) -> Result<String> {
        let path = self.file_path(bucket, file_id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = File::create(&path).await?;
        let written = copy_chunked(stream, &mut file, self.save_chunk_size).await?;
        file.sync_all().await?;

        tracing::debug!("Wrote {} bytes to {}", written, path.display());
        Ok(path.to_string_lossy().into_owned())
    }

    async fn load(&self, metadata: &FileMetadata) -> Result<FileStream> {
        match File::open(&metadata.storage_path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(metadata.storage_path.clone()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn delete(&self, metadata: &FileMetadata) -> Result<bool> {
        match fs::remove_file(&metadata.storage_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
