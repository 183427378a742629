use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};

use crate::backend::{copy_chunked, BlobReader, FileStream, DEFAULT_CHUNK_SIZE};
use crate::hasher::{ContentHasher, HASH_DISABLED};
use crate::local::LOCAL_STORAGE_TYPE;
use crate::metadata::{FileMetadata, QuerySpec};
use crate::system::FileStorageSystem;
use crate::{Result, StorageError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Backend used when a caller does not name one.
    pub default_storage_type: String,
    pub save_chunk_size: usize,
    /// Where downloads land when the caller gives no destination. Falls back
    /// to the user cache directory.
    pub cache_dir: Option<PathBuf>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            default_storage_type: LOCAL_STORAGE_TYPE.to_string(),
            save_chunk_size: DEFAULT_CHUNK_SIZE,
            cache_dir: None,
        }
    }
}

/// Application-facing wrapper over [`FileStorageSystem`] adding uploads from
/// disk and cached downloads.
#[derive(Clone)]
pub struct FileStorageClient {
    system: Arc<FileStorageSystem>,
    options: ClientOptions,
}

impl FileStorageClient {
    pub fn new(system: Arc<FileStorageSystem>, options: ClientOptions) -> Self {
        Self { system, options }
    }

    pub fn system(&self) -> &Arc<FileStorageSystem> {
        &self.system
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub async fn upload_file(
        &self,
        bucket: &str,
        file_path: &Path,
        storage_type: Option<&str>,
        custom_metadata: Option<HashMap<String, Value>>,
        file_id: Option<String>,
    ) -> Result<String> {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::InvalidPath(file_path.display().to_string()))?;

        let mut file = match File::open(file_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(file_path.display().to_string()))
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        self.save_file(bucket, &file_name, &mut file, storage_type, custom_metadata, file_id)
            .await
    }

    pub async fn save_file(
        &self,
        bucket: &str,
        file_name: &str,
        stream: &mut dyn BlobReader,
        storage_type: Option<&str>,
        custom_metadata: Option<HashMap<String, Value>>,
        file_id: Option<String>,
    ) -> Result<String> {
        let storage_type = storage_type.unwrap_or(&self.options.default_storage_type);
        self.system
            .save_file(
                bucket,
                file_name,
                stream,
                storage_type,
                custom_metadata.unwrap_or_default(),
                file_id,
            )
            .await
    }

    /// Fetches a blob to disk and returns where it landed.
    ///
    /// The destination is `dest_path` if given, else `dest_dir/<file_id><ext>`,
    /// else the same name under `<cache_dir>/<bucket>`. With `cache` on, an
    /// existing destination whose MD5 matches the record is reused as is.
    pub async fn download_file(
        &self,
        uri: &str,
        dest_path: Option<&Path>,
        dest_dir: Option<&Path>,
        cache: bool,
    ) -> Result<(PathBuf, FileMetadata)> {
        let metadata = self
            .system
            .get_file_metadata_by_uri(uri)
            .await?
            .ok_or_else(|| StorageError::NotFound(uri.to_string()))?;
        let target = self.resolve_destination(&metadata, dest_path, dest_dir);

        if cache && fs::try_exists(&target).await? && self.cached_copy_matches(&target, &metadata).await? {
            tracing::debug!("Using cached copy of {} at {}", uri, target.display());
            return Ok((target, metadata));
        }

        let (mut stream, metadata) = self.system.get_file(uri).await?;
        self.write_atomically(&mut stream, &target).await?;

        tracing::info!("Downloaded {} to {}", uri, target.display());
        Ok((target, metadata))
    }

    fn resolve_destination(
        &self,
        metadata: &FileMetadata,
        dest_path: Option<&Path>,
        dest_dir: Option<&Path>,
    ) -> PathBuf {
        if let Some(path) = dest_path {
            return path.to_path_buf();
        }

        let extension = Path::new(&metadata.file_name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let name = format!("{}{}", metadata.file_id, extension);

        match dest_dir {
            Some(dir) => dir.join(name),
            None => self.cache_dir().join(&metadata.bucket).join(name),
        }
    }

    fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.options.cache_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("o3fs")
            .join("files")
    }

    /// Only a real digest can vouch for a cached copy.
    async fn cached_copy_matches(&self, target: &Path, metadata: &FileMetadata) -> Result<bool> {
        if metadata.file_hash.is_empty() || metadata.file_hash == HASH_DISABLED {
            return Ok(false);
        }
        let hasher = ContentHasher::new(true, self.options.save_chunk_size);
        Ok(hasher.hash_file(target).await? == metadata.file_hash)
    }

    async fn write_atomically(&self, stream: &mut FileStream, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut staging_name = target.as_os_str().to_os_string();
        staging_name.push(".download");
        let staging = PathBuf::from(staging_name);

        let mut file = File::create(&staging).await?;
        let copied = copy_chunked(stream.as_mut(), &mut file, self.options.save_chunk_size).await;
        if let Err(e) = copied {
            drop(file);
            let _ = fs::remove_file(&staging).await;
            return Err(StorageError::Io(e));
        }
        file.sync_all().await?;
        drop(file);

        fs::rename(&staging, target).await?;
        Ok(())
    }

    pub async fn get_file(&self, uri: &str) -> Result<(FileStream, FileMetadata)> {
        self.system.get_file(uri).await
    }

    pub async fn get_file_by_id(&self, bucket: &str, file_id: &str) -> Result<(FileStream, FileMetadata)> {
        let metadata = self
            .system
            .get_file_metadata(bucket, file_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", bucket, file_id)))?;
        self.system.get_file(&metadata.uri).await
    }

    pub async fn delete_file(&self, uri: &str) -> Result<bool> {
        self.system.delete_file(uri).await
    }

    pub async fn delete_file_by_id(&self, bucket: &str, file_id: &str) -> Result<bool> {
        match self.system.get_file_metadata(bucket, file_id).await? {
            Some(metadata) => self.system.delete_file(&metadata.uri).await,
            None => Ok(false),
        }
    }

    pub async fn list_files(&self, bucket: &str, filters: Option<QuerySpec>) -> Result<Vec<FileMetadata>> {
        self.system
            .list_files(bucket, filters.unwrap_or_default())
            .await
    }

    pub async fn get_public_url(&self, uri: &str) -> Result<Option<String>> {
        self.system.get_public_url(uri).await
    }
}
