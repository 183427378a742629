use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncSeekExt;

use crate::backend::{BlobReader, FileStream, StorageBackend, DEFAULT_CHUNK_SIZE};
use crate::hasher::{ContentHasher, HASH_DISABLED};
use crate::local::LOCAL_STORAGE_TYPE;
use crate::metadata::{FileMetadata, FileMetadataIdentifier, MetadataStore, QuerySpec};
use crate::uri::{is_local_file, FileStorageUri};
use crate::{Result, StorageError};

/// Bucket recorded on metadata synthesized for plain filesystem paths.
pub const LOCAL_FILE_BUCKET: &str = "o3fs_local_file";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSystemOptions {
    /// Hash bodies on save and verify them on load.
    pub check_hash: bool,
}

impl Default for StorageSystemOptions {
    fn default() -> Self {
        Self { check_hash: true }
    }
}

/// Coordinates the registered backends and the metadata store.
///
/// A save runs strictly backend write, then hash, then metadata write. Nothing
/// here locks across those steps; the store and the backends are expected to
/// be safe for concurrent use on their own.
pub struct FileStorageSystem {
    backends: HashMap<String, Arc<dyn StorageBackend>>,
    metadata_store: Arc<dyn MetadataStore>,
    hasher: ContentHasher,
}

impl FileStorageSystem {
    pub fn new(
        backends: Vec<Arc<dyn StorageBackend>>,
        metadata_store: Arc<dyn MetadataStore>,
        options: StorageSystemOptions,
    ) -> Self {
        let chunk_size = backends
            .iter()
            .map(|b| b.save_chunk_size())
            .min()
            .unwrap_or(DEFAULT_CHUNK_SIZE);

        let mut registry = HashMap::new();
        for backend in backends {
            let storage_type = backend.storage_type().to_string();
            if registry.insert(storage_type.clone(), backend).is_some() {
                tracing::warn!("Storage backend {} registered twice, keeping the last one", storage_type);
            }
        }

        Self {
            backends: registry,
            metadata_store,
            hasher: ContentHasher::new(options.check_hash, chunk_size),
        }
    }

    pub fn storage_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.backends.keys().cloned().collect();
        types.sort();
        types
    }

    /// Chunk size used for hashing and for client downloads.
    pub fn save_chunk_size(&self) -> usize {
        self.hasher.chunk_size()
    }

    pub fn check_hash(&self) -> bool {
        self.hasher.is_enabled()
    }

    fn backend(&self, storage_type: &str) -> Result<&Arc<dyn StorageBackend>> {
        self.backends
            .get(storage_type)
            .ok_or_else(|| StorageError::UnsupportedStorageType(storage_type.to_string()))
    }

    pub async fn save_file(
        &self,
        bucket: &str,
        file_name: &str,
        stream: &mut dyn BlobReader,
        storage_type: &str,
        custom_metadata: HashMap<String, Value>,
        file_id: Option<String>,
    ) -> Result<String> {
        let file_id = file_id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let backend = self.backend(storage_type)?;

        let storage_path = backend.save(bucket, &file_id, stream).await?;

        stream.seek(SeekFrom::Start(0)).await?;
        let file_size = stream.seek(SeekFrom::End(0)).await?;
        stream.seek(SeekFrom::Start(0)).await?;

        let custom_metadata: HashMap<String, Value> = custom_metadata
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .collect();
        let file_hash = self.hasher.hash_stream(stream).await?;

        let uri = FileStorageUri::new(storage_type, bucket, file_id.clone()).to_string();
        let metadata = FileMetadata {
            file_id,
            bucket: bucket.to_string(),
            file_name: file_name.to_string(),
            file_size: file_size as i64,
            storage_type: storage_type.to_string(),
            storage_path,
            uri: uri.clone(),
            user_name: custom_field(&custom_metadata, "user_name"),
            sys_code: custom_field(&custom_metadata, "sys_code"),
            custom_metadata,
            file_hash,
        };
        self.metadata_store.save(metadata).await?;

        tracing::info!("Saved {} ({} bytes) as {}", file_name, file_size, uri);
        Ok(uri)
    }

    /// Opens a blob by URI. Plain filesystem paths are opened directly and
    /// come back with a synthesized record; everything else is verified
    /// against its stored hash before the stream is handed out.
    pub async fn get_file(&self, uri: &str) -> Result<(FileStream, FileMetadata)> {
        if is_local_file(uri) {
            let metadata = local_file_metadata(uri)?;
            let file = open_local_path(&metadata.storage_path).await?;
            return Ok((Box::new(file), metadata));
        }

        let parsed = FileStorageUri::parse(uri)?;
        let metadata = self
            .metadata_store
            .load(&FileMetadataIdentifier::new(&parsed.bucket, &parsed.file_id))
            .await?
            .ok_or_else(|| StorageError::NotFound(uri.to_string()))?;

        let backend = self.backend(&metadata.storage_type)?;
        let mut stream = backend.load(&metadata).await?;

        if self.hasher.is_enabled() {
            if metadata.file_hash == HASH_DISABLED {
                tracing::warn!(
                    "{} was stored without a hash, skipping integrity check",
                    metadata.identifier()
                );
            } else {
                let actual = self.hasher.hash_stream(stream.as_mut()).await?;
                if actual != metadata.file_hash {
                    tracing::error!(
                        "Integrity check failed for {}: expected {}, got {}",
                        metadata.identifier(),
                        metadata.file_hash,
                        actual
                    );
                    return Err(StorageError::IntegrityCheck {
                        expected: metadata.file_hash,
                        actual,
                    });
                }
            }
        }

        Ok((stream, metadata))
    }

    /// `true` only when both the body and its record are gone. A record that
    /// outlives its body reports `false` so the caller can retry.
    pub async fn delete_file(&self, uri: &str) -> Result<bool> {
        let parsed = FileStorageUri::parse(uri)?;
        let id = FileMetadataIdentifier::new(&parsed.bucket, &parsed.file_id);
        let Some(metadata) = self.metadata_store.load(&id).await? else {
            return Ok(false);
        };

        let backend = self.backend(&metadata.storage_type)?;
        if !backend.delete(&metadata).await? {
            return Ok(false);
        }

        match self.metadata_store.delete(&id).await {
            Ok(()) => {
                tracing::info!("Deleted {}", uri);
                Ok(true)
            }
            Err(e) => {
                tracing::warn!("Deleted body of {} but its metadata remains: {}", id, e);
                Ok(false)
            }
        }
    }

    pub async fn list_files(&self, bucket: &str, filters: QuerySpec) -> Result<Vec<FileMetadata>> {
        self.metadata_store
            .query(&filters.with("bucket", bucket))
            .await
    }

    pub async fn get_file_metadata(&self, bucket: &str, file_id: &str) -> Result<Option<FileMetadata>> {
        self.metadata_store
            .load(&FileMetadataIdentifier::new(bucket, file_id))
            .await
    }

    pub async fn get_file_metadata_by_uri(&self, uri: &str) -> Result<Option<FileMetadata>> {
        if is_local_file(uri) {
            return local_file_metadata(uri).map(Some);
        }
        let parsed = FileStorageUri::parse(uri)?;
        self.get_file_metadata(&parsed.bucket, &parsed.file_id).await
    }

    /// Replaces a record wholesale. Repair path only; saves never go through
    /// here.
    pub async fn merge_file_metadata(&self, metadata: FileMetadata) -> Result<()> {
        tracing::info!("Replacing metadata record {}", metadata.identifier());
        self.metadata_store.save(metadata).await
    }

    pub async fn get_public_url(&self, uri: &str) -> Result<Option<String>> {
        if is_local_file(uri) {
            return Ok(None);
        }
        let metadata = self
            .get_file_metadata_by_uri(uri)
            .await?
            .ok_or_else(|| StorageError::NotFound(uri.to_string()))?;
        Ok(self.backend(&metadata.storage_type)?.public_url(&metadata))
    }
}

fn custom_field(custom_metadata: &HashMap<String, Value>, key: &str) -> Option<String> {
    custom_metadata.get(key).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Filesystem path behind a bare path or a `file://` URI. File URIs are
/// percent-decoded; ones naming a host other than `localhost` are rejected.
fn local_path(uri: &str) -> Result<PathBuf> {
    match url::Url::parse(uri) {
        Ok(parsed) if parsed.scheme() == "file" => parsed
            .to_file_path()
            .map_err(|_| StorageError::InvalidUri(uri.to_string())),
        _ => Ok(PathBuf::from(uri)),
    }
}

fn local_file_metadata(uri: &str) -> Result<FileMetadata> {
    let path = local_path(uri)?;
    let storage_path = path.to_string_lossy().into_owned();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| storage_path.clone());

    Ok(FileMetadata {
        file_id: file_name.clone(),
        bucket: LOCAL_FILE_BUCKET.to_string(),
        file_name,
        file_size: -1,
        storage_type: LOCAL_STORAGE_TYPE.to_string(),
        storage_path,
        uri: uri.to_string(),
        custom_metadata: HashMap::new(),
        file_hash: String::new(),
        user_name: None,
        sys_code: None,
    })
}

async fn open_local_path(path: &str) -> Result<File> {
    match File::open(path).await {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(path.to_string())),
        Err(e) => Err(StorageError::Io(e)),
    }
}
