use async_trait::async_trait;
use network::{PeerClient, PeerConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs::{self, File};

use crate::backend::{copy_chunked, BlobReader, FileStream, StorageBackend, DEFAULT_CHUNK_SIZE};
use crate::hasher::md5_hex;
use crate::metadata::FileMetadata;
use crate::streamed::StreamedReader;
use crate::{validate_component, Result, StorageError};

pub const DISTRIBUTED_STORAGE_TYPE: &str = "distributed";

const STORAGE_PATH_PREFIX: &str = "distributed://";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedStorageOptions {
    /// Address peers use to reach this node, byte-exact as it appears in
    /// storage paths (typically `host:port`).
    pub node_address: String,
    pub local_storage_path: PathBuf,
    pub save_chunk_size: usize,
    pub peer: PeerConfig,
}

impl DistributedStorageOptions {
    pub fn new(node_address: impl Into<String>, local_storage_path: impl Into<PathBuf>) -> Self {
        Self {
            node_address: node_address.into(),
            local_storage_path: local_storage_path.into(),
            save_chunk_size: DEFAULT_CHUNK_SIZE,
            peer: PeerConfig::default(),
        }
    }
}

/// Backend for a federation of nodes. Every blob lives on the node that
/// saved it; any other node reaches it through that owner's peer endpoints.
pub struct DistributedStorage {
    node_address: String,
    local_storage_path: PathBuf,
    save_chunk_size: usize,
    node_suffix: String,
    peer: PeerClient,
}

impl DistributedStorage {
    pub async fn new(options: DistributedStorageOptions) -> Result<Self> {
        if options.node_address.is_empty() {
            return Err(StorageError::InvalidStoragePath(
                "node address must not be empty".to_string(),
            ));
        }

        fs::create_dir_all(&options.local_storage_path).await?;
        let peer = PeerClient::new(options.peer)?;

        Ok(Self {
            node_suffix: md5_hex(options.node_address.as_bytes()),
            node_address: options.node_address,
            local_storage_path: options.local_storage_path,
            save_chunk_size: options.save_chunk_size.max(1),
            peer,
        })
    }

    pub fn node_address(&self) -> &str {
        &self.node_address
    }

    /// `<base>/<bucket>/<file_id>_<md5(node_address)>`. The suffix keeps
    /// nodes apart if they ever share a storage root.
    pub fn local_file_path(&self, bucket: &str, file_id: &str) -> Result<PathBuf> {
        validate_component("bucket", bucket)?;
        validate_component("file id", file_id)?;
        Ok(self
            .local_storage_path
            .join(bucket)
            .join(format!("{}_{}", file_id, self.node_suffix)))
    }

    pub fn storage_path(&self, bucket: &str, file_id: &str) -> String {
        format!(
            "{}{}/{}/{}",
            STORAGE_PATH_PREFIX, self.node_address, bucket, file_id
        )
    }

    fn is_local(&self, owner: &str) -> bool {
        owner == self.node_address
    }

    /// Opens a body this node owns. Used by the peer GET endpoint as well as
    /// by local loads.
    pub async fn load_local(&self, bucket: &str, file_id: &str) -> Result<File> {
        let path = self.local_file_path(bucket, file_id)?;
        match File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(format!("{}/{}", bucket, file_id)))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Removes a body this node owns; `false` if it was not there.
    pub async fn delete_local(&self, bucket: &str, file_id: &str) -> Result<bool> {
        let path = self.local_file_path(bucket, file_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

/// Extracts the owner node from `distributed://<node>/<bucket>/<file_id>`.
pub fn parse_owner_node(storage_path: &str) -> Result<&str> {
    let rest = storage_path
        .strip_prefix(STORAGE_PATH_PREFIX)
        .ok_or_else(|| StorageError::InvalidStoragePath(storage_path.to_string()))?;

    match rest.split('/').next() {
        Some(node) if !node.is_empty() => Ok(node),
        _ => Err(StorageError::InvalidStoragePath(storage_path.to_string())),
    }
}

#[async_trait]
impl StorageBackend for DistributedStorage {
    fn storage_type(&self) -> &str {
        DISTRIBUTED_STORAGE_TYPE
    }

    fn save_chunk_size(&self) -> usize {
        self.save_chunk_size
    }

    async fn save(&self, bucket: &str, file_id: &str, stream: &mut dyn BlobReader) -> Result<String> {
        let path = self.local_file_path(bucket, file_id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = File::create(&path).await?;
        let written = copy_chunked(stream, &mut file, self.save_chunk_size).await?;
        file.sync_all().await?;

        tracing::debug!(
            "Node {} stored {}/{} ({} bytes)",
            self.node_address,
            bucket,
            file_id,
            written
        );
        Ok(self.storage_path(bucket, file_id))
    }

    async fn load(&self, metadata: &FileMetadata) -> Result<FileStream> {
        let owner = parse_owner_node(&metadata.storage_path)?;

        if self.is_local(owner) {
            let file = self.load_local(&metadata.bucket, &metadata.file_id).await?;
            return Ok(Box::new(file));
        }

        tracing::debug!(
            "Streaming {}/{} from owner node {}",
            metadata.bucket,
            metadata.file_id,
            owner
        );
        let chunks = self
            .peer
            .fetch_file(owner, &metadata.bucket, &metadata.file_id)
            .await?;
        Ok(Box::new(StreamedReader::new(chunks)))
    }

    async fn delete(&self, metadata: &FileMetadata) -> Result<bool> {
        let owner = parse_owner_node(&metadata.storage_path)?;

        if self.is_local(owner) {
            return self.delete_local(&metadata.bucket, &metadata.file_id).await;
        }

        match self
            .peer
            .delete_file(owner, &metadata.bucket, &metadata.file_id)
            .await
        {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(
                    "Failed to delete {}/{} on owner node {}: {}",
                    metadata.bucket,
                    metadata.file_id,
                    owner,
                    e
                );
                Ok(false)
            }
        }
    }

    fn public_url(&self, metadata: &FileMetadata) -> Option<String> {
        let owner = parse_owner_node(&metadata.storage_path).ok()?;
        Some(self.peer.file_url(owner, &metadata.bucket, &metadata.file_id))
    }
}
