mod backend;
mod client;
mod distributed;
mod hasher;
mod json_store;
mod local;
mod metadata;
mod streamed;
mod system;
mod uri;

pub use backend::{copy_chunked, BlobReader, FileStream, StorageBackend, DEFAULT_CHUNK_SIZE};
pub use client::{ClientOptions, FileStorageClient};
pub use distributed::{DistributedStorage, DistributedStorageOptions, DISTRIBUTED_STORAGE_TYPE};
pub use hasher::{ContentHasher, HASH_DISABLED};
pub use json_store::JsonFileMetadataStore;
pub use local::{LocalFileStorage, LocalStorageOptions, LOCAL_STORAGE_TYPE};
pub use metadata::{FileMetadata, FileMetadataIdentifier, InMemoryMetadataStore, MetadataStore, QuerySpec};
pub use streamed::StreamedReader;
pub use system::{FileStorageSystem, StorageSystemOptions, LOCAL_FILE_BUCKET};
pub use uri::{is_local_file, FileStorageUri, FILE_SCHEME};

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Unsupported storage type: {0}")]
    UnsupportedStorageType(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("File integrity check failed, hash mismatch: expected {expected}, got {actual}")]
    IntegrityCheck { expected: String, actual: String },

    #[error("Network error: {0}")]
    Network(network::NetworkError),

    #[error("Metadata store error: {0}")]
    Metadata(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid path component: {0}")]
    InvalidPath(String),

    #[error("Invalid storage path: {0}")]
    InvalidStoragePath(String),
}

impl From<network::NetworkError> for StorageError {
    fn from(err: network::NetworkError) -> Self {
        match err {
            network::NetworkError::NotFound(url) => StorageError::NotFound(url),
            other => StorageError::Network(other),
        }
    }
}

/// Rejects bucket names and file ids that would escape their directory once
/// joined onto a backend's base path.
pub(crate) fn validate_component(kind: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\')
        || value.contains('\0')
    {
        return Err(StorageError::InvalidPath(format!("{} {:?}", kind, value)));
    }
    Ok(())
}
