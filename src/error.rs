use thiserror::Error;

#[derive(Error, Debug)]
pub enum O3FsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("API error: {0}")]
    Api(#[from] api::ApiError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, O3FsError>;
