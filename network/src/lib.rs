mod peer;

pub use peer::{ChunkStream, PeerClient};

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_PREFIX: &str = "/api/v1/peer/files";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Route prefix every node mounts its peer endpoints under.
    pub api_prefix: String,
    pub connect_timeout: Duration,
    /// Upper bound for a whole peer exchange, body transfer included.
    pub transfer_timeout: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            connect_timeout: Duration::from_secs(10),
            transfer_timeout: Duration::from_secs(360),
        }
    }
}

/// Normalizes a route prefix to `/segment/segment` form: one leading slash,
/// no trailing slash. An empty prefix stays empty.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Peer has no such file: {0}")]
    NotFound(String),

    #[error("Peer returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}
