mod error;
mod handlers;
mod server;

pub use error::{ApiError, ApiResult};
pub use handlers::AppState;
pub use server::Server;

use serde::{Deserialize, Serialize};

/// Peer server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_address: String,
    /// Prefix the file routes are mounted under. Every node of a federation
    /// must use the same one.
    pub api_prefix: String,
}

impl Config {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            api_prefix: network::DEFAULT_API_PREFIX.to_string(),
        }
    }
}
