use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use std::pin::Pin;

use crate::{normalize_prefix, NetworkError, PeerConfig, Result};

/// Body of a peer response, delivered chunk by chunk as it arrives.
pub type ChunkStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// HTTP client for the peer endpoints of other nodes.
///
/// Nodes are addressed by the exact string they advertise (usually
/// `host:port`); the same string is embedded in distributed storage paths.
#[derive(Clone)]
pub struct PeerClient {
    client: reqwest::Client,
    api_prefix: String,
    config: PeerConfig,
}

impl PeerClient {
    pub fn new(config: PeerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.transfer_timeout)
            .build()?;

        Ok(Self {
            client,
            api_prefix: normalize_prefix(&config.api_prefix),
            config,
        })
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// `http://<node>/<prefix>/<bucket>/<file_id>`
    pub fn file_url(&self, node_address: &str, bucket: &str, file_id: &str) -> String {
        format!(
            "http://{}{}/{}/{}",
            node_address, self.api_prefix, bucket, file_id
        )
    }

    /// Starts a streaming GET against the owner node. Only the response head
    /// is awaited here; the body is pulled lazily through the returned stream.
    pub async fn fetch_file(
        &self,
        node_address: &str,
        bucket: &str,
        file_id: &str,
    ) -> Result<ChunkStream> {
        let url = self.file_url(node_address, bucket, file_id);
        tracing::debug!("Fetching {} from peer {}", file_id, node_address);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify(e, &url))?;

        match response.status() {
            status if status.is_success() => {
                let body = response
                    .bytes_stream()
                    .map(|chunk| chunk.map_err(std::io::Error::other));
                Ok(Box::pin(body))
            }
            StatusCode::NOT_FOUND => Err(NetworkError::NotFound(url)),
            status => Err(NetworkError::Status {
                status: status.as_u16(),
                url,
            }),
        }
    }

    pub async fn delete_file(&self, node_address: &str, bucket: &str, file_id: &str) -> Result<()> {
        let url = self.file_url(node_address, bucket, file_id);
        tracing::debug!("Deleting {} on peer {}", file_id, node_address);

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| classify(e, &url))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NetworkError::Status {
                status: response.status().as_u16(),
                url,
            })
        }
    }
}

fn classify(err: reqwest::Error, url: &str) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout(url.to_string())
    } else if err.is_connect() {
        NetworkError::ConnectionFailed(format!("{}: {}", url, err))
    } else {
        NetworkError::Http(err)
    }
}
