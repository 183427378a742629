use crate::config::Config;
use crate::error::{O3FsError, Result};
use std::sync::Arc;
use storage::{
    DistributedStorage, FileStorageClient, FileStorageSystem, JsonFileMetadataStore, LocalFileStorage,
    StorageBackend,
};
use tokio::net::TcpListener;
use tracing::{error, info};

/// One storage node: a metadata store, both backends, the coordinator on top
/// of them and the peer server that lets other nodes reach its bodies.
pub struct Node {
    config: Config,
    distributed: Arc<DistributedStorage>,
    system: Arc<FileStorageSystem>,
    client: FileStorageClient,
    api_server: api::Server,
}

impl Node {
    pub async fn new(config: Config) -> Result<Self> {
        if config.node_address().is_empty() {
            return Err(O3FsError::InvalidConfig("node address must not be empty".to_string()));
        }
        info!(
            "Initializing o3fs node {} with storage under {}",
            config.node_address(),
            config.storage_path.display()
        );

        let metadata_store = Arc::new(JsonFileMetadataStore::new(config.metadata_path()).await?);
        let local = Arc::new(LocalFileStorage::new(config.clone().into()).await?);
        let distributed = Arc::new(DistributedStorage::new(config.clone().into()).await?);

        let backends: Vec<Arc<dyn StorageBackend>> = vec![local, distributed.clone()];
        let system = Arc::new(FileStorageSystem::new(
            backends,
            metadata_store,
            config.clone().into(),
        ));
        let client = FileStorageClient::new(system.clone(), config.clone().into());
        let api_server = api::Server::new(config.clone().into(), distributed.clone());

        Ok(Self {
            config,
            distributed,
            system,
            client,
            api_server,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &FileStorageClient {
        &self.client
    }

    pub fn system(&self) -> &Arc<FileStorageSystem> {
        &self.system
    }

    pub fn distributed(&self) -> &Arc<DistributedStorage> {
        &self.distributed
    }

    /// Runs the peer server on the configured address until it fails or the
    /// process receives Ctrl-C.
    pub async fn start(&self) -> Result<()> {
        info!("Starting o3fs node services");

        tokio::select! {
            result = self.api_server.start() => {
                error!("Peer server stopped: {:?}", result);
                result.map_err(O3FsError::from)
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutting down node {}", self.config.node_address());
                Ok(())
            }
        }
    }

    /// Runs the peer server on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.api_server.serve(listener).await?;
        Ok(())
    }
}
