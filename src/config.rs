use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use storage::{
    ClientOptions, DistributedStorageOptions, LocalStorageOptions, StorageSystemOptions,
    DEFAULT_CHUNK_SIZE, LOCAL_STORAGE_TYPE,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node_ip: IpAddr,
    pub port: u16,
    /// Address other nodes use to reach this one. Defaults to `ip:port`.
    pub advertised_address: Option<String>,
    pub storage_path: PathBuf,
    pub api_prefix: String,
    pub check_hash: bool,
    pub default_storage_type: String,
    pub save_chunk_size: usize,
    pub connect_timeout_ms: u64,
    pub transfer_timeout_ms: u64,
}

impl Config {
    pub fn new(node_ip: IpAddr, port: u16) -> Self {
        let peer = network::PeerConfig::default();
        Self {
            node_ip,
            port,
            advertised_address: None,
            storage_path: PathBuf::from("/var/lib/o3fs"),
            api_prefix: peer.api_prefix,
            check_hash: true,
            default_storage_type: LOCAL_STORAGE_TYPE.to_string(),
            save_chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout_ms: peer.connect_timeout.as_millis() as u64,
            transfer_timeout_ms: peer.transfer_timeout.as_millis() as u64,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.node_ip, self.port)
    }

    pub fn node_address(&self) -> String {
        self.advertised_address
            .clone()
            .unwrap_or_else(|| self.bind_address())
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.storage_path.join("metadata")
    }

    pub fn local_storage_path(&self) -> PathBuf {
        self.storage_path.join("local")
    }

    pub fn distributed_storage_path(&self) -> PathBuf {
        self.storage_path.join("distributed")
    }
}

impl From<Config> for network::PeerConfig {
    fn from(config: Config) -> Self {
        network::PeerConfig {
            api_prefix: config.api_prefix,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            transfer_timeout: Duration::from_millis(config.transfer_timeout_ms),
        }
    }
}

impl From<Config> for LocalStorageOptions {
    fn from(config: Config) -> Self {
        LocalStorageOptions {
            base_path: config.local_storage_path(),
            save_chunk_size: config.save_chunk_size,
        }
    }
}

impl From<Config> for DistributedStorageOptions {
    fn from(config: Config) -> Self {
        DistributedStorageOptions {
            node_address: config.node_address(),
            local_storage_path: config.distributed_storage_path(),
            save_chunk_size: config.save_chunk_size,
            peer: config.into(),
        }
    }
}

impl From<Config> for StorageSystemOptions {
    fn from(config: Config) -> Self {
        StorageSystemOptions {
            check_hash: config.check_hash,
        }
    }
}

impl From<Config> for ClientOptions {
    fn from(config: Config) -> Self {
        ClientOptions {
            default_storage_type: config.default_storage_type,
            save_chunk_size: config.save_chunk_size,
            cache_dir: None,
        }
    }
}

impl From<Config> for api::Config {
    fn from(config: Config) -> Self {
        api::Config {
            bind_address: config.bind_address(),
            api_prefix: config.api_prefix,
        }
    }
}
