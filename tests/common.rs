//! Shared fixtures for the o3fs integration tests.

use std::io::{self, Cursor, SeekFrom};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use storage::{
    DistributedStorage, DistributedStorageOptions, FileStorageSystem, InMemoryMetadataStore,
    LocalFileStorage, LocalStorageOptions, MetadataStore, StorageBackend, StorageSystemOptions,
};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tokio::net::TcpListener;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A storage system with only the local backend, backed by an in-memory
/// metadata store.
pub struct LocalFixture {
    pub system: Arc<FileStorageSystem>,
    pub store: Arc<InMemoryMetadataStore>,
    pub dir: TempDir,
}

impl LocalFixture {
    pub async fn new(check_hash: bool, chunk_size: usize) -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let mut options = LocalStorageOptions::new(dir.path().join("local"));
        options.save_chunk_size = chunk_size;
        let local = LocalFileStorage::new(options).await.unwrap();

        let store = Arc::new(InMemoryMetadataStore::new());
        let system = FileStorageSystem::new(
            vec![Arc::new(local)],
            store.clone(),
            StorageSystemOptions { check_hash },
        );

        Self {
            system: Arc::new(system),
            store,
            dir,
        }
    }

    /// Writes `content` to a scratch file and returns its path.
    pub fn write_source(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }
}

/// One member of an in-process federation: a distributed backend whose peer
/// endpoints are served on a real loopback socket.
pub struct PeerNode {
    pub addr: SocketAddr,
    pub distributed: Arc<DistributedStorage>,
    pub system: Arc<FileStorageSystem>,
    pub dir: TempDir,
    server: tokio::task::JoinHandle<()>,
}

impl PeerNode {
    /// Starts a node sharing `store` with the rest of the federation.
    pub async fn start(store: Arc<dyn MetadataStore>) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dir = TempDir::new().unwrap();

        let mut options = DistributedStorageOptions::new(addr.to_string(), dir.path());
        options.peer.connect_timeout = Duration::from_secs(2);
        options.peer.transfer_timeout = Duration::from_secs(10);
        let distributed = Arc::new(DistributedStorage::new(options).await.unwrap());

        let backends: Vec<Arc<dyn StorageBackend>> = vec![distributed.clone()];
        let system = Arc::new(FileStorageSystem::new(
            backends,
            store,
            StorageSystemOptions::default(),
        ));

        let server = api::Server::new(api::Config::new(addr.to_string()), distributed.clone());
        let handle = tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        Self {
            addr,
            distributed,
            system,
            dir,
            server: handle,
        }
    }

    pub fn node_address(&self) -> String {
        self.addr.to_string()
    }
}

impl Drop for PeerNode {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub fn distributed_body_path(base: &Path, node_address: &str, bucket: &str, file_id: &str) -> PathBuf {
    use md5::{Digest, Md5};
    let suffix = format!("{:x}", Md5::digest(node_address.as_bytes()));
    base.join(bucket).join(format!("{}_{}", file_id, suffix))
}

/// Deterministic pseudo-random body of `len` bytes.
pub fn patterned_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 7) % 251) as u8).collect()
}

/// In-memory reader that records the largest read any consumer asked of it.
pub struct InstrumentedReader {
    inner: Cursor<Vec<u8>>,
    largest_read: Arc<AtomicUsize>,
}

impl InstrumentedReader {
    pub fn new(data: Vec<u8>) -> (Self, Arc<AtomicUsize>) {
        let largest_read = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner: Cursor::new(data),
                largest_read: largest_read.clone(),
            },
            largest_read,
        )
    }
}

impl AsyncRead for InstrumentedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.largest_read.fetch_max(buf.remaining(), Ordering::SeqCst);
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncSeek for InstrumentedReader {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.inner).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.inner).poll_complete(cx)
    }
}
