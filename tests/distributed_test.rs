use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use o3fs_tests::{distributed_body_path, init_tracing, patterned_body, PeerNode};
use storage::{
    DistributedStorage, DistributedStorageOptions, FileMetadata, InMemoryMetadataStore, MetadataStore,
    StorageBackend, StorageError, DISTRIBUTED_STORAGE_TYPE,
};
use tokio::io::AsyncReadExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn backend(dir: &std::path::Path, node_address: &str) -> DistributedStorage {
    let mut options = DistributedStorageOptions::new(node_address, dir);
    options.peer.connect_timeout = Duration::from_secs(2);
    options.peer.transfer_timeout = Duration::from_secs(5);
    DistributedStorage::new(options).await.unwrap()
}

fn remote_record(owner: &str, bucket: &str, file_id: &str) -> FileMetadata {
    FileMetadata {
        file_id: file_id.to_string(),
        bucket: bucket.to_string(),
        file_name: format!("{}.bin", file_id),
        file_size: 0,
        storage_type: DISTRIBUTED_STORAGE_TYPE.to_string(),
        storage_path: format!("distributed://{}/{}/{}", owner, bucket, file_id),
        uri: format!("o3fs://distributed/{}/{}", bucket, file_id),
        custom_metadata: HashMap::new(),
        file_hash: String::new(),
        user_name: None,
        sys_code: None,
    }
}

async fn read_all(mut stream: storage::FileStream) -> Vec<u8> {
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn test_distributed_local_path() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(dir.path(), "127.0.0.1:8000").await;

    let mut body = Cursor::new(b"owned by 127.0.0.1:8000".to_vec());
    let storage_path = backend.save("bucket", "file-1", &mut body).await.unwrap();
    assert_eq!(storage_path, "distributed://127.0.0.1:8000/bucket/file-1");

    let on_disk = distributed_body_path(dir.path(), "127.0.0.1:8000", "bucket", "file-1");
    assert!(on_disk.exists());
    assert_eq!(std::fs::read(on_disk).unwrap(), b"owned by 127.0.0.1:8000");
}

#[tokio::test]
async fn test_distributed_remote_path() {
    init_tracing();
    let peer = MockServer::start().await;
    let owner = peer.address().to_string();
    let body = patterned_body(64 * 1024);

    Mock::given(method("GET"))
        .and(path("/api/v1/peer/files/bucket/file-1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&peer)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let backend = backend(dir.path(), "127.0.0.1:8000").await;
    let stream = backend
        .load(&remote_record(&owner, "bucket", "file-1"))
        .await
        .unwrap();
    assert_eq!(read_all(stream).await, body);
}

#[tokio::test]
async fn test_remote_missing_body_is_not_found() {
    let peer = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&peer)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let backend = backend(dir.path(), "127.0.0.1:8000").await;
    let result = backend
        .load(&remote_record(&peer.address().to_string(), "bucket", "gone"))
        .await;
    assert!(matches!(result, Err(StorageError::NotFound(_))));
}

#[tokio::test]
async fn test_remote_delete_outcomes() {
    let peer = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/peer/files/bucket/ok"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&peer)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/peer/files/bucket/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&peer)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let backend = backend(dir.path(), "127.0.0.1:8000").await;
    let owner = peer.address().to_string();

    assert!(backend.delete(&remote_record(&owner, "bucket", "ok")).await.unwrap());
    assert!(!backend.delete(&remote_record(&owner, "bucket", "broken")).await.unwrap());
}

#[tokio::test]
async fn test_bad_storage_path_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(dir.path(), "127.0.0.1:8000").await;
    let mut record = remote_record("ignored", "bucket", "f");
    record.storage_path = "/plain/path".to_string();
    assert!(matches!(
        backend.load(&record).await,
        Err(StorageError::InvalidStoragePath(_))
    ));
}

#[tokio::test]
async fn test_read_through_owner_node() {
    let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
    let owner = PeerNode::start(store.clone()).await;
    let reader = PeerNode::start(store.clone()).await;

    let body = patterned_body(200_000);
    let mut stream = Cursor::new(body.clone());
    let uri = owner
        .system
        .save_file("shared", "big.bin", &mut stream, DISTRIBUTED_STORAGE_TYPE, HashMap::new(), None)
        .await
        .unwrap();

    let (stream, metadata) = reader.system.get_file(&uri).await.unwrap();
    assert_eq!(read_all(stream).await, body);
    assert!(metadata
        .storage_path
        .starts_with(&format!("distributed://{}/", owner.node_address())));

    let public_url = reader.system.get_public_url(&uri).await.unwrap().unwrap();
    assert_eq!(
        public_url,
        format!(
            "http://{}/api/v1/peer/files/shared/{}",
            owner.node_address(),
            metadata.file_id
        )
    );
}

#[tokio::test]
async fn test_delete_through_owner_node() {
    let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
    let owner = PeerNode::start(store.clone()).await;
    let other = PeerNode::start(store.clone()).await;

    let mut stream = Cursor::new(b"remote delete".to_vec());
    let uri = owner
        .system
        .save_file("shared", "d.txt", &mut stream, DISTRIBUTED_STORAGE_TYPE, HashMap::new(), None)
        .await
        .unwrap();
    let metadata = owner.system.get_file_metadata_by_uri(&uri).await.unwrap().unwrap();

    assert!(other.system.delete_file(&uri).await.unwrap());
    assert!(matches!(
        owner.distributed.load_local("shared", &metadata.file_id).await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        other.system.get_file(&uri).await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_remote_tampering_is_detected() {
    let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
    let owner = PeerNode::start(store.clone()).await;
    let reader = PeerNode::start(store.clone()).await;

    let mut stream = Cursor::new(b"original".to_vec());
    let uri = owner
        .system
        .save_file("shared", "t.txt", &mut stream, DISTRIBUTED_STORAGE_TYPE, HashMap::new(), None)
        .await
        .unwrap();
    let metadata = owner.system.get_file_metadata_by_uri(&uri).await.unwrap().unwrap();

    let on_disk = distributed_body_path(
        owner.dir.path(),
        &owner.node_address(),
        "shared",
        &metadata.file_id,
    );
    std::fs::write(on_disk, b"Tampered content").unwrap();

    assert!(matches!(
        reader.system.get_file(&uri).await,
        Err(StorageError::IntegrityCheck { .. })
    ));
}

#[tokio::test]
async fn test_node_binary_wiring() {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let dir = tempfile::tempdir().unwrap();

    let mut config = o3fs::Config::new(addr.ip(), addr.port());
    config.storage_path = dir.path().to_path_buf();
    config.default_storage_type = DISTRIBUTED_STORAGE_TYPE.to_string();

    let node = Arc::new(o3fs::Node::new(config).await.unwrap());
    let serving = node.clone();
    let server = tokio::spawn(async move {
        let _ = serving.serve(listener).await;
    });

    let source = dir.path().join("hello.txt");
    std::fs::write(&source, b"hello from the node").unwrap();
    let uri = node
        .client()
        .upload_file("inbox", &source, None, None, Some("hello".to_string()))
        .await
        .unwrap();
    assert_eq!(uri, "o3fs://distributed/inbox/hello");
    assert!(dir.path().join("metadata").join("inbox").join("hello.json").exists());

    let peer = network::PeerClient::new(network::PeerConfig::default()).unwrap();
    let chunks = peer
        .fetch_file(&addr.to_string(), "inbox", "hello")
        .await
        .unwrap();
    let mut reader = storage::StreamedReader::new(chunks);
    assert_eq!(
        &reader.read_bytes(None).await.unwrap()[..],
        b"hello from the node"
    );

    server.abort();
}
