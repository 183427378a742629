use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::metadata::{FileMetadata, FileMetadataIdentifier, MetadataStore, QuerySpec};
use crate::{validate_component, Result, StorageError};

/// Metadata store keeping one JSON document per record at
/// `<root>/<bucket>/<file_id>.json`.
pub struct JsonFileMetadataStore {
    root: PathBuf,
}

impl JsonFileMetadataStore {
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn record_path(&self, id: &FileMetadataIdentifier) -> Result<PathBuf> {
        validate_component("bucket", &id.bucket)?;
        validate_component("file id", &id.file_id)?;
        Ok(self
            .root
            .join(&id.bucket)
            .join(format!("{}.json", id.file_id)))
    }

    async fn read_record(path: &Path) -> Result<Option<FileMetadata>> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn bucket_dirs(&self, spec: &QuerySpec) -> Result<Vec<PathBuf>> {
        if let Some(Value::String(bucket)) = spec.get("bucket") {
            if validate_component("bucket", bucket).is_err() {
                return Ok(Vec::new());
            }
            return Ok(vec![self.root.join(bucket)]);
        }

        let mut dirs = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                dirs.push(entry.path());
            }
        }
        Ok(dirs)
    }
}

#[async_trait]
impl MetadataStore for JsonFileMetadataStore {
    async fn save(&self, item: FileMetadata) -> Result<()> {
        let path = self.record_path(&item.identifier())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec_pretty(&item)?;
        // One staging file per write; concurrent saves of a record race only
        // on the rename, and the last rename wins.
        let temp = path.with_file_name(format!(
            "{}.{}.tmp",
            item.file_id,
            uuid::Uuid::new_v4().simple()
        ));
        fs::write(&temp, data).await?;
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(StorageError::Io(e));
        }

        tracing::debug!("Saved metadata record {}", item.identifier());
        Ok(())
    }

    async fn load(&self, id: &FileMetadataIdentifier) -> Result<Option<FileMetadata>> {
        let path = self.record_path(id)?;
        Self::read_record(&path).await
    }

    async fn delete(&self, id: &FileMetadataIdentifier) -> Result<()> {
        let path = self.record_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn query(&self, spec: &QuerySpec) -> Result<Vec<FileMetadata>> {
        let mut results = Vec::new();

        for dir in self.bucket_dirs(spec).await? {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(record) = Self::read_record(&path).await? {
                    if spec.matches(&record) {
                        results.push(record);
                    }
                }
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::sample;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_save_load_delete() {
        let dir = tempdir().unwrap();
        let store = JsonFileMetadataStore::new(dir.path()).await.unwrap();
        let item = sample("bucket", "file-1");
        let id = item.identifier();

        store.save(item.clone()).await.unwrap();
        assert!(dir.path().join("bucket").join("file-1.json").exists());
        assert_eq!(store.load(&id).await.unwrap(), Some(item));

        store.delete(&id).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), None);
        store.delete(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let item = sample("bucket", "file-1");

        {
            let store = JsonFileMetadataStore::new(dir.path()).await.unwrap();
            store.save(item.clone()).await.unwrap();
        }

        let reopened = JsonFileMetadataStore::new(dir.path()).await.unwrap();
        assert_eq!(reopened.load(&item.identifier()).await.unwrap(), Some(item));
    }

    #[tokio::test]
    async fn test_query_by_bucket_and_field() {
        let dir = tempdir().unwrap();
        let store = JsonFileMetadataStore::new(dir.path()).await.unwrap();
        store.save(sample("a", "1")).await.unwrap();
        store.save(sample("a", "2")).await.unwrap();
        let mut other = sample("b", "3");
        other.file_name = "other.txt".to_string();
        store.save(other).await.unwrap();

        let in_a = store.query(&QuerySpec::new().with("bucket", "a")).await.unwrap();
        assert_eq!(in_a.len(), 2);

        let by_name = store
            .query(&QuerySpec::new().with("file_name", "other.txt"))
            .await
            .unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].file_id, "3");

        let missing = store.query(&QuerySpec::new().with("bucket", "none")).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_saves_of_one_record() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(JsonFileMetadataStore::new(dir.path()).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut item = sample("bucket", "same");
                item.file_name = format!("writer-{}.txt", i);
                store.save(item).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let record = store
            .load(&FileMetadataIdentifier::new("bucket", "same"))
            .await
            .unwrap()
            .unwrap();
        assert!(record.file_name.starts_with("writer-"));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("bucket"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("same.json")]);
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = tempdir().unwrap();
        let store = JsonFileMetadataStore::new(dir.path()).await.unwrap();
        let id = FileMetadataIdentifier::new("..", "passwd");
        assert!(matches!(store.load(&id).await, Err(StorageError::InvalidPath(_))));
    }
}
