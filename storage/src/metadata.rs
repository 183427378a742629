use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tokio::sync::RwLock;

use crate::Result;

/// Primary key of a blob: the same `file_id` in two buckets names two
/// unrelated blobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileMetadataIdentifier {
    pub bucket: String,
    pub file_id: String,
}

impl FileMetadataIdentifier {
    pub fn new(bucket: impl Into<String>, file_id: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            file_id: file_id.into(),
        }
    }
}

impl fmt::Display for FileMetadataIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.file_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_id: String,
    pub bucket: String,
    /// Display name given at upload.
    pub file_name: String,
    /// Body length measured after the save stream was drained; `-1` for
    /// records synthesized for plain filesystem paths.
    pub file_size: i64,
    pub storage_type: String,
    /// Backend-interpreted locator of the body.
    pub storage_path: String,
    pub uri: String,
    #[serde(default)]
    pub custom_metadata: HashMap<String, Value>,
    /// Hex MD5 of the body, or `"-1"` when the writer had hashing disabled.
    pub file_hash: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub sys_code: Option<String>,
}

impl FileMetadata {
    pub fn identifier(&self) -> FileMetadataIdentifier {
        FileMetadataIdentifier::new(self.bucket.clone(), self.file_id.clone())
    }

    /// Value of a queryable field. Names that are not record fields are
    /// looked up in `custom_metadata`.
    pub fn field_value(&self, field: &str) -> Option<Value> {
        match field {
            "file_id" => Some(Value::from(self.file_id.as_str())),
            "bucket" => Some(Value::from(self.bucket.as_str())),
            "file_name" => Some(Value::from(self.file_name.as_str())),
            "file_size" => Some(Value::from(self.file_size)),
            "storage_type" => Some(Value::from(self.storage_type.as_str())),
            "storage_path" => Some(Value::from(self.storage_path.as_str())),
            "uri" => Some(Value::from(self.uri.as_str())),
            "file_hash" => Some(Value::from(self.file_hash.as_str())),
            "user_name" => self.user_name.as_deref().map(Value::from),
            "sys_code" => self.sys_code.as_deref().map(Value::from),
            other => self.custom_metadata.get(other).cloned(),
        }
    }
}

/// Conjunction of field equalities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    conditions: BTreeMap<String, Value>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.conditions.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, item: &FileMetadata) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| item.field_value(field).as_ref() == Some(expected))
    }
}

impl From<HashMap<String, Value>> for QuerySpec {
    fn from(filters: HashMap<String, Value>) -> Self {
        Self {
            conditions: filters.into_iter().collect(),
        }
    }
}

/// Persistence for blob records. Durability and atomicity are the
/// implementation's concern; the storage system only relies on upsert
/// semantics for `save`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn save(&self, item: FileMetadata) -> Result<()>;

    async fn load(&self, id: &FileMetadataIdentifier) -> Result<Option<FileMetadata>>;

    /// Removing an absent record is not an error.
    async fn delete(&self, id: &FileMetadataIdentifier) -> Result<()>;

    async fn query(&self, spec: &QuerySpec) -> Result<Vec<FileMetadata>>;
}

#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<HashMap<FileMetadataIdentifier, FileMetadata>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn save(&self, item: FileMetadata) -> Result<()> {
        self.records.write().await.insert(item.identifier(), item);
        Ok(())
    }

    async fn load(&self, id: &FileMetadataIdentifier) -> Result<Option<FileMetadata>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &FileMetadataIdentifier) -> Result<()> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn query(&self, spec: &QuerySpec) -> Result<Vec<FileMetadata>> {
        let records = self.records.read().await;
        Ok(records.values().filter(|m| spec.matches(m)).cloned().collect())
    }
}
