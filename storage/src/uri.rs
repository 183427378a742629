use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::form_urlencoded;

use crate::{Result, StorageError};

/// Scheme of every URI handed out by the storage system. Part of the
/// persisted contract: changing it requires migrating stored records.
pub const FILE_SCHEME: &str = "o3fs";

/// `o3fs://<storage_type>/<bucket>/<file_id>[/<version>][?k=v&k=v...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStorageUri {
    pub storage_type: String,
    pub bucket: String,
    pub file_id: String,
    pub version: Option<String>,
    /// Query parameters, decoded as a multi-map.
    pub custom_params: BTreeMap<String, Vec<String>>,
}

impl FileStorageUri {
    pub fn new(
        storage_type: impl Into<String>,
        bucket: impl Into<String>,
        file_id: impl Into<String>,
    ) -> Self {
        Self {
            storage_type: storage_type.into(),
            bucket: bucket.into(),
            file_id: file_id.into(),
            version: None,
            custom_params: BTreeMap::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_params
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix(FILE_SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| StorageError::InvalidUri(format!("invalid scheme in {}", uri)))?;

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };

        let (storage_type, path) = location.split_once('/').unwrap_or((location, ""));
        if storage_type.is_empty() {
            return Err(StorageError::InvalidUri(format!("missing storage type in {}", uri)));
        }

        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        if parts.len() < 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(StorageError::InvalidUri(format!(
                "expected <bucket>/<file_id> in {}",
                uri
            )));
        }

        let mut custom_params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if let Some(query) = query {
            for (key, value) in form_urlencoded::parse(query.as_bytes()) {
                custom_params
                    .entry(key.into_owned())
                    .or_default()
                    .push(value.into_owned());
            }
        }

        Ok(Self {
            storage_type: storage_type.to_string(),
            bucket: parts[0].to_string(),
            file_id: parts[1].to_string(),
            version: parts.get(2).filter(|v| !v.is_empty()).map(|v| v.to_string()),
            custom_params,
        })
    }
}

impl fmt::Display for FileStorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}/{}/{}",
            FILE_SCHEME, self.storage_type, self.bucket, self.file_id
        )?;
        if let Some(version) = &self.version {
            write!(f, "/{}", version)?;
        }
        if !self.custom_params.is_empty() {
            let mut query = form_urlencoded::Serializer::new(String::new());
            for (key, values) in &self.custom_params {
                for value in values {
                    query.append_pair(key, value);
                }
            }
            write!(f, "?{}", query.finish())?;
        }
        Ok(())
    }
}

impl FromStr for FileStorageUri {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// True for inputs the storage system should open as plain filesystem paths:
/// anything without a scheme, or with the `file` scheme.
pub fn is_local_file(uri: &str) -> bool {
    match url::Url::parse(uri) {
        Ok(parsed) => parsed.scheme() == "file",
        Err(url::ParseError::RelativeUrlWithoutBase) => true,
        Err(_) => false,
    }
}
