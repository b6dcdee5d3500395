use std::path::{Path, PathBuf};

use bytes::Bytes;
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

// Named-object storage for catalog assets and published catalogs.
//
// `put` returns a location reference that stays valid after the process exits:
// a filesystem path for `FsObjectStore`, a public URL for `GcsObjectStore`.

/// Errors emitted by object storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid object name `{0}`")]
    InvalidName(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("request error during `{op}`: {source}")]
    Request {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP status {status} during `{op}`")]
    HttpStatus { op: &'static str, status: u16 },

    #[error("invalid store URL `{0}`")]
    InvalidUrl(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Validate an object name: non-empty, a single path segment, no traversal.
pub fn validate_object_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Trait abstracting over destination backends.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `name`, replacing any previous object, and return a
    /// stable reference to the stored object.
    async fn put(&self, name: &str, data: Bytes, content_type: &str) -> Result<String, StoreError>;

    /// Return the object's bytes, or `None` when it does not exist.
    async fn get(&self, name: &str) -> Result<Option<Bytes>, StoreError>;

    /// Delete the object if present. Returns Ok(true) if deleted, Ok(false) if
    /// it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, StoreError>;
}

/// Durability policy for filesystem writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurableWrite {
    /// No explicit fsync (fastest, least durable).
    None,
    /// Fsync the file only.
    FileOnly,
    /// Fsync file and parent directory (recommended for checkpoints).
    FileAndDir,
}

/// Write `bytes` to `path` through a temp file in the same directory and an
/// atomic rename, so readers see either the old or the new content.
pub(crate) async fn write_atomic(
    path: &Path,
    bytes: &[u8],
    durability: DurableWrite,
) -> Result<(), std::io::Error> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).await?;

    let temp_file = tempfile::NamedTempFile::new_in(&dir)?;
    let mut file = fs::File::from_std(temp_file.reopen()?);
    file.write_all(bytes).await?;
    file.flush().await?;
    if durability != DurableWrite::None {
        file.sync_all().await?;
    }
    drop(file);

    temp_file.persist(path).map_err(|err| err.error)?;

    if durability == DurableWrite::FileAndDir {
        fsync_dir(&dir).await;
    }
    Ok(())
}

async fn fsync_dir(dir_path: &Path) {
    // Directory fsync is best-effort; some platforms don't support it.
    match fs::File::open(dir_path).await {
        Ok(dir_file) => {
            if let Err(e) = dir_file.sync_all().await {
                tracing::warn!("directory fsync unsupported or failed: {}", e);
            }
        }
        Err(e) => {
            tracing::warn!("failed to open directory for fsync: {}", e);
        }
    }
}

/// Filesystem store writing objects directly under `root`.
#[derive(Debug, Clone, bon::Builder)]
pub struct FsObjectStore {
    #[builder(into)]
    root: PathBuf,
    #[builder(default = DurableWrite::FileOnly)]
    durability: DurableWrite,
}

impl FsObjectStore {
    fn object_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_object_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, name: &str, data: Bytes, _content_type: &str) -> Result<String, StoreError> {
        let path = self.object_path(name)?;
        write_atomic(&path, &data, self.durability)
            .await
            .map_err(|e| StoreError::Io(format!("write {}: {}", path.display(), e)))?;
        Ok(path.to_string_lossy().into_owned())
    }

    async fn get(&self, name: &str) -> Result<Option<Bytes>, StoreError> {
        let path = self.object_path(name)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(format!("read {}: {}", path.display(), e))),
        }
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.object_path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(format!("delete {}: {}", path.display(), e))),
        }
    }
}

pub const DEFAULT_GCS_API_BASE: &str = "https://storage.googleapis.com";
pub const DEFAULT_GCS_PUBLIC_BASE: &str = "https://storage.googleapis.com";

/// Google Cloud Storage bucket accessed through the JSON API.
///
/// Objects live under an optional prefix; location references are public
/// object URLs (`{public_base}/{bucket}/{prefix}/{name}`).
#[derive(Debug, Clone)]
pub struct GcsObjectStore {
    http: Client,
    api_base: Url,
    public_base: Url,
    bucket: String,
    prefix: Option<String>,
    access_token: String,
}

impl GcsObjectStore {
    pub fn new(
        http: Client,
        api_base: &str,
        public_base: &str,
        bucket: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            return Err(StoreError::InvalidName(bucket));
        }
        Ok(Self {
            http,
            api_base: parse_base(api_base)?,
            public_base: parse_base(public_base)?,
            bucket,
            prefix: None,
            access_token: access_token.into(),
        })
    }

    /// A view of the same bucket with objects placed under `prefix`.
    ///
    /// Empty and `.` segments are dropped so the uploaded object name and the
    /// public URL always agree; `..` is rejected.
    pub fn with_prefix(&self, prefix: impl AsRef<str>) -> Result<Self, StoreError> {
        let raw = prefix.as_ref();
        let mut segments = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => return Err(StoreError::InvalidName(raw.to_string())),
                segment => segments.push(segment),
            }
        }
        let mut scoped = self.clone();
        scoped.prefix = (!segments.is_empty()).then(|| segments.join("/"));
        Ok(scoped)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_name(&self, name: &str) -> Result<String, StoreError> {
        validate_object_name(name)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{prefix}/{name}"),
            None => name.to_string(),
        })
    }

    fn upload_url(&self, object: &str) -> Result<Url, StoreError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", self.bucket.as_str(), "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object);
        Ok(url)
    }

    fn object_url(&self, object: &str) -> Result<Url, StoreError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", self.bucket.as_str(), "o", object]);
        Ok(url)
    }

    fn public_url(&self, object: &str) -> Result<Url, StoreError> {
        let mut url = self.public_base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.public_base.to_string()))?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(object.split('/'));
        Ok(url)
    }
}

fn parse_base(raw: &str) -> Result<Url, StoreError> {
    Url::parse(raw).map_err(|_| StoreError::InvalidUrl(raw.to_string()))
}

#[async_trait::async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put(&self, name: &str, data: Bytes, content_type: &str) -> Result<String, StoreError> {
        let object = self.object_name(name)?;
        let response = self
            .http
            .post(self.upload_url(&object)?)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .map_err(|source| StoreError::Request { op: "upload", source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::HttpStatus {
                op: "upload",
                status: status.as_u16(),
            });
        }
        Ok(self.public_url(&object)?.to_string())
    }

    async fn get(&self, name: &str) -> Result<Option<Bytes>, StoreError> {
        let object = self.object_name(name)?;
        let mut url = self.object_url(&object)?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|source| StoreError::Request { op: "download", source })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .bytes()
                .await
                .map(Some)
                .map_err(|source| StoreError::Request { op: "download", source }),
            status => Err(StoreError::HttpStatus {
                op: "download",
                status: status.as_u16(),
            }),
        }
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let object = self.object_name(name)?;
        let response = self
            .http
            .delete(self.object_url(&object)?)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|source| StoreError::Request { op: "delete", source })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(StoreError::HttpStatus {
                op: "delete",
                status: status.as_u16(),
            }),
        }
    }
}
