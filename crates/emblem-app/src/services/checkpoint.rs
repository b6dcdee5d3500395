//! Resumable run state: the resume cursor and the working catalog.
//!
//! Both live in the local output directory and are replaced atomically. The
//! catalog is always written before the cursor, so a crash between the two
//! leaves a cursor that lags the catalog and at most one item is redone.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::constants::{CATALOG_CONTENT_TYPE, CATALOG_FILE, SENTINEL_KEY};
use crate::paths::OutputPaths;
use crate::pipeline::Catalog;
use crate::services::object_store::{DurableWrite, ObjectStore, StoreError, write_atomic};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize catalog: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid resume cursor `{0}`")]
    InvalidCursor(String),
    #[error("failed to publish catalog: {0}")]
    Publish(#[from] StoreError),
}

/// Restored run state. `cursor == None` means nothing was checkpointed yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub cursor: Option<usize>,
    pub catalog: Catalog,
}

impl Checkpoint {
    pub fn fresh() -> Self {
        Self::default()
    }
}

/// Lifecycle of an output location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    Fresh,
    Running { cursor: usize, records: usize },
    Complete { records: usize },
}

impl fmt::Display for CheckpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => f.write_str("FRESH"),
            Self::Running { cursor, records } => {
                write!(f, "RUNNING (cursor {cursor}, {records} records)")
            }
            Self::Complete { records } => write!(f, "COMPLETE ({records} records)"),
        }
    }
}

#[derive(Clone)]
pub struct CheckpointStore {
    paths: OutputPaths,
    mirror: Option<Arc<dyn ObjectStore>>,
    durability: DurableWrite,
}

impl fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("base_dir", &self.paths.base_dir())
            .field("mirrored", &self.mirror.is_some())
            .field("durability", &self.durability)
            .finish()
    }
}

impl CheckpointStore {
    pub fn new(paths: OutputPaths) -> Self {
        Self {
            paths,
            mirror: None,
            durability: DurableWrite::FileAndDir,
        }
    }

    /// Publish the final catalog to `mirror` as well, and use it to recover
    /// the working catalog when the local copy disappeared mid-run.
    pub fn with_mirror(mut self, mirror: Arc<dyn ObjectStore>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_durability(mut self, durability: DurableWrite) -> Self {
        self.durability = durability;
        self
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// Restore the last checkpoint. Never fails: anything unreadable is
    /// logged and the run starts from scratch.
    pub async fn load(&self) -> Checkpoint {
        let cursor = match self.read_cursor().await {
            Ok(Some(cursor)) => cursor,
            Ok(None) => return Checkpoint::fresh(),
            Err(err) => {
                warn!(error = %err, "ignoring unreadable resume cursor; starting fresh");
                return Checkpoint::fresh();
            }
        };

        match self.load_catalog().await {
            Ok(Some(catalog)) => {
                info!(
                    cursor,
                    records = catalog.len(),
                    "resuming from checkpoint"
                );
                Checkpoint {
                    cursor: Some(cursor),
                    catalog,
                }
            }
            Ok(None) => {
                warn!(cursor, "resume cursor has no catalog next to it; starting fresh");
                Checkpoint::fresh()
            }
            Err(err) => {
                warn!(error = %err, "ignoring unreadable catalog; starting fresh");
                Checkpoint::fresh()
            }
        }
    }

    /// Persist the catalog and then advance the cursor to `index`.
    pub async fn save(&self, index: usize, catalog: &Catalog) -> Result<(), CheckpointError> {
        self.write_catalog(catalog).await?;
        let cursor_path = self.paths.cursor_path();
        write_atomic(&cursor_path, index.to_string().as_bytes(), self.durability)
            .await
            .map_err(|source| CheckpointError::Write {
                path: cursor_path,
                source,
            })?;
        debug!(index, records = catalog.len(), "checkpoint saved");
        Ok(())
    }

    /// Write the terminal catalog, publish it when mirrored, then drop the
    /// cursor. Returns where the final catalog can be found.
    ///
    /// The cursor is only removed once everything else succeeded, so an
    /// error here leaves the run resumable.
    pub async fn finalize(&self, catalog: &Catalog) -> Result<String, CheckpointError> {
        let local = self.write_catalog(catalog).await?;
        let mut location = local.to_string_lossy().into_owned();

        if let Some(mirror) = &self.mirror {
            let payload = Bytes::from(catalog.to_json_pretty()?);
            location = mirror
                .put(CATALOG_FILE, payload, CATALOG_CONTENT_TYPE)
                .await?;
            info!(location = %location, "catalog published");
        }

        let cursor_path = self.paths.cursor_path();
        match fs::remove_file(&cursor_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(CheckpointError::Remove {
                    path: cursor_path,
                    source,
                });
            }
        }
        Ok(location)
    }

    /// Inspect the output location without touching any remote store.
    pub async fn state(&self) -> Result<CheckpointState, CheckpointError> {
        let records = match read_optional(&self.paths.catalog_path()).await? {
            Some(bytes) => Catalog::from_json_slice(&bytes)?.len(),
            None => 0,
        };
        match self.read_cursor().await? {
            Some(cursor) => Ok(CheckpointState::Running { cursor, records }),
            None if self.paths.catalog_path().exists() => {
                Ok(CheckpointState::Complete { records })
            }
            None => Ok(CheckpointState::Fresh),
        }
    }

    async fn read_cursor(&self) -> Result<Option<usize>, CheckpointError> {
        let Some(raw) = read_optional(&self.paths.cursor_path()).await? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&raw);
        let trimmed = text.trim();
        trimmed
            .parse::<usize>()
            .map(Some)
            .map_err(|_| CheckpointError::InvalidCursor(trimmed.to_string()))
    }

    async fn load_catalog(&self) -> Result<Option<Catalog>, CheckpointError> {
        if let Some(bytes) = read_optional(&self.paths.catalog_path()).await? {
            return Ok(Some(Catalog::from_json_slice(&bytes)?));
        }
        let Some(mirror) = &self.mirror else {
            return Ok(None);
        };
        let Some(bytes) = mirror.get(CATALOG_FILE).await? else {
            return Ok(None);
        };
        let catalog = Catalog::from_json_slice(&bytes)?;
        // A mirrored catalog carrying the sentinel was finalized, possibly by
        // another run sharing the bucket, and is not a working catalog.
        if catalog.contains_key(SENTINEL_KEY) {
            warn!(
                records = catalog.len(),
                "mirrored catalog is already finalized; not resuming from it"
            );
            return Ok(None);
        }
        info!(
            records = catalog.len(),
            "local catalog missing; recovered working catalog from mirror"
        );
        Ok(Some(catalog))
    }

    async fn write_catalog(&self, catalog: &Catalog) -> Result<PathBuf, CheckpointError> {
        let path = self.paths.catalog_path();
        let payload = catalog.to_json_pretty()?;
        write_atomic(&path, &payload, self.durability)
            .await
            .map_err(|source| CheckpointError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, CheckpointError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(CheckpointError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}
