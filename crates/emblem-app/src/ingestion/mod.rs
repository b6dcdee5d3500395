//! Item sources: where the ordered list of assets comes from.

pub mod manifest;
pub mod slides;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::pipeline::Item;

pub use manifest::ManifestItemSource;
pub use slides::{SlidesItemSource, items_from_presentation};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("missing GOOGLE_OAUTH_ACCESS_TOKEN environment variable")]
    MissingAccessToken,
    #[error("invalid source endpoint `{0}`")]
    InvalidEndpoint(String),
    #[error("request for presentation `{id}` failed: {source}")]
    Request {
        id: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("presentation `{id}` could not be listed: HTTP {status}")]
    Status { id: String, status: u16 },
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed source document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Produces the full, stably ordered item sequence for one run.
///
/// Implementations must return the same order on every call for the same
/// input, since the resume cursor refers to positions in it.
#[async_trait]
pub trait ItemSource: Send + Sync {
    async fn items(&self) -> Result<Vec<Item>, SourceError>;
}

/// Whether `source` names a local manifest rather than a remote deck id.
pub fn is_manifest_path(source: &str) -> bool {
    let path = std::path::Path::new(source);
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) && path.is_file()
}
