use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::ingestion::{ItemSource, SourceError};
use crate::pipeline::Item;

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    group: usize,
    #[serde(default)]
    url: Option<String>,
}

/// Reads items from a local JSON array of `{"group": n, "url": "..."}`.
#[derive(Debug, Clone)]
pub struct ManifestItemSource {
    path: PathBuf,
}

impl ManifestItemSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn parse(bytes: &[u8]) -> Result<Vec<Item>, SourceError> {
        let entries: Vec<ManifestEntry> = serde_json::from_slice(bytes)?;
        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let locator = entry.url.filter(|url| !url.trim().is_empty());
                Item::new(index, entry.group, locator)
            })
            .collect())
    }
}

#[async_trait]
impl ItemSource for ManifestItemSource {
    async fn items(&self) -> Result<Vec<Item>, SourceError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        Self::parse(&bytes)
    }
}
