//! Application-level error type for the `emblem` binary.

use thiserror::Error;

use crate::config;
use crate::ingestion::SourceError;
use crate::paths::PathError;
use crate::services::{
    CheckpointError, ClassifierInitError, FetchError, PipelineError, StoreError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] config::AppConfigError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Paths(#[from] PathError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Classifier(#[from] ClassifierInitError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("failed to build HTTP client: {0}")]
    Http(#[source] reqwest::Error),
}
