//! Configuration loading and XDG path helpers.
//!
//! Layers, lowest precedence first: built-in defaults, the XDG settings file,
//! `config/settings` in the working directory, the file named by
//! `EMBLEM_CONFIG_FILE`, then `EMBLEM__SECTION__KEY` environment variables.

use std::time::Duration;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::constants::DEFAULT_CLASSIFIER_MODEL;
use crate::services::object_store::{DEFAULT_GCS_API_BASE, DEFAULT_GCS_PUBLIC_BASE};
use crate::services::retry::RetryPolicy;

const CONFIG_FILE: &str = "config/settings";
const CONFIG_FILE_ENV: &str = "EMBLEM_CONFIG_FILE";
const ENV_PREFIX: &str = "EMBLEM";
/// Bucket variable understood by earlier releases of the tool.
const LEGACY_BUCKET_ENV: &str = "GCS_UPLOAD_BUCKET";

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_SLIDES_API_BASE: &str = "https://slides.googleapis.com";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("unable to resolve project directories")]
    MissingProjectDirs,
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub classifier: ClassifierConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub source: SourceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    pub model: String,
    pub api_base: String,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub courtesy_delay_ms: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub jitter_ms: u64,
    pub fetch_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn courtesy_delay(&self) -> Duration {
        Duration::from_millis(self.courtesy_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_retries)
            .base_delay(Duration::from_millis(self.base_delay_ms))
            .max_jitter(Duration::from_millis(self.jitter_ms))
            .build()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Cloud Storage bucket; assets stay in the output directory when unset.
    #[serde(default)]
    pub bucket: Option<String>,
    pub gcs_api_base: String,
    pub public_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub slides_api_base: String,
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let mut builder = Config::builder()
        .set_default("classifier.model", DEFAULT_CLASSIFIER_MODEL)?
        .set_default("classifier.api_base", DEFAULT_GEMINI_API_BASE)?
        .set_default("classifier.requests_per_minute", 60)?
        .set_default("classifier.timeout_secs", 60)?
        .set_default("pipeline.courtesy_delay_ms", 500)?
        .set_default("pipeline.max_retries", 2)?
        .set_default("pipeline.base_delay_ms", 2000)?
        .set_default("pipeline.jitter_ms", 1000)?
        .set_default("pipeline.fetch_timeout_secs", 10)?
        .set_default("storage.gcs_api_base", DEFAULT_GCS_API_BASE)?
        .set_default("storage.public_base_url", DEFAULT_GCS_PUBLIC_BASE)?
        .set_default("source.slides_api_base", DEFAULT_SLIDES_API_BASE)?;

    if let Some(bucket) = std::env::var(LEGACY_BUCKET_ENV)
        .ok()
        .filter(|bucket| !bucket.trim().is_empty())
    {
        builder = builder.set_default("storage.bucket", bucket)?;
    }

    if let Ok(dirs) = project_dirs() {
        let xdg_settings = dirs.config_dir().join("settings");
        builder = builder.add_source(File::from(xdg_settings).required(false));
    }
    builder = builder.add_source(File::with_name(CONFIG_FILE).required(false));
    if let Some(path) = std::env::var_os(CONFIG_FILE_ENV) {
        builder = builder.add_source(File::from(std::path::PathBuf::from(path)).required(false));
    }

    let cfg = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize()?;
    Ok(cfg)
}

pub fn project_dirs() -> Result<ProjectDirs, AppConfigError> {
    ProjectDirs::from("dev", "emblem", "emblem").ok_or(AppConfigError::MissingProjectDirs)
}
