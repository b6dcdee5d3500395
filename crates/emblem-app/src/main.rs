use std::{process, sync::Arc};

use reqwest::Client;
use tracing::info;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt};

use emblem_app::cli::Cli;
use emblem_app::config::{self, AppConfig};
use emblem_app::error::AppError;
use emblem_app::ingestion::{self, ItemSource, ManifestItemSource, SlidesItemSource};
use emblem_app::paths::OutputPaths;
use emblem_app::services::{
    CheckpointStore, FsObjectStore, GcsObjectStore, GeminiClassifier, HttpFetcher, ObjectStore,
    Orchestrator, PipelineDeps, PipelineOptions,
};

const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(determine_log_level(cli.verbose));

    if let Err(err) = run(cli).await {
        tracing::error!(error = %err, "run aborted");
        eprintln!("{err}");
        process::exit(1);
    }
}

fn determine_log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn init_tracing(level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let subscriber = fmt().with_env_filter(filter).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    if cli.dry_status {
        let state = CheckpointStore::new(OutputPaths::unchecked(&cli.output))
            .state()
            .await?;
        println!("{state}");
        return Ok(());
    }

    let mut cfg = config::load()?;
    if let Some(model) = cli.model {
        cfg.classifier.model = model;
    }
    if let Some(bucket) = cli.bucket {
        cfg.storage.bucket = Some(bucket);
    }

    let paths = OutputPaths::new(&cli.output)?;
    let http = Client::builder()
        .timeout(cfg.pipeline.fetch_timeout())
        .build()
        .map_err(AppError::Http)?;

    let classifier = Arc::new(GeminiClassifier::from_env(&cfg.classifier)?);
    let fetcher = Arc::new(HttpFetcher::new(cfg.pipeline.fetch_timeout())?);
    let source = build_source(&cli.source, &cfg, http.clone())?;
    let (sink, checkpoints) = build_storage(&cfg, &cli.output, paths, http)?;

    let items = source.items().await?;
    info!(source = %cli.source, items = items.len(), "listed items");

    let options = PipelineOptions::builder()
        .courtesy_delay(cfg.pipeline.courtesy_delay())
        .retry(cfg.pipeline.retry_policy())
        .build();
    let deps = PipelineDeps {
        fetcher,
        classifier,
        sink,
        checkpoints,
    };
    let report = Orchestrator::new(deps, options)
        .run_with_report(&items)
        .await?;

    println!("{}", report.catalog_location);
    Ok(())
}

fn build_source(
    source: &str,
    cfg: &AppConfig,
    http: Client,
) -> Result<Box<dyn ItemSource>, AppError> {
    if ingestion::is_manifest_path(source) {
        return Ok(Box::new(ManifestItemSource::new(source)));
    }
    Ok(Box::new(SlidesItemSource::from_env(
        http,
        &cfg.source.slides_api_base,
        source,
    )?))
}

fn build_storage(
    cfg: &AppConfig,
    output: &str,
    paths: OutputPaths,
    http: Client,
) -> Result<(Arc<dyn ObjectStore>, CheckpointStore), AppError> {
    let Some(bucket) = cfg.storage.bucket.as_deref() else {
        let sink = FsObjectStore::builder().root(paths.base_dir()).build();
        return Ok((Arc::new(sink), CheckpointStore::new(paths)));
    };

    let token = std::env::var(ACCESS_TOKEN_ENV)
        .map_err(|_| AppError::Config(format!("{ACCESS_TOKEN_ENV} is required to use a bucket")))?;
    let bucket_root = GcsObjectStore::new(
        http,
        &cfg.storage.gcs_api_base,
        &cfg.storage.public_base_url,
        bucket,
        token,
    )?;
    info!(bucket, prefix = output, "storing assets in Cloud Storage");

    let sink: Arc<dyn ObjectStore> = Arc::new(bucket_root.with_prefix(output)?);
    let checkpoints = CheckpointStore::new(paths).with_mirror(Arc::new(bucket_root));
    Ok((sink, checkpoints))
}
