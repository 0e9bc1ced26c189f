mod aggregate;
mod catalog;
mod classify;
mod config;
mod email;
mod engine;
mod error;
mod export;
mod llm;
mod model;
mod narrate;
mod pipeline;
mod rate_limit;
mod remote;
mod report;
mod snapshot;
mod source;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use chrono::Utc;
use pulse_common::embedding::{EmbeddingProvider, Embedder, OpenAiEmbedder};
use pulse_common::openai::{OpenAiClient, OpenAiClientConfig};
use pulse_common::redis::RedisCache;
use tracing::info;
use tracing_subscriber::EnvFilter;

use catalog::BucketCatalog;
use config::{ClassifierKind, Config, EmbeddingBackend};
use llm::ModelChain;
use pipeline::{ClassifierSetup, Pipeline};
use rate_limit::RateLimiter;
use remote::RemoteStrategy;
use snapshot::SnapshotCache;
use source::CsvReviewSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG may come from .env
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting review pulse");

    // 1. Configuration and bucket catalog (misconfiguration is fatal here)
    let config = Config::from_env()?;
    info!(
        reviews_csv = %config.reviews_csv.display(),
        classifier = ?config.classifier,
        lookback_weeks = config.lookback_weeks,
        redis = config.redis_url.is_some(),
        email = config.email.is_some(),
        "configuration loaded"
    );

    let catalog = match &config.catalog_path {
        Some(path) => BucketCatalog::load(path)?,
        None => BucketCatalog::builtin(),
    };
    info!(
        buckets = catalog.len(),
        sentiment = %catalog.sentiment().name,
        "bucket catalog ready"
    );
    let catalog = Arc::new(catalog);

    // 2. Chat backend, shared by remote classification and narrative generation
    let client = Arc::new(OpenAiClient::new(OpenAiClientConfig::from_env())?);
    info!(base_url = %client.config().base_url, "chat backend configured");

    // 3. Classifier
    let classifier = match config.classifier {
        ClassifierKind::Engine => {
            let provider: Arc<dyn EmbeddingProvider> = match config.embedding_backend {
                EmbeddingBackend::Fastembed => {
                    info!("initializing embedding model (may download on first run)");
                    Arc::new(Embedder::new().await?)
                }
                EmbeddingBackend::OpenAi => Arc::new(OpenAiEmbedder::new(
                    Arc::clone(&client),
                    config.embedding_model.clone(),
                )),
            };
            info!(model = provider.model_id(), "embedding provider ready");

            let redis = RedisCache::new(config.redis_url.as_deref());
            if redis.is_available().await {
                info!("redis connected");
            } else {
                info!("redis unavailable, running without snapshot cache");
            }
            ClassifierSetup::Engine {
                provider,
                cache: SnapshotCache::new(redis),
                concurrency: config.concurrency,
                timeout: config.embed_timeout,
            }
        }
        ClassifierKind::Remote => ClassifierSetup::Remote(Arc::new(RemoteStrategy::new(
            client.clone(),
            ModelChain::new(config.llm_model.clone(), config.llm_fallback_model.clone()),
            Arc::clone(&catalog),
            config.chunk_size,
            RateLimiter::new(config.llm_min_interval),
        ))),
    };

    // 4. Run
    let pipeline = Pipeline::new(&config, catalog, classifier, client);
    let source = CsvReviewSource::new(&config.reviews_csv);
    let outcome = pipeline.run(&source, Utc::now()).await?;

    info!(
        kept = outcome.ingest.kept,
        classified = outcome.classification.as_ref().map_or(0, |s| s.total),
        provider_failures = outcome.classification.as_ref().map_or(0, |s| s.provider_failures),
        themes = outcome.report.as_ref().map_or(0, |r| r.themes.len()),
        emailed = outcome.emailed,
        "review pulse complete"
    );
    Ok(())
}
