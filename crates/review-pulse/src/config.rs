use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::email::SmtpConfig;
use crate::error::AppError;
use crate::report::DEFAULT_TITLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    /// Local keyword + embedding engine.
    Engine,
    /// Chunked calls to the chat backend.
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Fastembed,
    OpenAi,
}

/// Application configuration loaded explicitly from environment variables.
///
/// Only the review CSV path is required. Everything else has a default; email delivery
/// stays off unless both sender and password are set. The OpenAI-compatible client reads
/// its own settings through `OpenAiClientConfig::from_env`.
#[derive(Debug, Clone)]
pub struct Config {
    pub reviews_csv: PathBuf,
    pub classified_csv: PathBuf,
    pub report_html: PathBuf,
    /// JSON bucket catalog. `None` uses the built-in catalog.
    pub catalog_path: Option<PathBuf>,
    pub classifier: ClassifierKind,
    pub embedding_backend: EmbeddingBackend,
    pub embedding_model: String,
    pub llm_model: String,
    pub llm_fallback_model: Option<String>,
    pub lookback_weeks: u32,
    pub top_n: usize,
    pub chunk_size: usize,
    pub concurrency: usize,
    pub llm_min_interval: Duration,
    pub embed_timeout: Duration,
    pub report_title: String,
    /// Redis connection URL. `None` disables the snapshot cache.
    pub redis_url: Option<String>,
    pub email: Option<SmtpConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let reviews_csv = get("REVIEWS_CSV")
            .map(PathBuf::from)
            .ok_or_else(|| {
                AppError::Config("REVIEWS_CSV environment variable is required".to_string())
            })?;

        let classifier = match get("CLASSIFIER").as_deref() {
            None | Some("engine") => ClassifierKind::Engine,
            Some("remote") => ClassifierKind::Remote,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "CLASSIFIER must be 'engine' or 'remote', got '{other}'"
                )))
            }
        };

        let embedding_backend = match get("EMBEDDING_BACKEND").as_deref() {
            None | Some("fastembed") => EmbeddingBackend::Fastembed,
            Some("openai") => EmbeddingBackend::OpenAi,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "EMBEDDING_BACKEND must be 'fastembed' or 'openai', got '{other}'"
                )))
            }
        };

        let email = match (get("EMAIL_SENDER"), get("EMAIL_PASSWORD")) {
            (Some(sender), Some(password)) => {
                let receiver = get("EMAIL_RECEIVER").unwrap_or_else(|| {
                    warn!("EMAIL_RECEIVER not set, sending the report to the sender");
                    sender.clone()
                });
                Some(SmtpConfig {
                    receiver,
                    host: get("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
                    port: parse(get("SMTP_PORT"), "SMTP_PORT", 465)?,
                    sender,
                    password,
                })
            }
            _ => None,
        };

        Ok(Self {
            reviews_csv,
            classified_csv: get("CLASSIFIED_CSV")
                .unwrap_or_else(|| "weekly_classified.csv".to_string())
                .into(),
            report_html: get("REPORT_HTML")
                .unwrap_or_else(|| "pulse_report.html".to_string())
                .into(),
            catalog_path: get("BUCKET_CATALOG_PATH").map(PathBuf::from),
            classifier,
            embedding_backend,
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            llm_model: get("LLM_MODEL").unwrap_or_else(|| "gemini-2.5-flash-lite".to_string()),
            llm_fallback_model: Some(
                get("LLM_FALLBACK_MODEL")
                    .unwrap_or_else(|| "gemini-2.0-flash-lite-preview".to_string()),
            ),
            lookback_weeks: parse(get("LOOKBACK_WEEKS"), "LOOKBACK_WEEKS", 1)?,
            top_n: parse(get("TOP_N"), "TOP_N", 3)?,
            chunk_size: positive(get("CLASSIFY_CHUNK_SIZE"), "CLASSIFY_CHUNK_SIZE", 10)?,
            concurrency: positive(get("CLASSIFY_CONCURRENCY"), "CLASSIFY_CONCURRENCY", 4)?,
            llm_min_interval: Duration::from_millis(parse(
                get("LLM_MIN_INTERVAL_MS"),
                "LLM_MIN_INTERVAL_MS",
                2000,
            )?),
            embed_timeout: Duration::from_secs(parse(
                get("EMBED_TIMEOUT_SECS"),
                "EMBED_TIMEOUT_SECS",
                30,
            )?),
            report_title: get("REPORT_TITLE").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            redis_url: get("REDIS_URL"),
            email,
        })
    }
}

fn parse<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, AppError> {
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} has invalid value '{v}'"))),
    }
}

fn positive(value: Option<String>, key: &str, default: usize) -> Result<usize, AppError> {
    let value = parse(value, key, default)?;
    if value == 0 {
        return Err(AppError::Config(format!("{key} must be at least 1")));
    }
    Ok(value)
}
