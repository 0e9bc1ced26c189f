/// Test doubles for the embedding and chat backends.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pulse_common::embedding::EmbeddingProvider;
use pulse_common::error::CommonError;
use pulse_common::openai::{ChatBackend, OpenAiClientError, StatusCode};

use crate::model::Review;

/// A review dated 2024-01-01 with the given content.
pub fn review(id: &str, content: &str) -> Review {
    Review {
        id: id.to_string(),
        content: Some(content.to_string()),
        date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        rating: 3,
        thumbs_up: 0,
        app_version: None,
    }
}

/// Returns fixed vectors per text, or a default vector, or fails.
#[derive(Default)]
pub struct FakeEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    default: Option<Vec<f32>>,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn with_default(mut self, vector: Vec<f32>) -> Self {
        self.default = Some(vector);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `embed`/`embed_batch` invocations.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, text: &str) -> Result<Vec<f32>, CommonError> {
        if self.fail {
            return Err(CommonError::Embedding("backend unavailable".to_string()));
        }
        self.vectors
            .get(text)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| CommonError::Embedding(format!("no vector for {text:?}")))
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn model_id(&self) -> &str {
        "fake"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CommonError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.lookup(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        texts.iter().map(|t| self.lookup(t)).collect()
    }
}

/// Scripted reply for `FakeChat`.
pub enum Reply {
    Text(String),
    ModelNotFound,
    ServerError,
}

/// Pops scripted replies in order and records which model each call used.
#[derive(Default)]
pub struct FakeChat {
    replies: Mutex<VecDeque<Reply>>,
    models: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeChat {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn models(&self) -> Vec<String> {
        self.models.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for FakeChat {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, OpenAiClientError> {
        self.models.lock().unwrap().push(model.to_string());
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::ModelNotFound) => Err(OpenAiClientError::Upstream {
                status: StatusCode::NOT_FOUND,
                message: format!("model {model} not found"),
            }),
            Some(Reply::ServerError) | None => Err(OpenAiClientError::UpstreamBody {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "boom".to_string(),
            }),
        }
    }
}
