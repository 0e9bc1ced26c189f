/// Model fallback for chat calls.
///
/// A small explicit state machine: the primary model is tried first; if the backend
/// rejects the model identifier itself, the secondary model is tried once; any other
/// failure (or a second failure) exhausts the chain and the caller applies its
/// documented default.
use std::future::Future;

use tracing::warn;

use pulse_common::openai::OpenAiClientError;

#[derive(Debug, Clone)]
pub struct ModelChain {
    primary: String,
    secondary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage<'a> {
    Primary,
    Secondary(&'a str),
}

#[derive(Debug)]
pub enum ChainOutcome<T> {
    Answered { model: String, value: T },
    Exhausted { error: OpenAiClientError },
}

impl ModelChain {
    pub fn new(primary: impl Into<String>, secondary: Option<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub async fn run<T, F, Fut>(&self, mut call: F) -> ChainOutcome<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, OpenAiClientError>>,
    {
        let mut stage = Stage::Primary;
        loop {
            let model = match stage {
                Stage::Primary => self.primary.as_str(),
                Stage::Secondary(model) => model,
            };

            let error = match call(model.to_string()).await {
                Ok(value) => {
                    return ChainOutcome::Answered {
                        model: model.to_string(),
                        value,
                    }
                }
                Err(e) => e,
            };

            stage = match (stage, self.secondary.as_deref()) {
                (Stage::Primary, Some(secondary)) if error.is_model_unavailable() => {
                    warn!(
                        primary = %self.primary,
                        secondary,
                        error = %error,
                        "model unavailable, retrying with fallback model"
                    );
                    Stage::Secondary(secondary)
                }
                _ => return ChainOutcome::Exhausted { error },
            };
        }
    }
}

/// Strip a surrounding markdown code fence (optionally tagged `json`) from model output.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let body = match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    body.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeChat, Reply};
    use pulse_common::openai::ChatBackend;

    async fn run(chain: &ModelChain, chat: &FakeChat) -> ChainOutcome<String> {
        chain
            .run(|model| async move { chat.complete(&model, "prompt").await })
            .await
    }

    #[tokio::test]
    async fn primary_success_stops_the_chain() {
        let chat = FakeChat::new(vec![Reply::Text("ok".into())]);
        let chain = ModelChain::new("p", Some("s".into()));
        match run(&chain, &chat).await {
            ChainOutcome::Answered { model, value } => {
                assert_eq!(model, "p");
                assert_eq!(value, "ok");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(chat.models(), vec!["p"]);
    }

    #[tokio::test]
    async fn unavailable_primary_moves_to_secondary() {
        let chat = FakeChat::new(vec![Reply::ModelNotFound, Reply::Text("ok".into())]);
        let chain = ModelChain::new("p", Some("s".into()));
        assert!(matches!(
            run(&chain, &chat).await,
            ChainOutcome::Answered { ref model, .. } if model == "s"
        ));
        assert_eq!(chat.models(), vec!["p", "s"]);
    }

    #[tokio::test]
    async fn secondary_is_tried_only_once() {
        let chat = FakeChat::new(vec![Reply::ModelNotFound, Reply::ModelNotFound]);
        let chain = ModelChain::new("p", Some("s".into()));
        assert!(matches!(run(&chain, &chat).await, ChainOutcome::Exhausted { .. }));
        assert_eq!(chat.models(), vec!["p", "s"]);
    }

    #[tokio::test]
    async fn other_failures_skip_the_secondary() {
        let chat = FakeChat::new(vec![Reply::ServerError]);
        let chain = ModelChain::new("p", Some("s".into()));
        assert!(matches!(run(&chain, &chat).await, ChainOutcome::Exhausted { .. }));
        assert_eq!(chat.models(), vec!["p"]);
    }

    #[tokio::test]
    async fn missing_secondary_exhausts_immediately() {
        let chat = FakeChat::new(vec![Reply::ModelNotFound]);
        let chain = ModelChain::new("p", Some("  ".into()));
        assert!(matches!(run(&chain, &chat).await, ChainOutcome::Exhausted { .. }));
        assert_eq!(chat.models(), vec!["p"]);
    }

    #[test]
    fn strips_code_fences() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  [2] "), "[2]");
        assert_eq!(strip_code_fence("```json\n[3]"), "[3]");
    }
}
