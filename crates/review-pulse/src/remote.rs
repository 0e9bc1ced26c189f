/// Remote classification strategy.
///
/// Reviews are sent to a chat backend in fixed-size chunks, one call per chunk. The
/// backend answers with a JSON array of `{"review_id": <1-based>, "theme": <name>}`.
/// Themes are mapped onto catalog names; anything unrecognised becomes the sentiment
/// bucket. Items are read one at a time, so a malformed item only costs its own review.
/// Reviews with blank content are `Uncategorized` and never sent. A failed chunk is
/// labelled entirely with the sentiment bucket and does not touch labels already
/// produced for earlier chunks.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use pulse_common::openai::ChatBackend;

use crate::catalog::BucketCatalog;
use crate::classify::ClassificationStrategy;
use crate::llm::{strip_code_fence, ChainOutcome, ModelChain};
use crate::model::{Assignment, AssignmentMethod, Review, UNCATEGORIZED};
use crate::rate_limit::RateLimiter;

pub struct RemoteStrategy {
    backend: Arc<dyn ChatBackend>,
    models: ModelChain,
    catalog: Arc<BucketCatalog>,
    chunk_size: usize,
    limiter: RateLimiter,
}

impl RemoteStrategy {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        models: ModelChain,
        catalog: Arc<BucketCatalog>,
        chunk_size: usize,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            backend,
            models,
            catalog,
            chunk_size: chunk_size.max(1),
            limiter,
        }
    }

    fn prompt(&self, chunk: &[&Review]) -> String {
        let themes: Vec<&str> = self.catalog.buckets().iter().map(|b| b.name.as_str()).collect();
        let listing: Vec<String> = chunk
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let text = r.content.as_deref().unwrap_or("").replace('"', "'");
                format!("{}. \"{}\"", i + 1, text.trim())
            })
            .collect();
        format!(
            "You are a review analyst. Classify each review into ONE category from: {}\n\n\
Reviews to classify:\n{}\n\n\
Return a JSON array where each item has \"review_id\" (1-based) and \"theme\" (the category).\n\
Example: {{\"review_id\": 1, \"theme\": \"{}\"}}\n\n\
Return ONLY a valid JSON array, no other text.",
            themes.join(", "),
            listing.join("\n"),
            themes.first().copied().unwrap_or_default()
        )
    }

    /// `chunk` holds only reviews with content.
    async fn classify_chunk(&self, chunk: &[&Review]) -> Vec<Assignment> {
        let default = || {
            Assignment::new(
                self.catalog.sentiment().name.clone(),
                AssignmentMethod::ProviderFailure,
            )
        };

        self.limiter.acquire().await;
        let prompt = self.prompt(chunk);
        let backend = &*self.backend;
        let prompt = prompt.as_str();
        let outcome = self
            .models
            .run(|model| async move { backend.complete(&model, prompt).await })
            .await;

        let text = match outcome {
            ChainOutcome::Answered { model, value } => {
                info!(model = %model, reviews = chunk.len(), "remote classification answered");
                value
            }
            ChainOutcome::Exhausted { error } => {
                warn!(error = %error, reviews = chunk.len(), "remote classification failed, applying default bucket");
                return vec![default(); chunk.len()];
            }
        };

        let items: Vec<Value> = match serde_json::from_str(strip_code_fence(&text)) {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "remote classification returned malformed JSON, applying default bucket");
                return vec![default(); chunk.len()];
            }
        };

        let mut slots: Vec<Option<Assignment>> = vec![None; chunk.len()];
        for item in &items {
            let index = match review_index(item) {
                Some(i) if i < slots.len() => i,
                _ => {
                    warn!(item = %item, "ignoring remote label without a usable review_id");
                    continue;
                }
            };
            if slots[index].is_some() {
                continue;
            }
            let bucket = item
                .get("theme")
                .and_then(Value::as_str)
                .and_then(|t| self.catalog.resolve_label(t))
                .unwrap_or(self.catalog.sentiment().name.as_str());
            slots[index] = Some(Assignment::new(bucket, AssignmentMethod::Remote));
        }

        let missing = slots.iter().filter(|s| s.is_none()).count();
        if missing > 0 {
            warn!(missing, "remote classification omitted reviews, applying default bucket");
        }
        slots
            .into_iter()
            .map(|s| s.unwrap_or_else(&default))
            .collect()
    }
}

#[async_trait]
impl ClassificationStrategy for RemoteStrategy {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn classify(&self, reviews: &[Review]) -> Vec<Assignment> {
        let mut assignments: Vec<Option<Assignment>> = reviews
            .iter()
            .map(|r| {
                let blank = r.content.as_deref().map_or(true, |c| c.trim().is_empty());
                blank.then(|| Assignment::new(UNCATEGORIZED, AssignmentMethod::EmptyContent))
            })
            .collect();
        let pending: Vec<usize> = (0..reviews.len())
            .filter(|&i| assignments[i].is_none())
            .collect();

        let total_chunks = pending.len().div_ceil(self.chunk_size);
        for (n, indices) in pending.chunks(self.chunk_size).enumerate() {
            info!(
                chunk = n + 1,
                of = total_chunks,
                reviews = indices.len(),
                "classifying chunk"
            );
            let chunk: Vec<&Review> = indices.iter().map(|&i| &reviews[i]).collect();
            let labels = self.classify_chunk(&chunk).await;
            for (&i, label) in indices.iter().zip(labels) {
                assignments[i] = Some(label);
            }
        }

        assignments
            .into_iter()
            .map(|a| {
                a.unwrap_or_else(|| {
                    Assignment::new(
                        self.catalog.sentiment().name.clone(),
                        AssignmentMethod::ProviderFailure,
                    )
                })
            })
            .collect()
    }
}

/// Zero-based position from a 1-based `review_id` given as a number or numeric string.
fn review_index(item: &Value) -> Option<usize> {
    let id = match item.get("review_id")? {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    usize::try_from(id).ok()?.checked_sub(1)
}
