/// Theme assignment engine.
///
/// Resolves one review to exactly one bucket:
///
/// 1. Blank or missing content -> `Uncategorized`, no embedding call.
/// 2. Note whether any sentiment keyword occurs.
/// 3. For each non-sentiment bucket (catalog order), record its first keyword hit.
/// 4. Keyword hits: the lowest priority value wins outright; several buckets tied at
///    that priority are separated by similarity among the tied set only.
///    No hits but a sentiment hit: the sentiment bucket.
/// 5. Otherwise the most similar non-sentiment bucket.
///
/// Similarity ties keep the earlier bucket in catalog order. Embedding is only requested
/// when a similarity comparison is actually needed.
use std::sync::Arc;

use pulse_common::embedding::EmbeddingProvider;
use pulse_common::error::CommonError;

use crate::catalog::BucketCatalog;
use crate::error::AppError;
use crate::model::{Assignment, AssignmentMethod, UNCATEGORIZED};
use crate::snapshot::BucketEmbeddings;

pub struct ThemeEngine {
    catalog: Arc<BucketCatalog>,
    snapshot: Arc<BucketEmbeddings>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl ThemeEngine {
    /// The snapshot must hold one vector per catalog bucket.
    pub fn new(
        catalog: Arc<BucketCatalog>,
        snapshot: Arc<BucketEmbeddings>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, AppError> {
        if snapshot.len() != catalog.len() {
            return Err(AppError::Snapshot(format!(
                "snapshot has {} vectors for a catalog of {} buckets",
                snapshot.len(),
                catalog.len()
            )));
        }
        Ok(Self {
            catalog,
            snapshot,
            provider,
        })
    }

    pub fn catalog(&self) -> &BucketCatalog {
        &self.catalog
    }

    /// Assign one bucket to `content`. Fails only when the embedding provider fails.
    pub async fn assign(&self, content: Option<&str>) -> Result<Assignment, CommonError> {
        let Some(content) = content.filter(|c| !c.trim().is_empty()) else {
            return Ok(Assignment::new(UNCATEGORIZED, AssignmentMethod::EmptyContent));
        };
        let lowered = content.to_lowercase();

        let sentiment_matched = self.catalog.sentiment().first_match(&lowered).is_some();

        let matches: Vec<(usize, i32)> = self
            .catalog
            .actionable()
            .filter_map(|(i, bucket)| bucket.first_match(&lowered).map(|_| (i, bucket.priority)))
            .collect();

        if let Some(top) = matches.iter().map(|&(_, priority)| priority).min() {
            let tied: Vec<usize> = matches
                .iter()
                .filter(|&&(_, priority)| priority == top)
                .map(|&(i, _)| i)
                .collect();

            if let [only] = tied.as_slice() {
                return Ok(self.label(*only, AssignmentMethod::Keyword));
            }

            let embedding = self.embed(content).await?;
            let winner = self.most_similar(&embedding, &tied).unwrap_or(tied[0]);
            return Ok(self.label(winner, AssignmentMethod::TieBreak));
        }

        if sentiment_matched {
            return Ok(self.label(self.catalog.sentiment_index(), AssignmentMethod::Sentiment));
        }

        let candidates: Vec<usize> = self.catalog.actionable().map(|(i, _)| i).collect();
        if candidates.is_empty() {
            return Ok(Assignment::new(UNCATEGORIZED, AssignmentMethod::NoCandidates));
        }

        let embedding = self.embed(content).await?;
        match self.most_similar(&embedding, &candidates) {
            Some(best) => Ok(self.label(best, AssignmentMethod::Similarity)),
            None => Ok(Assignment::new(UNCATEGORIZED, AssignmentMethod::NoCandidates)),
        }
    }

    /// A review vector that cannot be compared with the snapshot is a provider failure.
    async fn embed(&self, content: &str) -> Result<Vec<f32>, CommonError> {
        let embedding = self.provider.embed(content).await?;
        let expected = self.snapshot.dimensions();
        if embedding.len() != expected {
            return Err(CommonError::Embedding(format!(
                "embedding has dimension {}, expected {expected}",
                embedding.len()
            )));
        }
        Ok(embedding)
    }

    /// Candidate with strictly the highest similarity; the first one seen wins ties.
    fn most_similar(&self, embedding: &[f32], candidates: &[usize]) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for &i in candidates {
            let score = cosine_similarity(embedding, self.snapshot.vector(i));
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((i, score)),
            }
        }
        best.map(|(i, _)| i)
    }

    fn label(&self, index: usize, method: AssignmentMethod) -> Assignment {
        Assignment::new(self.catalog.buckets()[index].name.clone(), method)
    }
}

/// Cosine similarity in [-1, 1]. Zero-norm vectors score 0.0, as do mismatched lengths
/// (`ThemeEngine` rejects those before comparing).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}
