/// Bucket embedding snapshot.
///
/// One vector per catalog bucket, in catalog order, computed once before any review is
/// classified and shared read-only for the rest of the run. Snapshots are cached in
/// Redis when available.
///
/// Key schema: `rp:v1:snapshot:{sha256(model_id | bucket texts)}`, JSON `Vec<Vec<f32>>`,
/// TTL 7 days. Any catalog or model change produces a new key.
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::catalog::BucketCatalog;
use crate::error::AppError;
use pulse_common::embedding::EmbeddingProvider;
use pulse_common::redis::RedisCache;

const KEY_PREFIX: &str = "rp:v1:";
const SNAPSHOT_TTL_SECS: u64 = 7 * 24 * 3600;

#[derive(Debug, Clone)]
pub struct BucketEmbeddings {
    vectors: Vec<Vec<f32>>,
}

impl BucketEmbeddings {
    /// Wrap precomputed vectors. There must be exactly one non-empty vector per bucket,
    /// all of the same dimension.
    pub fn new(catalog: &BucketCatalog, vectors: Vec<Vec<f32>>) -> Result<Self, AppError> {
        if vectors.len() != catalog.len() {
            return Err(AppError::Snapshot(format!(
                "expected {} bucket vectors, got {}",
                catalog.len(),
                vectors.len()
            )));
        }
        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        if dim == 0 {
            return Err(AppError::Snapshot("bucket vectors are empty".to_string()));
        }
        if let Some(i) = vectors.iter().position(|v| v.len() != dim) {
            return Err(AppError::Snapshot(format!(
                "bucket vector {i} has dimension {}, expected {dim}",
                vectors[i].len()
            )));
        }
        Ok(Self { vectors })
    }

    /// Embed every bucket (or load a cached snapshot for the same model and catalog).
    pub async fn build(
        catalog: &BucketCatalog,
        provider: &dyn EmbeddingProvider,
        cache: &SnapshotCache,
    ) -> Result<Self, AppError> {
        let texts: Vec<String> = (0..catalog.len())
            .map(|i| catalog.embedding_text(i))
            .collect();
        let key = snapshot_key(provider.model_id(), &texts);

        if let Some(vectors) = cache.get(&key).await {
            match Self::new(catalog, vectors) {
                Ok(snapshot) => {
                    info!(buckets = catalog.len(), "bucket embeddings loaded from cache");
                    return Ok(snapshot);
                }
                Err(e) => warn!(error = %e, "cached snapshot rejected, re-embedding"),
            }
        }

        info!(
            buckets = catalog.len(),
            model = provider.model_id(),
            "embedding buckets"
        );
        let vectors = provider.embed_batch(&texts).await?;
        let snapshot = Self::new(catalog, vectors)?;
        cache.set(&key, &snapshot.vectors).await;
        Ok(snapshot)
    }

    pub fn vector(&self, index: usize) -> &[f32] {
        &self.vectors[index]
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn dimensions(&self) -> usize {
        self.vectors[0].len()
    }
}

pub struct SnapshotCache {
    redis: RedisCache,
}

impl SnapshotCache {
    pub fn new(redis: RedisCache) -> Self {
        Self { redis }
    }

    async fn get(&self, key: &str) -> Option<Vec<Vec<f32>>> {
        let json = self.redis.get(key).await?;
        serde_json::from_str(&json)
            .inspect_err(|e| warn!(error = %e, key, "cache deserialization failed"))
            .ok()
    }

    async fn set(&self, key: &str, vectors: &[Vec<f32>]) {
        if let Ok(json) = serde_json::to_string(vectors) {
            self.redis.set_with_ttl(key, &json, SNAPSHOT_TTL_SECS).await;
        }
    }
}

fn snapshot_key(model_id: &str, texts: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    for text in texts {
        hasher.update(b"|");
        hasher.update(text.as_bytes());
    }
    let hash = hasher.finalize();
    format!("{KEY_PREFIX}snapshot:{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEmbedder;

    fn catalog() -> BucketCatalog {
        BucketCatalog::from_json(
            r#"{"sentiment_bucket": "S", "buckets": [
                {"name": "A", "keywords": ["slow"], "priority": 1},
                {"name": "S", "keywords": ["great"], "priority": 9}
            ]}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn build_embeds_each_bucket_in_order() {
        let catalog = catalog();
        let provider = FakeEmbedder::new()
            .with("A: slow", vec![1.0, 0.0])
            .with("S: great", vec![0.0, 1.0]);
        let cache = SnapshotCache::new(RedisCache::disabled());

        let snapshot = BucketEmbeddings::build(&catalog, &provider, &cache)
            .await
            .unwrap();
        assert_eq!(snapshot.vector(0), &[1.0, 0.0]);
        assert_eq!(snapshot.vector(1), &[0.0, 1.0]);
        assert_eq!(snapshot.dimensions(), 2);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn provider_failure_aborts_setup() {
        let catalog = catalog();
        let provider = FakeEmbedder::new().failing();
        let cache = SnapshotCache::new(RedisCache::disabled());
        let err = BucketEmbeddings::build(&catalog, &provider, &cache)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Common(_)));
    }

    #[test]
    fn rejects_wrong_vector_count() {
        let err = BucketEmbeddings::new(&catalog(), vec![vec![1.0]]).unwrap_err();
        assert!(matches!(err, AppError::Snapshot(_)));
    }

    #[test]
    fn rejects_mixed_dimensions() {
        let err = BucketEmbeddings::new(&catalog(), vec![vec![1.0], vec![1.0, 2.0]]).unwrap_err();
        assert!(matches!(err, AppError::Snapshot(_)));
    }

    #[test]
    fn key_depends_on_model_and_texts() {
        let texts = vec!["A: slow".to_string()];
        let a = snapshot_key("m1", &texts);
        assert_eq!(a, snapshot_key("m1", &texts));
        assert_ne!(a, snapshot_key("m2", &texts));
        assert_ne!(a, snapshot_key("m1", &["A: fast".to_string()]));
        assert!(a.starts_with("rp:v1:snapshot:"));
    }
}
