/// Batch classification.
///
/// `ClassificationStrategy` is the seam between the batch driver and whatever decides a
/// label: the local `ThemeEngine` (canonical) or a remote text-understanding backend
/// (see `remote`). Every strategy must return exactly one assignment per review, in input
/// order; the batch driver enforces that before pairing labels with reviews.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::engine::ThemeEngine;
use crate::model::{
    Assignment, AssignmentMethod, ClassificationSummary, ClassifiedReview, Review,
};

#[async_trait]
pub trait ClassificationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// One assignment per review, in input order.
    async fn classify(&self, reviews: &[Review]) -> Vec<Assignment>;
}

pub struct ClassificationRun {
    pub results: Vec<ClassifiedReview>,
    pub summary: ClassificationSummary,
}

pub struct BatchClassifier {
    strategy: Arc<dyn ClassificationStrategy>,
    default_bucket: String,
}

impl BatchClassifier {
    /// `default_bucket` fills any slot a strategy failed to label.
    pub fn new(strategy: Arc<dyn ClassificationStrategy>, default_bucket: impl Into<String>) -> Self {
        Self {
            strategy,
            default_bucket: default_bucket.into(),
        }
    }

    pub async fn run(&self, reviews: Vec<Review>) -> ClassificationRun {
        info!(
            strategy = self.strategy.name(),
            reviews = reviews.len(),
            "classifying reviews"
        );
        let mut assignments = self.strategy.classify(&reviews).await;
        if assignments.len() != reviews.len() {
            warn!(
                expected = reviews.len(),
                got = assignments.len(),
                "strategy returned wrong number of labels, padding with default"
            );
            assignments.resize(
                reviews.len(),
                Assignment::new(self.default_bucket.clone(), AssignmentMethod::ProviderFailure),
            );
        }

        let results: Vec<ClassifiedReview> = reviews
            .into_iter()
            .zip(assignments)
            .map(|(review, a)| {
                debug!(review_id = %review.id, bucket = %a.bucket, method = %a.method, "review labelled");
                ClassifiedReview {
                    review,
                    bucket: a.bucket,
                    method: a.method,
                }
            })
            .collect();
        let summary = ClassificationSummary::from_results(&results);
        info!(
            total = summary.total,
            keyword = summary.keyword,
            tie_break = summary.tie_break,
            sentiment = summary.sentiment,
            similarity = summary.similarity,
            no_candidates = summary.no_candidates,
            remote = summary.remote,
            empty = summary.empty_content,
            provider_failures = summary.provider_failures,
            "classification complete"
        );
        ClassificationRun { results, summary }
    }
}

/// Classifies each review independently with the `ThemeEngine`.
///
/// Up to `concurrency` reviews are in flight at once; output order matches input order.
/// Provider errors and timeouts fall back to `default_bucket`.
pub struct EngineStrategy {
    engine: Arc<ThemeEngine>,
    concurrency: usize,
    timeout: Duration,
    default_bucket: String,
}

impl EngineStrategy {
    pub fn new(engine: Arc<ThemeEngine>, concurrency: usize, timeout: Duration) -> Self {
        let default_bucket = engine.catalog().sentiment().name.clone();
        Self {
            engine,
            concurrency: concurrency.max(1),
            timeout,
            default_bucket,
        }
    }

    async fn assign_one(&self, review: &Review) -> Assignment {
        let outcome =
            tokio::time::timeout(self.timeout, self.engine.assign(review.content.as_deref())).await;
        match outcome {
            Ok(Ok(assignment)) => assignment,
            Ok(Err(e)) => {
                warn!(review_id = %review.id, error = %e, "embedding failed, applying default bucket");
                Assignment::new(self.default_bucket.clone(), AssignmentMethod::ProviderFailure)
            }
            Err(_) => {
                warn!(
                    review_id = %review.id,
                    timeout_ms = self.timeout.as_millis(),
                    "classification timed out, applying default bucket"
                );
                Assignment::new(self.default_bucket.clone(), AssignmentMethod::ProviderFailure)
            }
        }
    }
}

#[async_trait]
impl ClassificationStrategy for EngineStrategy {
    fn name(&self) -> &'static str {
        "engine"
    }

    async fn classify(&self, reviews: &[Review]) -> Vec<Assignment> {
        // Futures are built up front so the stream carries no higher-ranked closure and
        // the whole future stays `Send`.
        let pending: Vec<_> = reviews.iter().map(|review| self.assign_one(review)).collect();
        futures::stream::iter(pending)
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Bucket, BucketCatalog};
    use crate::snapshot::BucketEmbeddings;
    use crate::testing::{review, FakeEmbedder};

    fn strategy(provider: FakeEmbedder, concurrency: usize) -> EngineStrategy {
        let catalog = BucketCatalog::new(
            vec![
                Bucket::new("A", &["slow"], 1),
                Bucket::new("B", &["fee"], 2),
                Bucket::new("Sentiment", &["great"], 99),
            ],
            "Sentiment",
        )
        .unwrap();
        let snapshot =
            BucketEmbeddings::new(&catalog, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]])
                .unwrap();
        let engine =
            ThemeEngine::new(Arc::new(catalog), Arc::new(snapshot), Arc::new(provider)).unwrap();
        EngineStrategy::new(Arc::new(engine), concurrency, Duration::from_secs(5))
    }

    fn reviews() -> Vec<Review> {
        vec![
            review("1", "app is slow and fee is high"),
            review("2", "great app, no issues"),
            review("3", ""),
            review("4", "nothing matches keywords"),
            review("5", "fee again"),
        ]
    }

    fn labels(run: &ClassificationRun) -> Vec<(String, String)> {
        run.results
            .iter()
            .map(|r| (r.review.id.clone(), r.bucket.clone()))
            .collect()
    }

    #[tokio::test]
    async fn labels_every_review_in_order() {
        let provider = FakeEmbedder::new().with("nothing matches keywords", vec![0.1, 0.9]);
        let classifier = BatchClassifier::new(Arc::new(strategy(provider, 2)), "Sentiment");
        let run = classifier.run(reviews()).await;

        assert_eq!(
            labels(&run),
            vec![
                ("1".to_string(), "A".to_string()),
                ("2".to_string(), "Sentiment".to_string()),
                ("3".to_string(), "Uncategorized".to_string()),
                ("4".to_string(), "B".to_string()),
                ("5".to_string(), "B".to_string()),
            ]
        );
        assert_eq!(run.summary.total, 5);
        assert_eq!(run.summary.keyword, 2);
        assert_eq!(run.summary.sentiment, 1);
        assert_eq!(run.summary.empty_content, 1);
        assert_eq!(run.summary.similarity, 1);
        assert_eq!(run.summary.provider_failures, 0);
        assert_eq!(run.summary.no_candidates, 0);
    }

    #[tokio::test]
    async fn catalog_without_issue_buckets_counts_no_candidates() {
        let catalog =
            BucketCatalog::new(vec![Bucket::new("Sentiment", &["great"], 99)], "Sentiment").unwrap();
        let snapshot = BucketEmbeddings::new(&catalog, vec![vec![1.0, 0.0]]).unwrap();
        let engine = ThemeEngine::new(
            Arc::new(catalog),
            Arc::new(snapshot),
            Arc::new(FakeEmbedder::new().failing()),
        )
        .unwrap();
        let strategy = EngineStrategy::new(Arc::new(engine), 2, Duration::from_secs(5));
        let run = BatchClassifier::new(Arc::new(strategy), "Sentiment")
            .run(vec![review("1", "great"), review("2", "meh"), review("3", "")])
            .await;

        assert_eq!(run.summary.sentiment, 1);
        assert_eq!(run.summary.no_candidates, 1);
        assert_eq!(run.summary.empty_content, 1);
        assert_eq!(run.summary.provider_failures, 0);
    }

    #[tokio::test]
    async fn results_do_not_depend_on_order_or_batching() {
        let make = || FakeEmbedder::new().with("nothing matches keywords", vec![0.1, 0.9]);

        let whole = BatchClassifier::new(Arc::new(strategy(make(), 4)), "Sentiment")
            .run(reviews())
            .await;
        let mut expected = labels(&whole);
        expected.sort();

        let mut reversed = reviews();
        reversed.reverse();
        let mut pieces = Vec::new();
        let classifier = BatchClassifier::new(Arc::new(strategy(make(), 1)), "Sentiment");
        for chunk in reversed.chunks(2) {
            pieces.extend(labels(&classifier.run(chunk.to_vec()).await));
        }
        pieces.sort();

        assert_eq!(pieces, expected);
    }

    #[tokio::test]
    async fn provider_failure_applies_default_and_continues() {
        let classifier =
            BatchClassifier::new(Arc::new(strategy(FakeEmbedder::new().failing(), 2)), "Sentiment");
        let run = classifier.run(reviews()).await;

        let failed = &run.results[3];
        assert_eq!(failed.bucket, "Sentiment");
        assert_eq!(failed.method, AssignmentMethod::ProviderFailure);
        assert_eq!(run.results[0].bucket, "A");
        assert_eq!(run.summary.provider_failures, 1);
        assert_eq!(run.results.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_provider_failure() {
        let provider = FakeEmbedder::new()
            .with_default(vec![1.0, 0.0])
            .with_delay(Duration::from_secs(60));
        let classifier = BatchClassifier::new(Arc::new(strategy(provider, 1)), "Sentiment");
        let run = classifier.run(vec![review("x", "nothing matches")]).await;
        assert_eq!(run.results[0].method, AssignmentMethod::ProviderFailure);
        assert_eq!(run.results[0].bucket, "Sentiment");
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn engine_classification_runs_on_spawned_tasks() {
        let strategy = Arc::new(strategy(
            FakeEmbedder::new().with("nothing matches keywords", vec![0.1, 0.9]),
            3,
        ));
        let batch = reviews();
        assert_send(&strategy.classify(&batch));

        let handle = tokio::spawn({
            let strategy = Arc::clone(&strategy);
            async move { strategy.classify(&batch).await }
        });
        let labels: Vec<String> = handle.await.unwrap().into_iter().map(|a| a.bucket).collect();
        assert_eq!(labels, vec!["A", "Sentiment", "Uncategorized", "B", "B"]);
    }

    struct ShortStrategy;

    #[async_trait]
    impl ClassificationStrategy for ShortStrategy {
        fn name(&self) -> &'static str {
            "short"
        }

        async fn classify(&self, reviews: &[Review]) -> Vec<Assignment> {
            reviews
                .iter()
                .take(1)
                .map(|_| Assignment::new("A", AssignmentMethod::Remote))
                .collect()
        }
    }

    #[tokio::test]
    async fn missing_labels_are_padded_with_default() {
        let classifier = BatchClassifier::new(Arc::new(ShortStrategy), "Sentiment");
        let run = classifier.run(reviews()).await;
        assert_eq!(run.results.len(), 5);
        assert_eq!(run.results[0].bucket, "A");
        assert!(run.results[1..]
            .iter()
            .all(|r| r.bucket == "Sentiment" && r.method == AssignmentMethod::ProviderFailure));
    }
}
