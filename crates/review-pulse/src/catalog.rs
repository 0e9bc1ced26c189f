/// Bucket catalog: the ordered set of operational buckets a review can land in.
///
/// Order is significant. Bucket embeddings are stored in a parallel array indexed by
/// catalog position, and similarity ties resolve to the earlier bucket. The catalog is
/// validated once at construction and never mutated afterwards.
///
/// JSON form:
///
/// ```json
/// {
///   "sentiment_bucket": "General Sentiment",
///   "buckets": [
///     { "name": "Order Execution", "keywords": ["buy", "sell"], "priority": 1 },
///     { "name": "General Sentiment", "keywords": ["great app"], "priority": 99 }
///   ]
/// }
/// ```
use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::AppError;

/// One operational bucket. Lower `priority` is more urgent.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub name: String,
    pub keywords: Vec<String>,
    pub priority: i32,
    needles: Vec<String>,
}

impl Bucket {
    pub fn new(name: impl Into<String>, keywords: &[&str], priority: i32) -> Self {
        Self::from_parts(
            name.into(),
            keywords.iter().map(|k| k.to_string()).collect(),
            priority,
        )
    }

    fn from_parts(name: String, keywords: Vec<String>, priority: i32) -> Self {
        let needles = keywords.iter().map(|k| k.to_lowercase()).collect();
        Self {
            name,
            keywords,
            priority,
            needles,
        }
    }

    /// First keyword, in declaration order, contained in `lowered` (already lowercased).
    pub fn first_match(&self, lowered: &str) -> Option<&str> {
        self.needles
            .iter()
            .position(|n| lowered.contains(n.as_str()))
            .map(|i| self.keywords[i].as_str())
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    sentiment_bucket: String,
    buckets: Vec<BucketEntry>,
}

#[derive(Debug, Deserialize)]
struct BucketEntry {
    name: String,
    keywords: Vec<String>,
    priority: i32,
}

#[derive(Debug, Clone)]
pub struct BucketCatalog {
    buckets: Vec<Bucket>,
    sentiment: usize,
}

impl BucketCatalog {
    /// Validate and build a catalog. `sentiment_bucket` names the bucket reserved for
    /// purely positive feedback; it must carry the highest priority value.
    pub fn new(buckets: Vec<Bucket>, sentiment_bucket: &str) -> Result<Self, AppError> {
        if buckets.is_empty() {
            return Err(AppError::Catalog("catalog has no buckets".to_string()));
        }

        let mut seen = HashSet::new();
        for bucket in &buckets {
            if bucket.name.trim().is_empty() {
                return Err(AppError::Catalog("bucket name must not be empty".to_string()));
            }
            if !seen.insert(bucket.name.to_lowercase()) {
                return Err(AppError::Catalog(format!(
                    "duplicate bucket name: {}",
                    bucket.name
                )));
            }
            if bucket.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(AppError::Catalog(format!(
                    "bucket {} has an empty keyword",
                    bucket.name
                )));
            }
        }

        let sentiment = buckets
            .iter()
            .position(|b| b.name == sentiment_bucket)
            .ok_or_else(|| {
                AppError::Catalog(format!(
                    "sentiment bucket {sentiment_bucket:?} is not in the catalog"
                ))
            })?;

        let sentiment_priority = buckets[sentiment].priority;
        if let Some(b) = buckets
            .iter()
            .find(|b| b.name != sentiment_bucket && b.priority > sentiment_priority)
        {
            return Err(AppError::Catalog(format!(
                "sentiment bucket {sentiment_bucket:?} (priority {sentiment_priority}) must be \
the lowest-priority bucket, but {} has priority {}",
                b.name, b.priority
            )));
        }

        Ok(Self { buckets, sentiment })
    }

    /// Parse and validate the JSON catalog form.
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| AppError::Catalog(format!("invalid catalog JSON: {e}")))?;
        let buckets = file
            .buckets
            .into_iter()
            .map(|b| Bucket::from_parts(b.name, b.keywords, b.priority))
            .collect();
        Self::new(buckets, &file.sentiment_bucket)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AppError::Catalog(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Default catalog for a retail trading app, ordered by business severity.
    pub fn builtin() -> Self {
        let buckets = vec![
            Bucket::new(
                "Order Execution",
                &[
                    "buy", "sell", "trade", "stop-loss", "order", "market timing", "stuck",
                    "price not updated", "wrong candle", "loss", "profit", "execution",
                    "lagging", "fail",
                ],
                1,
            ),
            Bucket::new(
                "Payments/Money",
                &[
                    "money", "payment", "withdraw", "add fund", "UPI", "Netbanking",
                    "withdrawal", "deposit", "transaction", "transferred", "credit", "debit",
                ],
                2,
            ),
            Bucket::new(
                "App Performance",
                &[
                    "crash", "lag", "slow", "freeze", "bug", "error", "not working",
                    "technical issue", "hang", "battery drain", "glitch",
                ],
                3,
            ),
            Bucket::new(
                "Onboarding/KYC",
                &[
                    "KYC", "onboard", "sign up", "verify", "document", "account activation",
                    "registration", "login issue",
                ],
                4,
            ),
            Bucket::new(
                "Charges/Policy",
                &[
                    "charges", "fees", "brokerage", "account maintenance", "hidden charges",
                    "commission", "policy",
                ],
                5,
            ),
            Bucket::new(
                "General Sentiment",
                &[
                    "good app", "easy to use", "best app", "superb", "excellent", "nice app",
                    "great app", "simple interface", "user friendly", "no complaints",
                ],
                99,
            ),
        ];
        Self {
            buckets,
            sentiment: 5,
        }
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn sentiment(&self) -> &Bucket {
        &self.buckets[self.sentiment]
    }

    pub fn sentiment_index(&self) -> usize {
        self.sentiment
    }

    /// Non-sentiment buckets with their catalog positions.
    pub fn actionable(&self) -> impl Iterator<Item = (usize, &Bucket)> {
        self.buckets
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != self.sentiment)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.buckets.iter().position(|b| b.name == name)
    }

    /// Map free-form text from a remote backend onto a catalog name: an exact
    /// case-insensitive match first, then the first bucket (catalog order) whose name is
    /// contained in the text.
    pub fn resolve_label(&self, label: &str) -> Option<&str> {
        let lowered = label.trim().to_lowercase();
        if lowered.is_empty() {
            return None;
        }
        self.buckets
            .iter()
            .find(|b| b.name.to_lowercase() == lowered)
            .or_else(|| {
                self.buckets
                    .iter()
                    .find(|b| lowered.contains(&b.name.to_lowercase()))
            })
            .map(|b| b.name.as_str())
    }

    /// Text embedded to represent a bucket: its name followed by its keywords.
    pub fn embedding_text(&self, index: usize) -> String {
        let bucket = &self.buckets[index];
        format!("{}: {}", bucket.name, bucket.keywords.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_valid() {
        let builtin = BucketCatalog::builtin();
        let rebuilt = BucketCatalog::new(builtin.buckets().to_vec(), "General Sentiment").unwrap();
        assert_eq!(rebuilt.sentiment_index(), builtin.sentiment_index());
        assert_eq!(builtin.sentiment().name, "General Sentiment");
        assert_eq!(builtin.actionable().count(), 5);
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let catalog = BucketCatalog::builtin();
        let kyc = &catalog.buckets()[3];
        assert_eq!(kyc.first_match("my kyc is pending"), Some("KYC"));
        let payments = &catalog.buckets()[1];
        assert_eq!(payments.first_match("upi failed twice"), Some("UPI"));
    }

    #[test]
    fn first_match_follows_keyword_order() {
        let bucket = Bucket::new("A", &["lag", "lagging"], 1);
        assert_eq!(bucket.first_match("the chart keeps lagging"), Some("lag"));
        assert_eq!(bucket.first_match("all fine"), None);
    }

    #[test]
    fn rejects_empty_catalog() {
        let err = BucketCatalog::new(vec![], "S").unwrap_err();
        assert!(matches!(err, AppError::Catalog(_)));
    }

    #[test]
    fn rejects_duplicate_names() {
        let buckets = vec![
            Bucket::new("A", &["x"], 1),
            Bucket::new("a", &["y"], 2),
            Bucket::new("S", &["great"], 9),
        ];
        assert!(BucketCatalog::new(buckets, "S").is_err());
    }

    #[test]
    fn rejects_blank_keyword() {
        let buckets = vec![Bucket::new("A", &["x", "  "], 1), Bucket::new("S", &["great"], 9)];
        assert!(BucketCatalog::new(buckets, "S").is_err());
    }

    #[test]
    fn rejects_missing_sentiment_bucket() {
        let buckets = vec![Bucket::new("A", &["x"], 1)];
        assert!(BucketCatalog::new(buckets, "S").is_err());
    }

    #[test]
    fn rejects_sentiment_that_outranks_other_buckets() {
        let buckets = vec![Bucket::new("A", &["x"], 5), Bucket::new("S", &["great"], 1)];
        assert!(BucketCatalog::new(buckets, "S").is_err());
    }

    #[test]
    fn parses_json_catalog() {
        let json = r#"{
            "sentiment_bucket": "Sentiment",
            "buckets": [
                {"name": "A", "keywords": ["slow"], "priority": 1},
                {"name": "B", "keywords": ["fee"], "priority": 2},
                {"name": "Sentiment", "keywords": ["great"], "priority": 99}
            ]
        }"#;
        let catalog = BucketCatalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.sentiment_index(), 2);
        assert_eq!(catalog.position("B"), Some(1));
        assert_eq!(catalog.embedding_text(0), "A: slow");
    }

    #[test]
    fn malformed_json_is_a_catalog_error() {
        let err = BucketCatalog::from_json("{\"buckets\": 3}").unwrap_err();
        assert!(matches!(err, AppError::Catalog(_)));
    }

    #[test]
    fn resolve_label_prefers_exact_match() {
        let catalog = BucketCatalog::builtin();
        assert_eq!(catalog.resolve_label("app performance"), Some("App Performance"));
        assert_eq!(
            catalog.resolve_label("Theme: Payments/Money issues"),
            Some("Payments/Money")
        );
        assert_eq!(catalog.resolve_label("Something else"), None);
        assert_eq!(catalog.resolve_label(""), None);
    }
}
