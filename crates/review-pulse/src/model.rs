use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label for reviews that cannot be placed in any bucket.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A validated app-store review. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub id: String,
    /// Review body. `None` only for records that bypassed ingestion.
    pub content: Option<String>,
    pub date: DateTime<Utc>,
    /// Star rating, 1-5.
    pub rating: u8,
    pub thumbs_up: u32,
    pub app_version: Option<String>,
}

/// Which path of the classifier produced a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    /// Content was missing or blank.
    EmptyContent,
    /// A single bucket won on keyword priority.
    Keyword,
    /// Several buckets tied on priority; similarity picked one of them.
    TieBreak,
    /// Only sentiment keywords matched.
    Sentiment,
    /// Nothing matched; nearest non-sentiment bucket by similarity.
    Similarity,
    /// Nothing matched and the catalog has no non-sentiment bucket.
    NoCandidates,
    /// Label chosen by a remote text-understanding backend.
    Remote,
    /// The provider failed; the default label was applied.
    ProviderFailure,
}

impl AssignmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentMethod::EmptyContent => "empty_content",
            AssignmentMethod::Keyword => "keyword",
            AssignmentMethod::TieBreak => "tie_break",
            AssignmentMethod::Sentiment => "sentiment",
            AssignmentMethod::Similarity => "similarity",
            AssignmentMethod::NoCandidates => "no_candidates",
            AssignmentMethod::Remote => "remote",
            AssignmentMethod::ProviderFailure => "provider_failure",
        }
    }
}

impl fmt::Display for AssignmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly one bucket for one review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub bucket: String,
    pub method: AssignmentMethod,
}

impl Assignment {
    pub fn new(bucket: impl Into<String>, method: AssignmentMethod) -> Self {
        Self {
            bucket: bucket.into(),
            method,
        }
    }
}

/// A review together with its single label.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedReview {
    pub review: Review,
    pub bucket: String,
    pub method: AssignmentMethod,
}

/// Per-run counts, derived from the labelled output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationSummary {
    pub total: usize,
    pub empty_content: usize,
    pub keyword: usize,
    pub tie_break: usize,
    pub sentiment: usize,
    pub similarity: usize,
    pub no_candidates: usize,
    pub remote: usize,
    pub provider_failures: usize,
}

impl ClassificationSummary {
    pub fn from_results(results: &[ClassifiedReview]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for r in results {
            let slot = match r.method {
                AssignmentMethod::EmptyContent => &mut summary.empty_content,
                AssignmentMethod::Keyword => &mut summary.keyword,
                AssignmentMethod::TieBreak => &mut summary.tie_break,
                AssignmentMethod::Sentiment => &mut summary.sentiment,
                AssignmentMethod::Similarity => &mut summary.similarity,
                AssignmentMethod::NoCandidates => &mut summary.no_candidates,
                AssignmentMethod::Remote => &mut summary.remote,
                AssignmentMethod::ProviderFailure => &mut summary.provider_failures,
            };
            *slot += 1;
        }
        summary
    }
}
