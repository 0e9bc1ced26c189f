/// Bucket frequency aggregation and top-N theme selection.
///
/// Distributions are ordered by descending count; equal counts keep catalog order, with
/// `Uncategorized` after every catalog bucket and unknown labels after that in
/// first-seen order.
use std::collections::HashMap;

use serde::Serialize;

use crate::catalog::BucketCatalog;
use crate::model::{ClassifiedReview, UNCATEGORIZED};

const MAX_EXCERPTS: usize = 5;
const MAX_EXCERPT_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    pub bucket: String,
    pub count: usize,
}

/// A selected theme with supporting evidence, ready for narrative generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThemeEvidence {
    pub rank: usize,
    pub bucket: String,
    pub count: usize,
    pub excerpts: Vec<String>,
}

pub struct Aggregator<'a> {
    catalog: &'a BucketCatalog,
}

impl<'a> Aggregator<'a> {
    pub fn new(catalog: &'a BucketCatalog) -> Self {
        Self { catalog }
    }

    /// Every label, sentiment bucket included.
    pub fn full(&self, results: &[ClassifiedReview]) -> Vec<BucketCount> {
        self.count(results, |_| true)
    }

    /// Actionable labels only (sentiment bucket excluded).
    pub fn actionable(&self, results: &[ClassifiedReview]) -> Vec<BucketCount> {
        let sentiment = self.catalog.sentiment().name.as_str();
        self.count(results, |bucket| bucket != sentiment)
    }

    /// The `n` most frequent actionable themes, or the most frequent themes overall when
    /// nothing actionable was found.
    pub fn top_themes(&self, results: &[ClassifiedReview], n: usize) -> Vec<ThemeEvidence> {
        let mut ranked = self.actionable(results);
        if ranked.is_empty() {
            ranked = self.full(results);
        }
        ranked
            .into_iter()
            .take(n)
            .enumerate()
            .map(|(i, bc)| ThemeEvidence {
                rank: i + 1,
                excerpts: excerpts(results, &bc.bucket),
                bucket: bc.bucket,
                count: bc.count,
            })
            .collect()
    }

    fn count(
        &self,
        results: &[ClassifiedReview],
        include: impl Fn(&str) -> bool,
    ) -> Vec<BucketCount> {
        let mut order: HashMap<&str, usize> = HashMap::new();
        let mut counts: Vec<(usize, BucketCount)> = Vec::new();
        let mut unknown = 0usize;

        for r in results.iter().filter(|r| include(&r.bucket)) {
            let slot = match order.get(r.bucket.as_str()) {
                Some(&slot) => slot,
                None => {
                    let key = self.order_key(&r.bucket, &mut unknown);
                    counts.push((
                        key,
                        BucketCount {
                            bucket: r.bucket.clone(),
                            count: 0,
                        },
                    ));
                    order.insert(r.bucket.as_str(), counts.len() - 1);
                    counts.len() - 1
                }
            };
            counts[slot].1.count += 1;
        }

        counts.sort_by(|(ka, a), (kb, b)| b.count.cmp(&a.count).then(ka.cmp(kb)));
        counts.into_iter().map(|(_, bc)| bc).collect()
    }

    fn order_key(&self, bucket: &str, unknown: &mut usize) -> usize {
        if let Some(i) = self.catalog.position(bucket) {
            return i;
        }
        if bucket == UNCATEGORIZED {
            return self.catalog.len();
        }
        *unknown += 1;
        self.catalog.len() + *unknown
    }
}

fn excerpts(results: &[ClassifiedReview], bucket: &str) -> Vec<String> {
    results
        .iter()
        .filter(|r| r.bucket == bucket)
        .filter_map(|r| r.review.content.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .take(MAX_EXCERPTS)
        .map(|c| c.chars().take(MAX_EXCERPT_CHARS).collect())
        .collect()
}
