/// Review ingestion: raw records from a source, validated, windowed and PII-masked.

use std::path::PathBuf;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::model::Review;

/// One record as exported from the app store. Every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReview {
    pub review_id: Option<String>,
    pub content: Option<String>,
    pub at: Option<String>,
    pub score: Option<u8>,
    pub thumbs_up: Option<u32>,
    pub review_created_version: Option<String>,
}

pub trait ReviewSource {
    fn fetch(&self) -> Result<Vec<RawReview>, AppError>;
}

/// Reads an app-store CSV export with a header row.
pub struct CsvReviewSource {
    path: PathBuf,
}

impl CsvReviewSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReviewSource for CsvReviewSource {
    fn fetch(&self) -> Result<Vec<RawReview>, AppError> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut records = Vec::new();
        for (line, row) in reader.deserialize::<RawReview>().enumerate() {
            match row {
                Ok(raw) => records.push(raw),
                Err(e) => {
                    // Unparseable rows (e.g. a non-numeric score) are kept as empty
                    // records so ingestion counts them as invalid.
                    warn!(row = line + 1, error = %e, "unreadable review row");
                    records.push(RawReview::default());
                }
            }
        }
        Ok(records)
    }
}

/// Masks e-mail addresses and Indian phone numbers.
pub struct PiiMasker {
    email: Regex,
    prefixed_phone: Regex,
    phone: Regex,
}

impl PiiMasker {
    pub fn new() -> Self {
        Self {
            email: Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}")
                .expect("valid regex"),
            prefixed_phone: Regex::new(r"\+91[-\s]?\d{10}\b").expect("valid regex"),
            phone: Regex::new(r"\b\d{10}\b").expect("valid regex"),
        }
    }

    pub fn mask(&self, text: &str) -> String {
        let text = self.email.replace_all(text, "[EMAIL_MASKED]");
        let text = self.prefixed_phone.replace_all(&text, "[PHONE_MASKED]");
        self.phone.replace_all(&text, "[PHONE_MASKED]").into_owned()
    }
}

impl Default for PiiMasker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub fetched: usize,
    pub skipped_old: usize,
    pub skipped_invalid: usize,
    pub kept: usize,
}

pub struct Ingestor {
    lookback_weeks: u32,
    masker: PiiMasker,
}

impl Ingestor {
    /// `lookback_weeks == 0` keeps reviews of any age.
    pub fn new(lookback_weeks: u32) -> Self {
        Self {
            lookback_weeks,
            masker: PiiMasker::new(),
        }
    }

    pub fn ingest(&self, raw: Vec<RawReview>, now: DateTime<Utc>) -> (Vec<Review>, IngestSummary) {
        let cutoff = (self.lookback_weeks > 0)
            .then(|| now - Duration::weeks(i64::from(self.lookback_weeks)));
        let mut summary = IngestSummary {
            fetched: raw.len(),
            ..IngestSummary::default()
        };

        let mut kept = Vec::new();
        for record in raw {
            let Some(review) = self.validate(record) else {
                summary.skipped_invalid += 1;
                continue;
            };
            if cutoff.is_some_and(|c| review.date < c) {
                summary.skipped_old += 1;
                continue;
            }
            kept.push(review);
        }
        kept.sort_by(|a, b| b.date.cmp(&a.date));
        summary.kept = kept.len();

        info!(
            fetched = summary.fetched,
            skipped_old = summary.skipped_old,
            skipped_invalid = summary.skipped_invalid,
            kept = summary.kept,
            lookback_weeks = self.lookback_weeks,
            "ingestion complete"
        );
        (kept, summary)
    }

    fn validate(&self, raw: RawReview) -> Option<Review> {
        let id = raw.review_id.filter(|id| !id.trim().is_empty())?;
        let content = raw.content.filter(|c| !c.trim().is_empty())?;
        let date = raw.at.as_deref().and_then(parse_timestamp)?;
        let rating = raw.score.filter(|s| (1..=5).contains(s))?;
        Some(Review {
            id,
            content: Some(self.masker.mask(&content)),
            date,
            rating,
            thumbs_up: raw.thumbs_up.unwrap_or(0),
            app_version: raw.review_created_version.filter(|v| !v.trim().is_empty()),
        })
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare date.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
