use std::path::Path;

use serde::Serialize;

use crate::error::AppError;
use crate::model::ClassifiedReview;

#[derive(Serialize)]
struct ExportRow<'a> {
    review_id: &'a str,
    date: String,
    score: u8,
    thumbs_up: u32,
    app_version: &'a str,
    content: &'a str,
    operational_bucket: &'a str,
    assignment: &'static str,
}

/// Writes one row per labelled review, in classification order.
pub fn write_classified(path: &Path, results: &[ClassifiedReview]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)?;
    for r in results {
        writer.serialize(ExportRow {
            review_id: &r.review.id,
            date: r.review.date.format("%Y-%m-%d").to_string(),
            score: r.review.rating,
            thumbs_up: r.review.thumbs_up,
            app_version: r.review.app_version.as_deref().unwrap_or("Unknown"),
            content: r.review.content.as_deref().unwrap_or(""),
            operational_bucket: &r.bucket,
            assignment: r.method.as_str(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssignmentMethod;
    use crate::testing::review;

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classified.csv");
        let results = vec![
            ClassifiedReview {
                review: review("r1", "fees, again"),
                bucket: "Charges/Policy".into(),
                method: AssignmentMethod::Keyword,
            },
            ClassifiedReview {
                review: review("r2", ""),
                bucket: "Uncategorized".into(),
                method: AssignmentMethod::EmptyContent,
            },
        ];
        write_classified(&path, &results).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "review_id,date,score,thumbs_up,app_version,content,operational_bucket,assignment"
        );
        assert_eq!(
            lines[1],
            "r1,2024-01-01,3,0,Unknown,\"fees, again\",Charges/Policy,keyword"
        );
        assert_eq!(lines[2], "r2,2024-01-01,3,0,Unknown,,Uncategorized,empty_content");
    }
}
