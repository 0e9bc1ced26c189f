use std::fmt::Write as _;

use serde::Serialize;

use crate::aggregate::ThemeEvidence;
use crate::narrate::ThemeDetails;

pub const DEFAULT_TITLE: &str = "Product Pulse";

#[derive(Debug, Clone, Serialize)]
pub struct ReportTheme {
    pub rank: usize,
    pub bucket: String,
    pub count: usize,
    pub details: ThemeDetails,
}

/// The weekly pulse: a headline summary plus the ranked themes.
#[derive(Debug, Clone, Serialize)]
pub struct PulseReport {
    pub title: String,
    pub executive_summary: String,
    pub themes: Vec<ReportTheme>,
}

impl PulseReport {
    /// Pairs each theme with its details; themes without details get the placeholder.
    pub fn new(title: impl Into<String>, themes: Vec<ThemeEvidence>, details: Vec<ThemeDetails>) -> Self {
        let mut details = details.into_iter();
        let themes: Vec<ReportTheme> = themes
            .into_iter()
            .map(|t| ReportTheme {
                details: details
                    .next()
                    .unwrap_or_else(|| ThemeDetails::unavailable(&t.bucket)),
                rank: t.rank,
                bucket: t.bucket,
                count: t.count,
            })
            .collect();
        let names: Vec<&str> = themes.iter().map(|t| t.bucket.as_str()).collect();
        Self {
            title: title.into(),
            executive_summary: format!("Top issues: {}", names.join(", ")),
            themes,
        }
    }

    pub fn render_html(&self) -> String {
        let mut html = String::new();
        let _ = write!(
            html,
            "<html><body style=\"font-family: sans-serif; padding: 20px;\">\n\
<div style=\"max-width: 600px; margin: auto; border: 1px solid #ccc; border-radius: 8px;\">\n\
<div style=\"background: #2C3E50; color: white; padding: 20px; text-align: center;\">\n\
<h2>{}</h2><p>{}</p>\n</div>\n",
            escape(&self.title),
            escape(&self.executive_summary)
        );
        for theme in &self.themes {
            let quotes: String = theme
                .details
                .user_quotes
                .iter()
                .map(|q| format!("<li>&quot;{}&quot;</li>", escape(q)))
                .collect();
            let actions: String = theme
                .details
                .action_items
                .iter()
                .map(|a| format!("<li>{}</li>", escape(a)))
                .collect();
            let _ = write!(
                html,
                "<div style=\"padding: 20px; border-bottom: 1px solid #eee;\">\n\
<span style=\"background: #eee; padding: 3px 8px; font-size: 11px;\">#{} {} ({} reviews)</span>\n\
<h3 style=\"color: #2C3E50;\">{}</h3>\n\
<div style=\"background: #FFF5F5; padding: 10px; margin-bottom: 5px;\"><b>User Voices:</b><ul>{}</ul></div>\n\
<div style=\"background: #F0F7FA; padding: 10px;\"><b>Actions:</b><ul>{}</ul></div>\n\
</div>\n",
                theme.rank,
                escape(&theme.bucket),
                theme.count,
                escape(&theme.details.issue_headline),
                quotes,
                actions
            );
        }
        html.push_str("</div></body></html>\n");
        html
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
