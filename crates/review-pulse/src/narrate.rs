/// Narrative generation for the top themes.
///
/// All themes go to the chat backend in a single call. The reply is a JSON object keyed
/// by theme name; any theme the backend leaves out (or answers malformed) gets
/// `ThemeDetails::unavailable`, as does every theme when the model chain is exhausted.
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use pulse_common::openai::ChatBackend;

use crate::aggregate::ThemeEvidence;
use crate::llm::{strip_code_fence, ChainOutcome, ModelChain};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeDetails {
    pub issue_headline: String,
    pub user_quotes: Vec<String>,
    pub action_items: Vec<String>,
}

impl ThemeDetails {
    pub fn unavailable(theme: &str) -> Self {
        Self {
            issue_headline: format!("Analysis unavailable for {theme}"),
            user_quotes: vec!["N/A".to_string()],
            action_items: vec!["Manual review required".to_string()],
        }
    }
}

pub struct Narrator {
    backend: Arc<dyn ChatBackend>,
    models: ModelChain,
}

impl Narrator {
    pub fn new(backend: Arc<dyn ChatBackend>, models: ModelChain) -> Self {
        Self { backend, models }
    }

    /// Details for each theme, in the order given.
    pub async fn describe(&self, themes: &[ThemeEvidence]) -> Vec<ThemeDetails> {
        if themes.is_empty() {
            return Vec::new();
        }
        info!(
            model = self.models.primary(),
            themes = themes.len(),
            "generating theme narratives"
        );

        let prompt = prompt(themes);
        let backend = &*self.backend;
        let prompt = prompt.as_str();
        let outcome = self
            .models
            .run(|model| async move { backend.complete(&model, prompt).await })
            .await;

        let text = match outcome {
            ChainOutcome::Answered { model, value } => {
                info!(model = %model, "theme narratives received");
                value
            }
            ChainOutcome::Exhausted { error } => {
                warn!(error = %error, "narrative generation failed, using placeholder details");
                return themes.iter().map(|t| ThemeDetails::unavailable(&t.bucket)).collect();
            }
        };

        let parsed: HashMap<String, Value> = match serde_json::from_str(strip_code_fence(&text)) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "narrative response was not a JSON object, using placeholder details");
                HashMap::new()
            }
        };

        themes
            .iter()
            .map(|t| {
                let entry = parsed.get(&t.bucket).or_else(|| {
                    parsed
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(&t.bucket))
                        .map(|(_, v)| v)
                });
                match entry.map(|v| serde_json::from_value::<ThemeDetails>(v.clone())) {
                    Some(Ok(details)) => details,
                    Some(Err(e)) => {
                        warn!(theme = %t.bucket, error = %e, "malformed theme details");
                        ThemeDetails::unavailable(&t.bucket)
                    }
                    None => {
                        warn!(theme = %t.bucket, "theme missing from narrative response");
                        ThemeDetails::unavailable(&t.bucket)
                    }
                }
            })
            .collect()
    }
}

fn prompt(themes: &[ThemeEvidence]) -> String {
    let mut sections = String::new();
    for t in themes {
        sections.push_str(&format!("\n\nTheme: {}\nReviews:", t.bucket));
        for excerpt in &t.excerpts {
            sections.push_str(&format!("\n  - {excerpt}"));
        }
    }
    format!(
        "You are a Senior Product Manager. Analyze reviews for multiple themes.\n\
Output a JSON object with theme names as keys. Each theme should have:\n\
1. \"issue_headline\": Punchy 10-word headline.\n\
2. \"user_quotes\": List of 3 verbatim quotes from reviews.\n\
3. \"action_items\": List of 3 specific, actionable fixes.\n\n\
Themes and Reviews:{sections}\n\n\
Return ONLY valid JSON in this format:\n\
{{\"Theme Name\": {{\"issue_headline\": \"...\", \"user_quotes\": [...], \"action_items\": [...]}}}}"
    )
}
