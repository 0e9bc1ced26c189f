/// The weekly run: ingest -> bucket snapshot -> classify -> export -> aggregate ->
/// narrate -> render -> email.
///
/// Only ingestion failures abort the run. Everything after that logs its error and the
/// stages that depend on the missing output are skipped.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pulse_common::embedding::EmbeddingProvider;
use pulse_common::openai::ChatBackend;
use tracing::{error, info, warn};

use crate::aggregate::Aggregator;
use crate::catalog::BucketCatalog;
use crate::classify::{BatchClassifier, ClassificationStrategy, EngineStrategy};
use crate::config::Config;
use crate::email::Mailer;
use crate::engine::ThemeEngine;
use crate::error::AppError;
use crate::export::write_classified;
use crate::llm::ModelChain;
use crate::model::ClassificationSummary;
use crate::narrate::Narrator;
use crate::remote::RemoteStrategy;
use crate::report::PulseReport;
use crate::snapshot::{BucketEmbeddings, SnapshotCache};
use crate::source::{IngestSummary, Ingestor, ReviewSource};

/// How reviews get labelled. The engine variant defers building the bucket snapshot
/// until the run has reviews to classify.
pub enum ClassifierSetup {
    Engine {
        provider: Arc<dyn EmbeddingProvider>,
        cache: SnapshotCache,
        concurrency: usize,
        timeout: Duration,
    },
    Remote(Arc<RemoteStrategy>),
}

#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub ingest: IngestSummary,
    pub classification: Option<ClassificationSummary>,
    pub report: Option<PulseReport>,
    pub emailed: bool,
}

pub struct Pipeline {
    catalog: Arc<BucketCatalog>,
    ingestor: Ingestor,
    classifier: ClassifierSetup,
    narrator: Narrator,
    mailer: Option<Mailer>,
    classified_csv: PathBuf,
    report_html: PathBuf,
    report_title: String,
    top_n: usize,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        catalog: Arc<BucketCatalog>,
        classifier: ClassifierSetup,
        chat: Arc<dyn ChatBackend>,
    ) -> Self {
        let models = ModelChain::new(config.llm_model.clone(), config.llm_fallback_model.clone());
        Self {
            catalog,
            ingestor: Ingestor::new(config.lookback_weeks),
            classifier,
            narrator: Narrator::new(chat, models),
            mailer: config.email.clone().map(Mailer::new),
            classified_csv: config.classified_csv.clone(),
            report_html: config.report_html.clone(),
            report_title: config.report_title.clone(),
            top_n: config.top_n,
        }
    }

    pub async fn run(
        &self,
        source: &dyn ReviewSource,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome, AppError> {
        let raw = source.fetch()?;
        let (reviews, ingest) = self.ingestor.ingest(raw, now);
        let mut outcome = PipelineOutcome {
            ingest,
            ..PipelineOutcome::default()
        };
        if reviews.is_empty() {
            warn!("no reviews in the lookback window, nothing to report");
            return Ok(outcome);
        }

        let strategy = match self.strategy().await {
            Ok(strategy) => strategy,
            Err(e) => {
                error!(error = %e, "classifier setup failed, skipping classification and report");
                return Ok(outcome);
            }
        };
        let run = BatchClassifier::new(strategy, self.catalog.sentiment().name.clone())
            .run(reviews)
            .await;
        outcome.classification = Some(run.summary);

        match write_classified(&self.classified_csv, &run.results) {
            Ok(()) => info!(path = %self.classified_csv.display(), "classified reviews written"),
            Err(e) => error!(error = %e, path = %self.classified_csv.display(), "failed to write classified reviews"),
        }

        let aggregator = Aggregator::new(&self.catalog);
        let distribution = aggregator.full(&run.results);
        info!(?distribution, "bucket distribution");
        let themes = aggregator.top_themes(&run.results, self.top_n);

        let details = self.narrator.describe(&themes).await;
        let report = PulseReport::new(self.report_title.clone(), themes, details);
        info!(summary = %report.executive_summary, "report generated");
        let html = report.render_html();
        outcome.report = Some(report);

        if let Err(e) = std::fs::write(&self.report_html, &html) {
            error!(error = %e, path = %self.report_html.display(), "failed to write report");
        } else {
            info!(path = %self.report_html.display(), "report written");
        }

        match &self.mailer {
            Some(mailer) => match mailer.send(&html).await {
                Ok(()) => outcome.emailed = true,
                Err(e) => error!(error = %e, "failed to email report"),
            },
            None => info!("email not configured, skipping delivery"),
        }

        Ok(outcome)
    }

    async fn strategy(&self) -> Result<Arc<dyn ClassificationStrategy>, AppError> {
        match &self.classifier {
            ClassifierSetup::Engine {
                provider,
                cache,
                concurrency,
                timeout,
            } => {
                let snapshot = BucketEmbeddings::build(&self.catalog, provider.as_ref(), cache).await?;
                info!(dimensions = snapshot.dimensions(), "bucket snapshot ready");
                let engine = ThemeEngine::new(
                    Arc::clone(&self.catalog),
                    Arc::new(snapshot),
                    Arc::clone(provider),
                )?;
                Ok(Arc::new(EngineStrategy::new(
                    Arc::new(engine),
                    *concurrency,
                    *timeout,
                )))
            }
            ClassifierSetup::Remote(remote) => Ok(Arc::clone(remote) as Arc<dyn ClassificationStrategy>),
        }
    }
}
