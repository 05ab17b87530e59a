//! Classification stage — classify persisted content and record the verdict.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use crate::classifier::Classifier;
use crate::error::PipelineError;
use crate::model::{AnalysisResult, ContentItem, EnrichedAnalysis, NewAnalysis};
use crate::notify::{Event, NotificationHub};
use crate::pipeline::rules::RuleEngine;
use crate::pipeline::stats::StatsTracker;
use crate::store::{Storage, enrich_analyses};

/// Consumes persisted content items, runs classifier + rule engine,
/// persists the analysis, updates rolling stats, and pushes updates to
/// connected clients.
pub struct ClassificationStage {
    store: Arc<dyn Storage>,
    classifier: Arc<dyn Classifier>,
    rules: RuleEngine,
    stats: Arc<StatsTracker>,
    hub: Arc<NotificationHub>,
    /// Page size for the flagged-content snapshot pushed after a flag.
    flagged_page_size: u32,
}

impl ClassificationStage {
    pub fn new(
        store: Arc<dyn Storage>,
        classifier: Arc<dyn Classifier>,
        stats: Arc<StatsTracker>,
        hub: Arc<NotificationHub>,
        flagged_page_size: u32,
    ) -> Self {
        let rules = RuleEngine::new(Arc::clone(&store));
        Self {
            store,
            classifier,
            rules,
            stats,
            hub,
            flagged_page_size,
        }
    }

    /// Process one persisted item. Unsupported kinds are skipped (`None`).
    ///
    /// Classification itself cannot fail (the adapter degrades internally);
    /// storage failures after a computed verdict are surfaced to the
    /// consuming worker, which logs them — the item stays unclassified and
    /// is not retried here.
    pub async fn process(&self, item: ContentItem) -> Result<Option<AnalysisResult>, PipelineError> {
        if !item.kind.is_classifiable() {
            debug!(id = item.id, kind = %item.kind, "Skipping unsupported content kind");
            return Ok(None);
        }

        let blob = normalize_text(&item);

        let started = Instant::now();
        let classification = self.classifier.classify(&blob).await;
        let latency_ms = started.elapsed().as_millis() as i64;

        let decision = self
            .rules
            .decide(
                classification.category,
                classification.confidence,
                classification.flagged_hint,
            )
            .await?;

        let analysis = self
            .store
            .create_analysis(&NewAnalysis {
                content_id: item.id,
                category: classification.category,
                confidence: classification.confidence,
                flagged: decision.flagged,
                status: decision.status,
                rationale: classification.rationale(),
            })
            .await
            .map_err(|e| {
                error!(
                    id = item.id,
                    content_id = %item.content_id,
                    error = %e,
                    "Failed to persist analysis; item remains unclassified"
                );
                PipelineError::Storage(e)
            })?;

        info!(
            id = item.id,
            content_id = %item.content_id,
            category = %analysis.category,
            confidence = analysis.confidence,
            flagged = analysis.flagged,
            status = %analysis.status,
            latency_ms,
            "Content classified"
        );

        self.stats
            .record_analysis(analysis.flagged, analysis.confidence, latency_ms)
            .await;
        self.publish_updates(analysis.flagged).await;

        Ok(Some(analysis))
    }

    /// Push the post-analysis state changes: fresh stats always, the
    /// pending-review page when something was flagged. Read failures here
    /// only cost a notification, never the analysis.
    async fn publish_updates(&self, flagged: bool) {
        match self.store.latest_stats().await {
            Ok(Some(stats)) => self.hub.broadcast(Event::StatsUpdate(stats)).await,
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Skipping stats broadcast"),
        }

        if flagged {
            match self.pending_page().await {
                Ok(page) => self.hub.broadcast(Event::FlaggedContentUpdate(page)).await,
                Err(e) => debug!(error = %e, "Skipping flagged-content broadcast"),
            }
        }
    }

    async fn pending_page(&self) -> Result<Vec<EnrichedAnalysis>, PipelineError> {
        let analyses = self
            .store
            .list_analyses(
                self.flagged_page_size,
                0,
                Some(crate::model::ContentStatus::Pending),
            )
            .await?;
        Ok(enrich_analyses(&self.store, analyses).await?)
    }
}

/// Build the single text blob handed to the classifier: the metadata title
/// (news items carry one) followed by the body.
fn normalize_text(item: &ContentItem) -> String {
    let title = item
        .metadata
        .as_ref()
        .and_then(|m| m.get("title"))
        .and_then(|t| t.as_str());
    match title {
        Some(title) if !title.is_empty() => format!("Title: {}\nContent: {}", title, item.content),
        _ => item.content.clone(),
    }
}
