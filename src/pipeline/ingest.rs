//! Ingestion stage — validate, persist, hand off to classification.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bus::MessageBus;
use crate::error::IngestError;
use crate::model::{ContentItem, ContentSubmission};
use crate::pipeline::stats::StatsTracker;
use crate::pipeline::{ANALYSIS_TOPIC, PipelineMessage};
use crate::store::Storage;

/// Accepts content submissions, persists them, and publishes the persisted
/// item onto the analysis topic. The caller is released as soon as the
/// item is persisted; classification happens asynchronously.
pub struct IngestionStage {
    store: Arc<dyn Storage>,
    bus: Arc<MessageBus<PipelineMessage>>,
    stats: Arc<StatsTracker>,
}

impl IngestionStage {
    pub fn new(
        store: Arc<dyn Storage>,
        bus: Arc<MessageBus<PipelineMessage>>,
        stats: Arc<StatsTracker>,
    ) -> Self {
        Self { store, bus, stats }
    }

    /// Ingest one submission.
    ///
    /// Validation and persistence failures surface to the caller; a
    /// publish reaching zero consumers after successful persistence is
    /// only logged — the content exists and can be re-triggered.
    pub async fn ingest(&self, submission: ContentSubmission) -> Result<ContentItem, IngestError> {
        submission.validate().map_err(IngestError::Invalid)?;

        let item = self.store.create_content(&submission).await?;
        info!(
            id = item.id,
            content_id = %item.content_id,
            kind = %item.kind,
            "Content ingested"
        );

        self.stats.record_ingested().await;

        let delivered = self
            .bus
            .publish(ANALYSIS_TOPIC, PipelineMessage::Stored(item.clone()))
            .await;
        if delivered == 0 {
            // Persisted but unclassified; operators can re-submit.
            warn!(
                id = item.id,
                content_id = %item.content_id,
                "No classification consumer received the item"
            );
        }

        Ok(item)
    }
}
