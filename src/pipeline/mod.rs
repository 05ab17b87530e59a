//! The asynchronous moderation pipeline.
//!
//! Submissions flow: ingestion topic → `IngestionStage` (persist, count) →
//! analysis topic → `ClassificationStage` (classify, decide, persist
//! analysis, stats, notify). Stages are decoupled by the message bus and
//! never propagate errors backward past their own consumer.

pub mod analyze;
pub mod ingest;
pub mod rules;
pub mod stats;

use std::sync::Arc;

use tracing::warn;

use crate::bus::MessageBus;
use crate::error::PipelineError;
use crate::model::{ContentItem, ContentSubmission};

pub use analyze::ClassificationStage;
pub use ingest::IngestionStage;
pub use rules::{Decision, RuleEngine, decide_with_rules};
pub use stats::StatsTracker;

/// Raw submissions awaiting persistence.
pub const INGESTION_TOPIC: &str = "content-ingestion";
/// Persisted items awaiting classification.
pub const ANALYSIS_TOPIC: &str = "content-analysis";

/// Messages carried by the pipeline bus.
#[derive(Debug, Clone)]
pub enum PipelineMessage {
    /// A raw submission (ingestion topic).
    Submission(ContentSubmission),
    /// A persisted content item (analysis topic).
    Stored(ContentItem),
}

/// Register the stage consumers on their topics. Call once at startup,
/// before any publish.
pub async fn register_consumers(
    bus: &MessageBus<PipelineMessage>,
    ingestion: Arc<IngestionStage>,
    classification: Arc<ClassificationStage>,
) {
    bus.subscribe(INGESTION_TOPIC, "ingestion-stage", move |message| {
        let stage = Arc::clone(&ingestion);
        async move {
            match message {
                PipelineMessage::Submission(submission) => stage
                    .ingest(submission)
                    .await
                    .map(|_| ())
                    .map_err(|e| PipelineError::Ingest(e.to_string())),
                other => {
                    warn!(?other, "Ignoring unexpected message on ingestion topic");
                    Err(PipelineError::UnexpectedMessage {
                        topic: INGESTION_TOPIC.into(),
                    })
                }
            }
        }
    })
    .await;

    bus.subscribe(ANALYSIS_TOPIC, "classification-stage", move |message| {
        let stage = Arc::clone(&classification);
        async move {
            match message {
                PipelineMessage::Stored(item) => stage.process(item).await.map(|_| ()),
                other => {
                    warn!(?other, "Ignoring unexpected message on analysis topic");
                    Err(PipelineError::UnexpectedMessage {
                        topic: ANALYSIS_TOPIC.into(),
                    })
                }
            }
        }
    })
    .await;
}
