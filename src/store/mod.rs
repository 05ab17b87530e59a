//! Persistence layer — `Storage` trait and the libSQL backend.

mod libsql_backend;
mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::Storage;

use std::sync::Arc;

use futures::future::join_all;
use tracing::info;

use crate::error::StorageError;
use crate::model::{AnalysisResult, AutoAction, Category, EnrichedAnalysis, NewRule};

/// Join each analysis with its content item, fetching concurrently.
pub async fn enrich_analyses(
    store: &Arc<dyn Storage>,
    analyses: Vec<AnalysisResult>,
) -> Result<Vec<EnrichedAnalysis>, StorageError> {
    let lookups = analyses.into_iter().map(|analysis| {
        let store = Arc::clone(store);
        async move {
            let content = store.get_content(analysis.content_id).await?;
            Ok(EnrichedAnalysis { analysis, content })
        }
    });
    join_all(lookups).await.into_iter().collect()
}

/// Seed the default rule set and the initial stats row on an empty store.
///
/// Safe to call on every startup; existing data is left untouched.
pub async fn seed_defaults(store: &Arc<dyn Storage>) -> Result<(), StorageError> {
    if store.list_rules().await?.is_empty() {
        let defaults = [
            NewRule {
                name: "Hate Speech Detection".into(),
                description: "Identifies content containing language that attacks or demeans \
                              groups based on protected characteristics."
                    .into(),
                category: Category::HateSpeech,
                sensitivity: 75,
                auto_action: AutoAction::FlagForReview,
                active: true,
            },
            NewRule {
                name: "Spam Detection".into(),
                description: "Identifies repetitive content, suspicious links, and commercial \
                              solicitation."
                    .into(),
                category: Category::Spam,
                sensitivity: 90,
                auto_action: AutoAction::AutoRemove,
                active: true,
            },
            NewRule {
                name: "Harassment Detection".into(),
                description: "Identifies personal attacks, bullying, and targeted abuse against \
                              individuals."
                    .into(),
                category: Category::Harassment,
                sensitivity: 65,
                auto_action: AutoAction::FlagForReview,
                active: true,
            },
            NewRule {
                name: "Explicit Content Detection".into(),
                description: "Identifies sexual, graphic, or adult-oriented content.".into(),
                category: Category::Explicit,
                sensitivity: 85,
                auto_action: AutoAction::AutoRemove,
                active: true,
            },
        ];
        for rule in &defaults {
            store.create_rule(rule).await?;
        }
        info!(count = defaults.len(), "Seeded default moderation rules");
    }

    if store.latest_stats().await?.is_none() {
        store.create_initial_stats().await?;
        info!("Seeded initial stats row");
    }

    Ok(())
}
