//! `Storage` trait — single async interface for all persistence.
//!
//! The pipeline only ever sees this trait; the concrete backend is
//! constructed in `main` and injected. Within one process the backend
//! provides read-your-writes consistency.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::model::{
    AggregateStats, AnalysisResult, ContentItem, ContentStatus, ContentSubmission, ModerationRule,
    NewAnalysis, NewRule, RulePatch, StatsPatch,
};

#[async_trait]
pub trait Storage: Send + Sync {
    // ── Content ─────────────────────────────────────────────────────

    /// Persist a new content item, assigning its row id.
    async fn create_content(&self, sub: &ContentSubmission) -> Result<ContentItem, StorageError>;

    async fn get_content(&self, id: i64) -> Result<Option<ContentItem>, StorageError>;

    /// Look up a content item by its source-system id.
    async fn get_content_by_content_id(
        &self,
        content_id: &str,
    ) -> Result<Option<ContentItem>, StorageError>;

    /// List content items, most recent first.
    async fn list_contents(&self, limit: u32, offset: u32)
    -> Result<Vec<ContentItem>, StorageError>;

    /// Case-insensitive substring search over content text.
    async fn search_contents(&self, query: &str) -> Result<Vec<ContentItem>, StorageError>;

    // ── Analyses ────────────────────────────────────────────────────

    async fn create_analysis(&self, new: &NewAnalysis) -> Result<AnalysisResult, StorageError>;

    async fn get_analysis(&self, id: i64) -> Result<Option<AnalysisResult>, StorageError>;

    /// Update an analysis status. Returns `None` if the id is unknown.
    async fn update_analysis_status(
        &self,
        id: i64,
        status: ContentStatus,
    ) -> Result<Option<AnalysisResult>, StorageError>;

    /// List analyses, most recent first, optionally filtered by status.
    async fn list_analyses(
        &self,
        limit: u32,
        offset: u32,
        status: Option<ContentStatus>,
    ) -> Result<Vec<AnalysisResult>, StorageError>;

    // ── Rules ───────────────────────────────────────────────────────

    async fn list_rules(&self) -> Result<Vec<ModerationRule>, StorageError>;

    async fn get_rule(&self, id: i64) -> Result<Option<ModerationRule>, StorageError>;

    async fn create_rule(&self, new: &NewRule) -> Result<ModerationRule, StorageError>;

    /// Apply a partial update. Returns `None` if the id is unknown.
    async fn update_rule(
        &self,
        id: i64,
        patch: &RulePatch,
    ) -> Result<Option<ModerationRule>, StorageError>;

    // ── Stats ───────────────────────────────────────────────────────

    async fn latest_stats(&self) -> Result<Option<AggregateStats>, StorageError>;

    /// Insert the zeroed initial stats row.
    async fn create_initial_stats(&self) -> Result<AggregateStats, StorageError>;

    /// Apply a partial update. Returns `None` if the id is unknown.
    async fn update_stats(
        &self,
        id: i64,
        patch: &StatsPatch,
    ) -> Result<Option<AggregateStats>, StorageError>;
}
