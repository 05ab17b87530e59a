//! libSQL backend — async `Storage` implementation.
//!
//! Supports local file and in-memory databases. Timestamps are stored as
//! RFC 3339 text; JSON payloads (metadata, rationale) as JSON text.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::StorageError;
use crate::model::{
    AggregateStats, AnalysisResult, Category, ContentItem, ContentKind, ContentStatus,
    ContentSubmission, ModerationRule, NewAnalysis, NewRule, RulePatch, StatsPatch,
};
use crate::store::traits::Storage;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS contents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        content TEXT NOT NULL,
        content_id TEXT NOT NULL,
        source_user_id TEXT NOT NULL DEFAULT 'system',
        metadata TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_contents_content_id ON contents(content_id);
    CREATE INDEX IF NOT EXISTS idx_contents_created ON contents(created_at);

    CREATE TABLE IF NOT EXISTS content_analyses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content_id INTEGER NOT NULL REFERENCES contents(id),
        category TEXT NOT NULL,
        confidence INTEGER NOT NULL,
        flagged INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'pending',
        rationale TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_analyses_status ON content_analyses(status);
    CREATE INDEX IF NOT EXISTS idx_analyses_content ON content_analyses(content_id);

    CREATE TABLE IF NOT EXISTS ai_rules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL,
        sensitivity INTEGER NOT NULL,
        auto_action TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS stats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        total_content INTEGER NOT NULL DEFAULT 0,
        flagged_content INTEGER NOT NULL DEFAULT 0,
        avg_confidence INTEGER NOT NULL DEFAULT 0,
        avg_latency_ms INTEGER NOT NULL DEFAULT 0,
        recorded_at TEXT NOT NULL
    );
"#;

/// libSQL database backend.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Pool(format!("Failed to open libSQL database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StorageError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StorageError::Pool(format!("Failed to create in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StorageError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        self.conn
            .execute_batch(SCHEMA)
            .await
            .map_err(|e| StorageError::Query(format!("init_schema: {e}")))?;
        Ok(())
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Row mapping helpers ─────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_json(s: Option<String>) -> Option<serde_json::Value> {
    s.and_then(|text| serde_json::from_str(&text).ok())
}

/// Convert `Option<String>` to a libsql Value (NULL when absent).
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn clamp_confidence(n: i64) -> u8 {
    n.clamp(0, 100) as u8
}

fn row_to_content(row: &libsql::Row) -> Result<ContentItem, libsql::Error> {
    let kind_str: String = row.get(1)?;
    let metadata_str: Option<String> = row.get(5).ok();
    let created_str: String = row.get(6)?;

    Ok(ContentItem {
        id: row.get(0)?,
        kind: ContentKind::from_str(&kind_str).unwrap_or(ContentKind::Other),
        content: row.get(2)?,
        content_id: row.get(3)?,
        source_user_id: row.get(4)?,
        metadata: parse_json(metadata_str),
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_analysis(row: &libsql::Row) -> Result<AnalysisResult, libsql::Error> {
    let category_str: String = row.get(2)?;
    let confidence: i64 = row.get(3)?;
    let flagged: i64 = row.get(4)?;
    let status_str: String = row.get(5)?;
    let rationale_str: Option<String> = row.get(6).ok();
    let created_str: String = row.get(7)?;

    Ok(AnalysisResult {
        id: row.get(0)?,
        content_id: row.get(1)?,
        category: Category::from_str(&category_str).unwrap_or(Category::Safe),
        confidence: clamp_confidence(confidence),
        flagged: flagged != 0,
        status: ContentStatus::from_str(&status_str).unwrap_or(ContentStatus::Pending),
        rationale: parse_json(rationale_str).unwrap_or(serde_json::Value::Null),
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_rule(row: &libsql::Row) -> Result<ModerationRule, libsql::Error> {
    let category_str: String = row.get(3)?;
    let sensitivity: i64 = row.get(4)?;
    let action_str: String = row.get(5)?;
    let active: i64 = row.get(6)?;
    let created_str: String = row.get(7)?;

    Ok(ModerationRule {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        category: Category::from_str(&category_str).unwrap_or(Category::Safe),
        sensitivity: clamp_confidence(sensitivity),
        auto_action: crate::model::AutoAction::from_str(&action_str)
            .unwrap_or(crate::model::AutoAction::FlagForReview),
        active: active != 0,
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_stats(row: &libsql::Row) -> Result<AggregateStats, libsql::Error> {
    let avg_confidence: i64 = row.get(3)?;
    let recorded_str: String = row.get(5)?;

    Ok(AggregateStats {
        id: row.get(0)?,
        total_content: row.get(1)?,
        flagged_content: row.get(2)?,
        avg_confidence: clamp_confidence(avg_confidence),
        avg_latency_ms: row.get(4)?,
        recorded_at: parse_datetime(&recorded_str),
    })
}

const CONTENT_COLUMNS: &str = "id, kind, content, content_id, source_user_id, metadata, created_at";
const ANALYSIS_COLUMNS: &str =
    "id, content_id, category, confidence, flagged, status, rationale, created_at";
const RULE_COLUMNS: &str =
    "id, name, description, category, sensitivity, auto_action, active, created_at";
const STATS_COLUMNS: &str =
    "id, total_content, flagged_content, avg_confidence, avg_latency_ms, recorded_at";

#[async_trait]
impl Storage for LibSqlStore {
    // ── Content ─────────────────────────────────────────────────────

    async fn create_content(&self, sub: &ContentSubmission) -> Result<ContentItem, StorageError> {
        let conn = self.conn();
        let metadata_str = match &sub.metadata {
            Some(value) => Some(
                serde_json::to_string(value)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
            ),
            None => None,
        };
        let source_user_id = sub.source_user_id.clone().unwrap_or_else(|| "system".into());
        let now = Utc::now();

        conn.execute(
            "INSERT INTO contents (kind, content, content_id, source_user_id, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                sub.kind.to_string(),
                sub.content.clone(),
                sub.content_id.clone(),
                source_user_id.clone(),
                opt_text_owned(metadata_str),
                now.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| StorageError::Query(format!("create_content: {e}")))?;

        Ok(ContentItem {
            id: conn.last_insert_rowid(),
            kind: sub.kind,
            content: sub.content.clone(),
            content_id: sub.content_id.clone(),
            source_user_id,
            metadata: sub.metadata.clone(),
            created_at: now,
        })
    }

    async fn get_content(&self, id: i64) -> Result<Option<ContentItem>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CONTENT_COLUMNS} FROM contents WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get_content: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_content(&row).map_err(|e| {
                StorageError::Query(format!("get_content row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("get_content: {e}"))),
        }
    }

    async fn get_content_by_content_id(
        &self,
        content_id: &str,
    ) -> Result<Option<ContentItem>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONTENT_COLUMNS} FROM contents WHERE content_id = ?1 \
                     ORDER BY id DESC LIMIT 1"
                ),
                params![content_id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get_content_by_content_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_content(&row).map_err(|e| {
                StorageError::Query(format!("get_content_by_content_id row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!(
                "get_content_by_content_id: {e}"
            ))),
        }
    }

    async fn list_contents(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ContentItem>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONTENT_COLUMNS} FROM contents \
                     ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
                ),
                params![limit as i64, offset as i64],
            )
            .await
            .map_err(|e| StorageError::Query(format!("list_contents: {e}")))?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_content(&row) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!("Skipping content row: {e}"),
            }
        }
        Ok(items)
    }

    async fn search_contents(&self, query: &str) -> Result<Vec<ContentItem>, StorageError> {
        // Escape LIKE wildcards so the query is a literal substring match.
        let escaped = query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let pattern = format!("%{}%", escaped.to_lowercase());
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONTENT_COLUMNS} FROM contents \
                     WHERE lower(content) LIKE ?1 ESCAPE '\\' \
                     ORDER BY created_at DESC, id DESC"
                ),
                params![pattern],
            )
            .await
            .map_err(|e| StorageError::Query(format!("search_contents: {e}")))?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_content(&row) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!("Skipping content row: {e}"),
            }
        }
        Ok(items)
    }

    // ── Analyses ────────────────────────────────────────────────────

    async fn create_analysis(&self, new: &NewAnalysis) -> Result<AnalysisResult, StorageError> {
        let conn = self.conn();
        let rationale_str = serde_json::to_string(&new.rationale)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO content_analyses (content_id, category, confidence, flagged, status, rationale, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.content_id,
                new.category.to_string(),
                new.confidence as i64,
                new.flagged as i64,
                new.status.to_string(),
                rationale_str,
                now.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| StorageError::Query(format!("create_analysis: {e}")))?;

        Ok(AnalysisResult {
            id: conn.last_insert_rowid(),
            content_id: new.content_id,
            category: new.category,
            confidence: new.confidence,
            flagged: new.flagged,
            status: new.status,
            rationale: new.rationale.clone(),
            created_at: now,
        })
    }

    async fn get_analysis(&self, id: i64) -> Result<Option<AnalysisResult>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ANALYSIS_COLUMNS} FROM content_analyses WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get_analysis: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_analysis(&row).map_err(|e| {
                StorageError::Query(format!("get_analysis row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("get_analysis: {e}"))),
        }
    }

    async fn update_analysis_status(
        &self,
        id: i64,
        status: ContentStatus,
    ) -> Result<Option<AnalysisResult>, StorageError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE content_analyses SET status = ?1 WHERE id = ?2",
                params![status.to_string(), id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("update_analysis_status: {e}")))?;

        if affected == 0 {
            return Ok(None);
        }
        self.get_analysis(id).await
    }

    async fn list_analyses(
        &self,
        limit: u32,
        offset: u32,
        status: Option<ContentStatus>,
    ) -> Result<Vec<AnalysisResult>, StorageError> {
        let mut rows = match status {
            Some(status) => self
                .conn()
                .query(
                    &format!(
                        "SELECT {ANALYSIS_COLUMNS} FROM content_analyses WHERE status = ?1 \
                         ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
                    ),
                    params![status.to_string(), limit as i64, offset as i64],
                )
                .await,
            None => self
                .conn()
                .query(
                    &format!(
                        "SELECT {ANALYSIS_COLUMNS} FROM content_analyses \
                         ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
                    ),
                    params![limit as i64, offset as i64],
                )
                .await,
        }
        .map_err(|e| StorageError::Query(format!("list_analyses: {e}")))?;

        let mut analyses = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_analysis(&row) {
                Ok(analysis) => analyses.push(analysis),
                Err(e) => tracing::warn!("Skipping analysis row: {e}"),
            }
        }
        Ok(analyses)
    }

    // ── Rules ───────────────────────────────────────────────────────

    async fn list_rules(&self) -> Result<Vec<ModerationRule>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RULE_COLUMNS} FROM ai_rules ORDER BY id ASC"),
                (),
            )
            .await
            .map_err(|e| StorageError::Query(format!("list_rules: {e}")))?;

        let mut rules = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_rule(&row) {
                Ok(rule) => rules.push(rule),
                Err(e) => tracing::warn!("Skipping rule row: {e}"),
            }
        }
        Ok(rules)
    }

    async fn get_rule(&self, id: i64) -> Result<Option<ModerationRule>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RULE_COLUMNS} FROM ai_rules WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get_rule: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_rule(&row).map_err(|e| {
                StorageError::Query(format!("get_rule row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("get_rule: {e}"))),
        }
    }

    async fn create_rule(&self, new: &NewRule) -> Result<ModerationRule, StorageError> {
        let conn = self.conn();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO ai_rules (name, description, category, sensitivity, auto_action, active, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.name.clone(),
                new.description.clone(),
                new.category.to_string(),
                new.sensitivity as i64,
                new.auto_action.to_string(),
                new.active as i64,
                now.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| StorageError::Query(format!("create_rule: {e}")))?;

        Ok(ModerationRule {
            id: conn.last_insert_rowid(),
            name: new.name.clone(),
            description: new.description.clone(),
            category: new.category,
            sensitivity: new.sensitivity,
            auto_action: new.auto_action,
            active: new.active,
            created_at: now,
        })
    }

    async fn update_rule(
        &self,
        id: i64,
        patch: &RulePatch,
    ) -> Result<Option<ModerationRule>, StorageError> {
        let Some(current) = self.get_rule(id).await? else {
            return Ok(None);
        };

        let name = patch.name.clone().unwrap_or(current.name);
        let description = patch.description.clone().unwrap_or(current.description);
        let sensitivity = patch.sensitivity.unwrap_or(current.sensitivity);
        let auto_action = patch.auto_action.unwrap_or(current.auto_action);
        let active = patch.active.unwrap_or(current.active);

        self.conn()
            .execute(
                "UPDATE ai_rules SET name = ?1, description = ?2, sensitivity = ?3, \
                 auto_action = ?4, active = ?5 WHERE id = ?6",
                params![
                    name,
                    description,
                    sensitivity as i64,
                    auto_action.to_string(),
                    active as i64,
                    id,
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("update_rule: {e}")))?;

        self.get_rule(id).await
    }

    // ── Stats ───────────────────────────────────────────────────────

    async fn latest_stats(&self) -> Result<Option<AggregateStats>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {STATS_COLUMNS} FROM stats ORDER BY recorded_at DESC, id DESC LIMIT 1"
                ),
                (),
            )
            .await
            .map_err(|e| StorageError::Query(format!("latest_stats: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_stats(&row).map_err(|e| {
                StorageError::Query(format!("latest_stats row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("latest_stats: {e}"))),
        }
    }

    async fn create_initial_stats(&self) -> Result<AggregateStats, StorageError> {
        let conn = self.conn();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO stats (total_content, flagged_content, avg_confidence, avg_latency_ms, recorded_at) \
             VALUES (0, 0, 0, 0, ?1)",
            params![now.to_rfc3339()],
        )
        .await
        .map_err(|e| StorageError::Query(format!("create_initial_stats: {e}")))?;

        Ok(AggregateStats {
            id: conn.last_insert_rowid(),
            total_content: 0,
            flagged_content: 0,
            avg_confidence: 0,
            avg_latency_ms: 0,
            recorded_at: now,
        })
    }

    async fn update_stats(
        &self,
        id: i64,
        patch: &StatsPatch,
    ) -> Result<Option<AggregateStats>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {STATS_COLUMNS} FROM stats WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| StorageError::Query(format!("update_stats: {e}")))?;

        let current = match rows.next().await {
            Ok(Some(row)) => row_to_stats(&row)
                .map_err(|e| StorageError::Query(format!("update_stats row parse: {e}")))?,
            Ok(None) => return Ok(None),
            Err(e) => return Err(StorageError::Query(format!("update_stats: {e}"))),
        };

        let total_content = patch.total_content.unwrap_or(current.total_content);
        let flagged_content = patch.flagged_content.unwrap_or(current.flagged_content);
        let avg_confidence = patch.avg_confidence.unwrap_or(current.avg_confidence);
        let avg_latency_ms = patch.avg_latency_ms.unwrap_or(current.avg_latency_ms);
        let now = Utc::now();

        self.conn()
            .execute(
                "UPDATE stats SET total_content = ?1, flagged_content = ?2, avg_confidence = ?3, \
                 avg_latency_ms = ?4, recorded_at = ?5 WHERE id = ?6",
                params![
                    total_content,
                    flagged_content,
                    avg_confidence as i64,
                    avg_latency_ms,
                    now.to_rfc3339(),
                    id,
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("update_stats: {e}")))?;

        Ok(Some(AggregateStats {
            id,
            total_content,
            flagged_content,
            avg_confidence,
            avg_latency_ms,
            recorded_at: now,
        }))
    }
}
