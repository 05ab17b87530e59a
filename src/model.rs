//! Domain model — content items, moderation rules, analysis results, stats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Content ─────────────────────────────────────────────────────────

/// What kind of content a submission carries.
///
/// Only `Text` and `News` are classified; other kinds are accepted and
/// stored but skipped by the classification stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Image,
    Video,
    News,
    Other,
}

impl ContentKind {
    /// Whether the classification stage can analyze this kind.
    pub fn is_classifiable(&self) -> bool {
        matches!(self, Self::Text | Self::News)
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
            Self::News => write!(f, "news"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "news" => Ok(Self::News),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown content kind: {}", s)),
        }
    }
}

/// A persisted content item. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    /// Server-assigned row id.
    pub id: i64,
    pub kind: ContentKind,
    /// Main content text.
    pub content: String,
    /// Identifier from the source system (not globally unique across kinds).
    pub content_id: String,
    /// User id from the source system ("system" when absent).
    pub source_user_id: String,
    /// Free-form source metadata (title, url, author, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A content creation request, as accepted by the ingestion entrypoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSubmission {
    pub kind: ContentKind,
    pub content: String,
    pub content_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ContentSubmission {
    /// Validate the submission. Rejections are reported synchronously
    /// to the caller (400-class).
    pub fn validate(&self) -> Result<(), String> {
        if self.content.trim().is_empty() {
            return Err("content must not be empty".into());
        }
        if self.content_id.trim().is_empty() {
            return Err("content_id must not be empty".into());
        }
        Ok(())
    }
}

// ── Categories and statuses ─────────────────────────────────────────

/// Moderation category. `Safe` appears in classifications but is never
/// the subject of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    HateSpeech,
    Spam,
    Harassment,
    Explicit,
    Safe,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HateSpeech => write!(f, "hate_speech"),
            Self::Spam => write!(f, "spam"),
            Self::Harassment => write!(f, "harassment"),
            Self::Explicit => write!(f, "explicit"),
            Self::Safe => write!(f, "safe"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hate_speech" => Ok(Self::HateSpeech),
            "spam" => Ok(Self::Spam),
            "harassment" => Ok(Self::Harassment),
            "explicit" => Ok(Self::Explicit),
            "safe" => Ok(Self::Safe),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Moderation status of an analysis result.
///
/// Transitions are one-way: `Pending` moves to any of the other three via
/// a moderator action; the pipeline never reverts a settled status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Pending,
    Reviewed,
    Removed,
    Approved,
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Reviewed => write!(f, "reviewed"),
            Self::Removed => write!(f, "removed"),
            Self::Approved => write!(f, "approved"),
        }
    }
}

impl std::str::FromStr for ContentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "reviewed" => Ok(Self::Reviewed),
            "removed" => Ok(Self::Removed),
            "approved" => Ok(Self::Approved),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// What a triggered rule does with the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoAction {
    FlagForReview,
    AutoRemove,
    None,
}

impl std::fmt::Display for AutoAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FlagForReview => write!(f, "flag_for_review"),
            Self::AutoRemove => write!(f, "auto_remove"),
            Self::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for AutoAction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flag_for_review" => Ok(Self::FlagForReview),
            "auto_remove" => Ok(Self::AutoRemove),
            "none" => Ok(Self::None),
            _ => Err(format!("Unknown auto action: {}", s)),
        }
    }
}

// ── Rules ───────────────────────────────────────────────────────────

/// A moderation rule: the confidence threshold and action for one category.
///
/// At most one rule is consulted per category at decision time (first
/// active match).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationRule {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category: Category,
    /// Minimum confidence at/above which the rule triggers, 0–100.
    pub sensitivity: u8,
    pub auto_action: AutoAction,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A rule creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRule {
    pub name: String,
    pub description: String,
    pub category: Category,
    pub sensitivity: u8,
    pub auto_action: AutoAction,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl NewRule {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if self.category == Category::Safe {
            return Err("category 'safe' cannot be ruled".into());
        }
        if self.sensitivity > 100 {
            return Err("sensitivity must be in 0..=100".into());
        }
        Ok(())
    }
}

/// A partial rule update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_action: Option<AutoAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl RulePatch {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(s) = self.sensitivity
            && s > 100
        {
            return Err("sensitivity must be in 0..=100".into());
        }
        Ok(())
    }
}

// ── Analysis ────────────────────────────────────────────────────────

/// A persisted classification outcome for one content item.
///
/// Only `status` is mutable after creation, and only through an explicit
/// moderator action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: i64,
    /// References the `ContentItem` row id.
    pub content_id: i64,
    pub category: Category,
    /// Classifier confidence, 0–100.
    pub confidence: u8,
    pub flagged: bool,
    pub status: ContentStatus,
    /// Raw classifier output (category, confidence, reason strings).
    pub rationale: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An analysis creation request (pipeline-internal).
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub content_id: i64,
    pub category: Category,
    pub confidence: u8,
    pub flagged: bool,
    pub status: ContentStatus,
    pub rationale: serde_json::Value,
}

/// An analysis joined with its content item, as pushed to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedAnalysis {
    #[serde(flatten)]
    pub analysis: AnalysisResult,
    /// Absent only if the content row vanished underneath us.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentItem>,
}

// ── Stats ───────────────────────────────────────────────────────────

/// Rolling platform counters. Exactly one "latest" row is meaningful;
/// it is updated incrementally, never recomputed from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateStats {
    pub id: i64,
    pub total_content: i64,
    pub flagged_content: i64,
    /// Smoothed classifier confidence, 0–100.
    pub avg_confidence: u8,
    /// Smoothed classification latency in milliseconds.
    pub avg_latency_ms: i64,
    pub recorded_at: DateTime<Utc>,
}

/// A partial stats update.
#[derive(Debug, Clone, Default)]
pub struct StatsPatch {
    pub total_content: Option<i64>,
    pub flagged_content: Option<i64>,
    pub avg_confidence: Option<u8>,
    pub avg_latency_ms: Option<i64>,
}
