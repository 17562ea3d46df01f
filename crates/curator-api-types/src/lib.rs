//! Shared request and response types for the curation content API and the
//! auth service.
//!
//! Timestamps are passed through as the strings the backend emits; the content
//! API stores naive ISO-8601 values that are not RFC 3339.

use serde::{Deserialize, Serialize};

// ============================================================================
// Feeds, tags, categories
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub category_id: i64,
    pub url: String,
    pub source_name: String,
    #[serde(default)]
    pub website: Option<String>,
    pub fetch_interval: i64,
    #[serde(default)]
    pub last_fetched: Option<String>,
    pub is_active: i64,
    pub created_at: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Feed {
    pub fn active(&self) -> bool {
        self.is_active == 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedCreate {
    pub category_id: i64,
    pub url: String,
    pub source_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub fetch_interval: i64,
    pub is_active: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_interval: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// Body for creating or renaming a tag or category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamePayload {
    pub name: String,
}

// ============================================================================
// Collected content
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub feed_id: i64,
    #[serde(default)]
    pub guid: Option<String>,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    pub collected_at: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub detected_language: Option<String>,
    #[serde(default)]
    pub translation_status: Option<String>,
    #[serde(default)]
    pub approval_status: Option<String>,
}

/// One row of the unified scrapes view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeItem {
    pub content_type: String,
    pub content_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    pub source_name: String,
    pub collected_at: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub approval_status: Option<String>,
}

/// Count-bearing list envelope used by the scrapes and approval endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountedList<T> {
    pub total_count: u64,
    pub items: Vec<T>,
}

// ============================================================================
// Approval queue
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Lead,
    InstagramPost,
    RedditPost,
    TelegramPost,
    ElComercioPost,
    DiarioCorreoPost,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::InstagramPost => "instagram_post",
            Self::RedditPost => "reddit_post",
            Self::TelegramPost => "telegram_post",
            Self::ElComercioPost => "el_comercio_post",
            Self::DiarioCorreoPost => "diario_correo_post",
        }
    }

    pub const ALL: [ContentType; 6] = [
        Self::Lead,
        Self::InstagramPost,
        Self::RedditPost,
        Self::TelegramPost,
        Self::ElComercioPost,
        Self::DiarioCorreoPost,
    ];
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == raw)
            .ok_or_else(|| format!("unknown content type `{raw}`"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingItem {
    pub content_type: ContentType,
    pub content_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    pub source_name: String,
    pub collected_at: String,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub content_type: ContentType,
    pub content_id: i64,
    pub status: ApprovalDecision,
    pub approved_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchApprovalRequest {
    pub items: Vec<ApprovalRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchApprovalItemResult {
    pub content_id: i64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchApprovalResult {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub results: Vec<BatchApprovalItemResult>,
}

// ============================================================================
// Batch fetch jobs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl JobStatus {
    /// Whether the job still has steps left to run.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Skipped,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStep {
    pub id: i64,
    pub source_type: String,
    #[serde(default)]
    pub source_name: Option<String>,
    pub status: StepStatus,
    #[serde(default)]
    pub skip_reason: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, rename = "result_json")]
    pub result_payload: Option<String>,
}

/// One poll tick of a batch-fetch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: i64,
    pub status: JobStatus,
    pub created_at: String,
    #[serde(default)]
    pub total_steps: u64,
    #[serde(default)]
    pub completed_steps: u64,
    #[serde(default)]
    pub failed_steps: u64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub steps: Vec<JobStep>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartBatchFetch {
    #[serde(default)]
    pub force: bool,
}

// ============================================================================
// Dashboard
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub categories: u64,
    pub feeds: u64,
    pub active_feeds: u64,
    pub tags: u64,
    pub leads: u64,
}

// ============================================================================
// Auth service
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub email: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    /// Expiry as unix seconds.
    pub exp: i64,
    pub user: User,
}

// ============================================================================
// Error bodies
// ============================================================================

/// FastAPI-style error body returned by the content API.
#[derive(Debug, Clone, Deserialize)]
pub struct DetailBody {
    pub detail: serde_json::Value,
}

/// Error body returned by the auth service.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthErrorBody {
    #[serde(default)]
    pub errors: Vec<AuthErrorItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthErrorItem {
    #[serde(default)]
    pub message: Option<String>,
}
