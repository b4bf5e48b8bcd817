//! Request and response types for the REST surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Case, CasePayload, CaseStatus, CaseUpdate, DuplicateMode, Event, EventType};

/// Body of `POST /api/cases`: a case payload plus the duplicate policy.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitCaseRequest {
    #[serde(flatten)]
    pub case: CasePayload,
    #[serde(default, rename = "duplicateMode")]
    pub duplicate_mode: Option<DuplicateMode>,
}

/// Body of `POST /api/cases/:codigoSC/update`.
pub type UpdateCaseRequest = CaseUpdate;

/// Body of `POST /api/cases/:codigoSC/thread`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetThreadRequest {
    pub email_thread_id: String,
}

/// Body of `POST /api/cases/:codigoSC/events`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub description: String,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Query string of `GET /api/cases`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListCasesQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListCasesResponse {
    pub cases: Vec<Case>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusCount {
    pub status: CaseStatus,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseStatsResponse {
    pub total: i64,
    pub in_progress: i64,
    pub pending_action: i64,
    pub by_status: Vec<StatusCount>,
}

/// `GET /api/cases/thread/:threadId` when a case matches.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadLookupResponse {
    pub found: bool,
    #[serde(rename = "case")]
    pub case_item: Case,
}

/// An event joined with its owning case, for `GET /api/events/:id`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventWithCase {
    #[serde(flatten)]
    pub event: Event,
    #[serde(rename = "case")]
    pub case_item: Case,
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewQuery {
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationMetrics {
    pub hours_saved: f64,
    pub automation_rate: u32,
    pub cases_processed: i64,
    pub cost_savings: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailCounts {
    pub sent: i64,
    pub received: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallCounts {
    pub total: i64,
    pub reached: i64,
    pub not_reached: i64,
    pub needs_help: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationMetrics {
    pub total_emails: EmailCounts,
    pub total_calls: CallCounts,
    pub avg_response_time: f64,
    pub call_success_rate: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseMetrics {
    pub total: i64,
    pub resolved: i64,
    pub resolution_rate: u32,
    pub avg_resolution_time: f64,
    pub by_status: Vec<StatusCount>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyMetrics {
    pub events_per_case: f64,
    pub retry_rate: u32,
    pub review_rate: u32,
    pub avg_wait_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewResponse {
    pub automation: AutomationMetrics,
    pub communication: CommunicationMetrics,
    pub cases: CaseMetrics,
    pub efficiency: EfficiencyMetrics,
}

/// One calendar day with at least one created case.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TrendPoint {
    pub date: String,
    pub cases: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub event_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RegionCount {
    pub region: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProcessCount {
    pub process: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DistributorCount {
    pub distributor: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionResponse {
    pub event_types: Vec<TypeCount>,
    pub geographic: Vec<RegionCount>,
    pub process_types: Vec<ProcessCount>,
    pub distributors: Vec<DistributorCount>,
}

// ---------------------------------------------------------------------------
// Auth / health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AuthRequest {
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}
