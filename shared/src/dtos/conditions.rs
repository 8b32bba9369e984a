use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::enums::{ConditionSeverity, ConditionStatus};

/// Underwriting condition resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionResponse {
    pub id: i64,
    pub application_id: i64,
    pub description: String,
    pub severity: ConditionSeverity,
    pub status: ConditionStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub iteration_count: i32,
    pub response_text: Option<String>,
    pub waiver_rationale: Option<String>,
    pub issued_by: Option<String>,
    pub cleared_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to issue a new condition on an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConditionRequest {
    pub description: String,
    pub severity: ConditionSeverity,
    pub due_date: Option<DateTime<Utc>>,
}

/// Borrower response to an open condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondConditionRequest {
    pub response_text: String,
}

/// Underwriter action on a condition under review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionActionRequest {
    /// One of `review`, `clear`, `return`, `waive`, `escalate`.
    pub action: String,
    /// Required for `waive`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiver_rationale: Option<String>,
    /// Appended to the response text on `return`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
