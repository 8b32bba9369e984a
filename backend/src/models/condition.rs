use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;

use shared::dtos::conditions::ConditionResponse;
use shared::models::enums::{ConditionSeverity, ConditionStatus};

/// Underwriting condition on an application.
///
/// `iteration_count` starts at zero and is incremented only when an
/// underwriter returns the condition to the borrower for more work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
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

impl Condition {
    pub fn from_row(row: &PgRow) -> Self {
        let severity: String = row.get("severity");
        let status: String = row.get("status");
        Condition {
            id: row.get("id"),
            application_id: row.get("application_id"),
            description: row.get("description"),
            severity: ConditionSeverity::parse(&severity)
                .unwrap_or(ConditionSeverity::PriorToApproval),
            status: ConditionStatus::parse(&status).unwrap_or(ConditionStatus::Open),
            due_date: row.get("due_date"),
            iteration_count: row.get("iteration_count"),
            response_text: row.get("response_text"),
            waiver_rationale: row.get("waiver_rationale"),
            issued_by: row.get("issued_by"),
            cleared_by: row.get("cleared_by"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    pub fn to_response(&self) -> ConditionResponse {
        ConditionResponse {
            id: self.id,
            application_id: self.application_id,
            description: self.description.clone(),
            severity: self.severity,
            status: self.status,
            due_date: self.due_date,
            iteration_count: self.iteration_count,
            response_text: self.response_text.clone(),
            waiver_rationale: self.waiver_rationale.clone(),
            issued_by: self.issued_by.clone(),
            cleared_by: self.cleared_by.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
