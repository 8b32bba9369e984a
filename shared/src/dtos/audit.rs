use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One audit event as returned by the query endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEventResponse {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub prev_hash: String,
    pub user_id: Option<String>,
    pub user_role: Option<String>,
    pub event_type: String,
    pub application_id: Option<i64>,
    pub decision_id: Option<i64>,
    pub event_data: Option<serde_json::Value>,
    pub session_id: Option<String>,
}

/// Result of a full hash-chain verification scan.
///
/// `TAMPERED` is a result, not an error; the endpoint still answers 200.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyChainResponse {
    pub status: String,
    pub events_checked: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_break_id: Option<i64>,
}

/// Audit events around a decision, bucketed by event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTraceResponse {
    pub decision_id: i64,
    pub application_id: i64,
    pub decision_type: String,
    pub decided_by: Option<String>,
    pub decided_at: DateTime<Utc>,
    pub events_by_type: HashMap<String, Vec<AuditEventResponse>>,
}
