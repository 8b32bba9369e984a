use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;

use shared::dtos::audit::AuditEventResponse;

/// One link in the append-only audit chain.
///
/// `prev_hash` is the SHA-256 of the canonical serialization of the
/// preceding event's public fields; the first event carries the literal
/// sentinel `"genesis"`. Rows are never mutated or deleted: the database
/// trigger records any attempt in `audit_violations` and aborts the
/// transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
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

impl AuditEvent {
    pub fn from_row(row: &PgRow) -> Self {
        AuditEvent {
            id: row.get("id"),
            timestamp: row.get("timestamp"),
            prev_hash: row.get("prev_hash"),
            user_id: row.get("user_id"),
            user_role: row.get("user_role"),
            event_type: row.get("event_type"),
            application_id: row.get("application_id"),
            decision_id: row.get("decision_id"),
            event_data: row.get("event_data"),
            session_id: row.get("session_id"),
        }
    }

    pub fn to_response(&self) -> AuditEventResponse {
        AuditEventResponse {
            id: self.id,
            timestamp: self.timestamp,
            prev_hash: self.prev_hash.clone(),
            user_id: self.user_id.clone(),
            user_role: self.user_role.clone(),
            event_type: self.event_type.clone(),
            application_id: self.application_id,
            decision_id: self.decision_id,
            event_data: self.event_data.clone(),
            session_id: self.session_id.clone(),
        }
    }
}

/// Attempted UPDATE/DELETE on `audit_events`, written by the database
/// trigger before it raises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditViolation {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub attempted_operation: String,
    pub db_user: String,
    pub audit_event_id: Option<i64>,
}

impl AuditViolation {
    pub fn from_row(row: &PgRow) -> Self {
        AuditViolation {
            id: row.get("id"),
            timestamp: row.get("timestamp"),
            attempted_operation: row.get("attempted_operation"),
            db_user: row.get("db_user"),
            audit_event_id: row.get("audit_event_id"),
        }
    }
}
