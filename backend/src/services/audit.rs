//! Append-only, hash-chained audit log.
//!
//! Appends are serialized across the whole database by a Postgres
//! advisory lock taken inside the writing transaction; under contention
//! writers queue at the database. The chain links each event to its
//! predecessor with a SHA-256 over a canonical serialization, anchored at
//! the literal sentinel `"genesis"`. Verification is a single ascending
//! scan. The append-only property itself is enforced server-side by the
//! trigger installed in migration 0002; application code never issues
//! UPDATE or DELETE against `audit_events`.

use chrono::SecondsFormat;
use log::debug;
use sha2::{Digest, Sha256};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use shared::dtos::audit::VerifyChainResponse;

use crate::errors::ApiResult;
use crate::models::AuditEvent;

/// Advisory lock key shared by every audit writer. The value spells
/// "auditchn" in ASCII; any stable 64-bit constant would do.
pub const AUDIT_CHAIN_LOCK_KEY: i64 = i64::from_be_bytes(*b"auditchn");

/// Everything a caller supplies for one audit event. The id, timestamp
/// and `prev_hash` are filled in at append time.
#[derive(Debug, Clone, Default)]
pub struct AuditDraft {
    pub event_type: String,
    pub user_id: Option<String>,
    pub user_role: Option<String>,
    pub application_id: Option<i64>,
    pub decision_id: Option<i64>,
    pub session_id: Option<String>,
    pub event_data: Option<serde_json::Value>,
}

impl AuditDraft {
    pub fn new(event_type: &str) -> Self {
        AuditDraft {
            event_type: event_type.to_string(),
            ..Default::default()
        }
    }

    pub fn user(mut self, user_id: &str, user_role: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self.user_role = Some(user_role.to_string());
        self
    }

    pub fn application(mut self, application_id: i64) -> Self {
        self.application_id = Some(application_id);
        self
    }

    pub fn decision(mut self, decision_id: i64) -> Self {
        self.decision_id = Some(decision_id);
        self
    }

    pub fn session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn data(mut self, event_data: serde_json::Value) -> Self {
        self.event_data = Some(event_data);
        self
    }
}

/// JSON with recursively sorted object keys. `event_data` must hash the
/// same bytes no matter how the value was assembled.
fn stable_json(value: &serde_json::Value) -> String {
    fn write(value: &serde_json::Value, out: &mut String) {
        match value {
            serde_json::Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                    out.push(':');
                    write(&map[*key], out);
                }
                out.push('}');
            }
            serde_json::Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }
    let mut out = String::new();
    write(value, &mut out);
    out
}

/// Canonical serialization of an event's public fields, pipe-joined:
/// `id | timestamp | event_type | user_id | user_role | application_id |
/// session_id | event_data`. Absent fields serialize as empty strings;
/// the timestamp is RFC 3339 with microsecond precision.
pub fn canonical(event: &AuditEvent) -> String {
    let data = event
        .event_data
        .as_ref()
        .map(|v| stable_json(v))
        .unwrap_or_default();
    format!(
        "{}|{}|{}|{}|{}|{}|{}|{}",
        event.id,
        event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, false),
        event.event_type,
        event.user_id.as_deref().unwrap_or(""),
        event.user_role.as_deref().unwrap_or(""),
        event
            .application_id
            .map(|id| id.to_string())
            .unwrap_or_default(),
        event.session_id.as_deref().unwrap_or(""),
        data,
    )
}

pub fn compute_hash(event: &AuditEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical(event).as_bytes());
    hex::encode(hasher.finalize())
}

/// Appends one audit event inside the caller's transaction.
///
/// The advisory lock is transaction-scoped: it releases on commit or
/// rollback, so a cancelled request never advances the chain.
pub async fn write_audit_event(
    tx: &mut Transaction<'_, Postgres>,
    draft: AuditDraft,
) -> ApiResult<AuditEvent> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(AUDIT_CHAIN_LOCK_KEY)
        .execute(&mut **tx)
        .await?;

    let last = sqlx::query("SELECT * FROM audit_events ORDER BY id DESC LIMIT 1")
        .fetch_optional(&mut **tx)
        .await?;

    let prev_hash = match last {
        Some(row) => compute_hash(&AuditEvent::from_row(&row)),
        None => "genesis".to_string(),
    };

    let row = sqlx::query(
        "INSERT INTO audit_events \
         (prev_hash, user_id, user_role, event_type, application_id, decision_id, event_data, session_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING *",
    )
    .bind(&prev_hash)
    .bind(&draft.user_id)
    .bind(&draft.user_role)
    .bind(&draft.event_type)
    .bind(draft.application_id)
    .bind(draft.decision_id)
    .bind(&draft.event_data)
    .bind(&draft.session_id)
    .fetch_one(&mut **tx)
    .await?;

    let event = AuditEvent::from_row(&row);
    debug!(
        "Audit event {} ({}) appended, prev_hash={}",
        event.id,
        event.event_type,
        &event.prev_hash[..8.min(event.prev_hash.len())]
    );
    Ok(event)
}

/// Convenience wrapper: one event in its own transaction.
pub async fn write_audit_event_pooled(pool: &PgPool, draft: AuditDraft) -> ApiResult<AuditEvent> {
    let mut tx = pool.begin().await?;
    let event = write_audit_event(&mut tx, draft).await?;
    tx.commit().await?;
    Ok(event)
}

/// Walks the table in ascending id order and re-computes every link.
///
/// `events_checked` counts events whose `prev_hash` verified before the
/// first break; a tampered chain reports the id of the first event whose
/// link no longer matches.
pub async fn verify_chain(pool: &PgPool) -> ApiResult<VerifyChainResponse> {
    let rows = sqlx::query("SELECT * FROM audit_events ORDER BY id ASC")
        .fetch_all(pool)
        .await?;

    let mut expected = "genesis".to_string();
    let mut events_checked: i64 = 0;
    for row in &rows {
        let event = AuditEvent::from_row(row);
        if event.prev_hash != expected {
            return Ok(VerifyChainResponse {
                status: "TAMPERED".to_string(),
                events_checked,
                first_break_id: Some(event.id),
            });
        }
        events_checked += 1;
        expected = compute_hash(&event);
    }

    Ok(VerifyChainResponse {
        status: "OK".to_string(),
        events_checked,
        first_break_id: None,
    })
}

pub async fn events_for_application(pool: &PgPool, application_id: i64) -> ApiResult<Vec<AuditEvent>> {
    let rows = sqlx::query("SELECT * FROM audit_events WHERE application_id = $1 ORDER BY id ASC")
        .bind(application_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(AuditEvent::from_row).collect())
}

pub async fn events_by_session(pool: &PgPool, session_id: &str) -> ApiResult<Vec<AuditEvent>> {
    let rows = sqlx::query("SELECT * FROM audit_events WHERE session_id = $1 ORDER BY id ASC")
        .bind(session_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(AuditEvent::from_row).collect())
}

/// Time-range query with optional event-type filter.
pub async fn events_in_range(
    pool: &PgPool,
    from: Option<chrono::DateTime<chrono::Utc>>,
    to: Option<chrono::DateTime<chrono::Utc>>,
    event_type: Option<&str>,
    limit: i64,
) -> ApiResult<Vec<AuditEvent>> {
    let mut clauses = vec!["TRUE".to_string()];
    let mut bind_index = 1;
    if from.is_some() {
        clauses.push(format!("timestamp >= ${}", bind_index));
        bind_index += 1;
    }
    if to.is_some() {
        clauses.push(format!("timestamp <= ${}", bind_index));
        bind_index += 1;
    }
    if event_type.is_some() {
        clauses.push(format!("event_type = ${}", bind_index));
        bind_index += 1;
    }
    let sql = format!(
        "SELECT * FROM audit_events WHERE {} ORDER BY id ASC LIMIT ${}",
        clauses.join(" AND "),
        bind_index
    );

    let mut query = sqlx::query(&sql);
    if let Some(from) = from {
        query = query.bind(from);
    }
    if let Some(to) = to {
        query = query.bind(to);
    }
    if let Some(event_type) = event_type {
        query = query.bind(event_type.to_string());
    }
    query = query.bind(limit);

    let rows = query.fetch_all(pool).await?;
    Ok(rows.iter().map(AuditEvent::from_row).collect())
}

/// Fixed CSV header for the export endpoint; includes `prev_hash` so an
/// exported file is independently verifiable.
pub const EXPORT_CSV_HEADER: [&str; 10] = [
    "id",
    "timestamp",
    "prev_hash",
    "user_id",
    "user_role",
    "event_type",
    "application_id",
    "decision_id",
    "session_id",
    "event_data",
];

pub fn export_csv(events: &[AuditEvent]) -> ApiResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(EXPORT_CSV_HEADER)
        .map_err(|e| crate::errors::ApiError::Internal(format!("csv write failed: {}", e)))?;
    for event in events {
        writer
            .write_record([
                event.id.to_string(),
                event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, false),
                event.prev_hash.clone(),
                event.user_id.clone().unwrap_or_default(),
                event.user_role.clone().unwrap_or_default(),
                event.event_type.clone(),
                event
                    .application_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                event
                    .decision_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                event.session_id.clone().unwrap_or_default(),
                event
                    .event_data
                    .as_ref()
                    .map(|v| stable_json(v))
                    .unwrap_or_default(),
            ])
            .map_err(|e| crate::errors::ApiError::Internal(format!("csv write failed: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| crate::errors::ApiError::Internal(format!("csv write failed: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| crate::errors::ApiError::Internal(format!("csv not utf-8: {}", e)))
}

/// Most recent compliance-check verdict recorded for an application, read
/// from the audit trail. Approvals gate on this.
pub async fn latest_compliance_status(
    tx: &mut Transaction<'_, Postgres>,
    application_id: i64,
) -> ApiResult<Option<String>> {
    let row: Option<PgRow> = sqlx::query(
        "SELECT event_data->>'overall_status' AS overall_status \
         FROM audit_events \
         WHERE application_id = $1 AND event_type = 'compliance_check' \
         ORDER BY id DESC LIMIT 1",
    )
    .bind(application_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.and_then(|r| r.get("overall_status")))
}

/// Most recent preliminary recommendation produced by the underwriting
/// agent tooling, if any.
pub async fn latest_ai_recommendation(
    tx: &mut Transaction<'_, Postgres>,
    application_id: i64,
) -> ApiResult<Option<String>> {
    let row: Option<PgRow> = sqlx::query(
        "SELECT event_data->>'recommendation' AS recommendation \
         FROM audit_events \
         WHERE application_id = $1 \
           AND event_type = 'tool_call' \
           AND event_data->>'tool' = 'uw_preliminary_recommendation' \
         ORDER BY id DESC LIMIT 1",
    )
    .bind(application_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.and_then(|r| r.get("recommendation")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_event() -> AuditEvent {
        AuditEvent {
            id: 42,
            timestamp: chrono::Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            prev_hash: "genesis".to_string(),
            user_id: Some("prev-user".to_string()),
            user_role: Some("borrower".to_string()),
            event_type: "previous_event".to_string(),
            application_id: Some(10),
            decision_id: None,
            event_data: Some(serde_json::json!({"tool_name": "calc"})),
            session_id: Some("prev-sess-123".to_string()),
        }
    }

    #[test]
    fn canonical_joins_fields_with_pipes() {
        let event = sample_event();
        let c = canonical(&event);
        assert!(c.starts_with("42|2026-01-15T10:00:00.000000+00:00|previous_event|prev-user|borrower|10|prev-sess-123|"));
        assert!(c.ends_with(r#"{"tool_name":"calc"}"#));
    }

    #[test]
    fn canonical_serializes_absent_fields_as_empty() {
        let mut event = sample_event();
        event.user_id = None;
        event.user_role = None;
        event.application_id = None;
        event.session_id = None;
        event.event_data = None;
        let c = canonical(&event);
        assert_eq!(c, "42|2026-01-15T10:00:00.000000+00:00|previous_event|||||");
    }

    #[test]
    fn hash_is_deterministic() {
        let event = sample_event();
        assert_eq!(compute_hash(&event), compute_hash(&event));
        assert_eq!(compute_hash(&event).len(), 64);
    }

    #[test]
    fn hash_changes_with_any_field() {
        let event = sample_event();
        let mut tampered = sample_event();
        tampered.event_data = Some(serde_json::json!({"tool_name": "TAMPERED"}));
        assert_ne!(compute_hash(&event), compute_hash(&tampered));
    }

    #[test]
    fn stable_json_sorts_keys_recursively() {
        let value = serde_json::json!({"z": 1, "a": {"y": 2, "b": [3, {"q": 4, "c": 5}]}});
        assert_eq!(
            stable_json(&value),
            r#"{"a":{"b":[3,{"c":5,"q":4}],"y":2},"z":1}"#
        );
    }

    #[test]
    fn csv_export_has_fixed_header_with_prev_hash() {
        let csv = export_csv(&[sample_event()]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,timestamp,prev_hash,user_id,user_role,event_type,application_id,decision_id,session_id,event_data"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("42,"));
        assert!(row.contains("genesis"));
    }

    #[test]
    fn lock_key_is_stable() {
        assert_eq!(AUDIT_CHAIN_LOCK_KEY, i64::from_be_bytes(*b"auditchn"));
    }
}
