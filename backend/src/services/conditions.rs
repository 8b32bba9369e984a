//! Underwriting condition lifecycle.
//!
//! open -> responded -> under_review -> cleared, with a return path that
//! re-opens the condition and bumps its iteration count. Waivers are
//! restricted to late-lifecycle severities and always carry a rationale.
//! Every action leaves an audit event.

use sqlx::{PgPool, Postgres, Transaction};

use shared::dtos::conditions::CreateConditionRequest;
use shared::models::enums::{ConditionStatus, UserRole};

use crate::auth::Principal;
use crate::errors::{ApiError, ApiResult};
use crate::models::Condition;
use crate::services::audit::{write_audit_event, AuditDraft};

async fn load_condition(
    tx: &mut Transaction<'_, Postgres>,
    application_id: i64,
    condition_id: i64,
) -> ApiResult<Condition> {
    let row = sqlx::query(
        "SELECT * FROM conditions WHERE id = $1 AND application_id = $2 FOR UPDATE",
    )
    .bind(condition_id)
    .bind(application_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(ApiError::NotFound("condition"))?;
    Ok(Condition::from_row(&row))
}

pub async fn create_condition(
    pool: &PgPool,
    principal: &Principal,
    application_id: i64,
    request: &CreateConditionRequest,
) -> ApiResult<Condition> {
    if request.description.trim().is_empty() {
        return Err(ApiError::validation("description", "description is required"));
    }

    let mut tx = pool.begin().await?;
    let row = sqlx::query(
        "INSERT INTO conditions (application_id, description, severity, due_date, issued_by) \
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(application_id)
    .bind(request.description.trim())
    .bind(request.severity.as_str())
    .bind(request.due_date)
    .bind(&principal.user_id)
    .fetch_one(&mut *tx)
    .await?;
    let condition = Condition::from_row(&row);

    write_audit_event(
        &mut tx,
        AuditDraft::new("condition_issued")
            .user(&principal.user_id, principal.role.as_str())
            .application(application_id)
            .data(serde_json::json!({
                "condition_id": condition.id,
                "severity": condition.severity.as_str(),
            })),
    )
    .await?;
    tx.commit().await?;
    Ok(condition)
}

/// Borrower responds to an open (or returned) condition.
pub async fn respond(
    pool: &PgPool,
    principal: &Principal,
    application_id: i64,
    condition_id: i64,
    response_text: &str,
) -> ApiResult<Condition> {
    if response_text.trim().is_empty() {
        return Err(ApiError::validation("response_text", "a response is required"));
    }

    let mut tx = pool.begin().await?;
    let condition = load_condition(&mut tx, application_id, condition_id).await?;
    if condition.status != ConditionStatus::Open {
        return Err(ApiError::precondition(
            "invalid_condition_state",
            format!("condition is '{}', only open conditions accept responses", condition.status),
        ));
    }

    // Responses accumulate across iterations rather than replacing each
    // other.
    let combined = match &condition.response_text {
        Some(previous) if !previous.is_empty() => {
            format!("{}\n---\n{}", previous, response_text.trim())
        }
        _ => response_text.trim().to_string(),
    };

    let row = sqlx::query(
        "UPDATE conditions SET status = 'responded', response_text = $1, updated_at = now() \
         WHERE id = $2 RETURNING *",
    )
    .bind(&combined)
    .bind(condition_id)
    .fetch_one(&mut *tx)
    .await?;
    let updated = Condition::from_row(&row);

    write_audit_event(
        &mut tx,
        AuditDraft::new("condition_response")
            .user(&principal.user_id, principal.role.as_str())
            .application(application_id)
            .data(serde_json::json!({"condition_id": condition_id})),
    )
    .await?;
    tx.commit().await?;
    Ok(updated)
}

/// Underwriter actions over the review half of the machine.
pub async fn review_action(
    pool: &PgPool,
    principal: &Principal,
    application_id: i64,
    condition_id: i64,
    action: &str,
    waiver_rationale: Option<&str>,
    note: Option<&str>,
) -> ApiResult<Condition> {
    principal.require_role(&[UserRole::Underwriter, UserRole::Admin])?;

    let mut tx = pool.begin().await?;
    let condition = load_condition(&mut tx, application_id, condition_id).await?;

    let (sql_update, event_type, event_data) = match action {
        "review" => {
            if condition.status != ConditionStatus::Responded {
                return Err(ApiError::precondition(
                    "invalid_condition_state",
                    "only responded conditions can move under review",
                ));
            }
            (
                sqlx::query(
                    "UPDATE conditions SET status = 'under_review', updated_at = now() \
                     WHERE id = $1 RETURNING *",
                )
                .bind(condition_id),
                "condition_review",
                serde_json::json!({"condition_id": condition_id}),
            )
        }
        "clear" => {
            if condition.status != ConditionStatus::UnderReview {
                return Err(ApiError::precondition(
                    "invalid_condition_state",
                    "only conditions under review can be cleared",
                ));
            }
            (
                sqlx::query(
                    "UPDATE conditions SET status = 'cleared', cleared_by = $1, updated_at = now() \
                     WHERE id = $2 RETURNING *",
                )
                .bind(&principal.user_id)
                .bind(condition_id),
                "condition_cleared",
                serde_json::json!({"condition_id": condition_id}),
            )
        }
        "return" => {
            if condition.status != ConditionStatus::UnderReview {
                return Err(ApiError::precondition(
                    "invalid_condition_state",
                    "only conditions under review can be returned",
                ));
            }
            let appended = match (&condition.response_text, note) {
                (Some(previous), Some(note)) => {
                    format!("{}\n[returned: {}]", previous, note.trim())
                }
                (Some(previous), None) => previous.clone(),
                (None, Some(note)) => format!("[returned: {}]", note.trim()),
                (None, None) => String::new(),
            };
            (
                sqlx::query(
                    "UPDATE conditions SET status = 'open', iteration_count = iteration_count + 1, \
                     response_text = $1, updated_at = now() \
                     WHERE id = $2 RETURNING *",
                )
                .bind(appended)
                .bind(condition_id),
                "condition_returned",
                serde_json::json!({
                    "condition_id": condition_id,
                    "iteration": condition.iteration_count + 1,
                }),
            )
        }
        "waive" => {
            if !matches!(
                condition.status,
                ConditionStatus::Open | ConditionStatus::UnderReview
            ) {
                return Err(ApiError::precondition(
                    "invalid_condition_state",
                    "only open or under-review conditions can be waived",
                ));
            }
            if !condition.severity.is_waivable() {
                return Err(ApiError::precondition(
                    "severity_not_waivable",
                    format!("'{}' conditions cannot be waived", condition.severity),
                ));
            }
            let rationale = waiver_rationale
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| {
                    ApiError::validation("waiver_rationale", "a waiver rationale is required")
                })?;
            (
                sqlx::query(
                    "UPDATE conditions SET status = 'waived', waiver_rationale = $1, \
                     cleared_by = $2, updated_at = now() \
                     WHERE id = $3 RETURNING *",
                )
                .bind(rationale)
                .bind(&principal.user_id)
                .bind(condition_id),
                "condition_waived",
                serde_json::json!({
                    "condition_id": condition_id,
                    "severity": condition.severity.as_str(),
                }),
            )
        }
        "escalate" => {
            if condition.status.is_terminal() {
                return Err(ApiError::precondition(
                    "invalid_condition_state",
                    "terminal conditions cannot be escalated",
                ));
            }
            (
                sqlx::query(
                    "UPDATE conditions SET status = 'escalated', updated_at = now() \
                     WHERE id = $1 RETURNING *",
                )
                .bind(condition_id),
                "condition_escalated",
                serde_json::json!({"condition_id": condition_id}),
            )
        }
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown condition action '{}'",
                other
            )));
        }
    };

    let row = sql_update.fetch_one(&mut *tx).await?;
    let updated = Condition::from_row(&row);

    write_audit_event(
        &mut tx,
        AuditDraft::new(event_type)
            .user(&principal.user_id, principal.role.as_str())
            .application(application_id)
            .data(event_data),
    )
    .await?;
    tx.commit().await?;
    Ok(updated)
}

/// Conditions still blocking an approval (anything not cleared/waived).
pub async fn outstanding_count(pool: &PgPool, application_id: i64) -> ApiResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM conditions \
         WHERE application_id = $1 AND status NOT IN ('cleared', 'waived')",
    )
    .bind(application_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn list_conditions(
    pool: &PgPool,
    application_id: i64,
    open_only: bool,
) -> ApiResult<Vec<Condition>> {
    let sql = if open_only {
        "SELECT * FROM conditions WHERE application_id = $1 \
         AND status NOT IN ('cleared', 'waived') ORDER BY id"
    } else {
        "SELECT * FROM conditions WHERE application_id = $1 ORDER BY id"
    };
    let rows = sqlx::query(sql).bind(application_id).fetch_all(pool).await?;
    Ok(rows.iter().map(Condition::from_row).collect())
}
