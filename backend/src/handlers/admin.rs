//! Admin handlers: session-scoped audit lookup and demo seeding.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use shared::dtos::audit::AuditEventResponse;
use shared::models::enums::UserRole;

use crate::auth::Principal;
use crate::errors::{ApiError, ApiResult};
use crate::models::AuditViolation;
use crate::services::{audit, seed};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionParams {
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedParams {
    pub force: Option<bool>,
}

/// `GET /api/admin/audit?session_id=` - every event written under one
/// chat/session id, for trace correlation.
pub async fn audit_by_session(
    principal: Principal,
    params: web::Query<SessionParams>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Admin])?;
    let session_id = params
        .session_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::validation("session_id", "session_id is required"))?;

    let events = audit::events_by_session(&data.lending_pool, session_id).await?;
    let responses: Vec<AuditEventResponse> = events.iter().map(|e| e.to_response()).collect();
    Ok(HttpResponse::Ok().json(responses))
}

/// `GET /api/admin/audit-violations` - attempted mutations of the audit
/// trail, as recorded by the database trigger.
pub async fn audit_violations(
    principal: Principal,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Admin, UserRole::Ceo])?;
    let rows = sqlx::query("SELECT * FROM audit_violations ORDER BY id")
        .fetch_all(&data.lending_pool)
        .await?;
    let violations: Vec<AuditViolation> = rows.iter().map(AuditViolation::from_row).collect();
    Ok(HttpResponse::Ok().json(violations))
}

/// `POST /api/admin/seed-demo?force=` - idempotent demo portfolio.
pub async fn seed_demo(
    principal: Principal,
    params: web::Query<SeedParams>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Admin])?;
    let result = seed::seed_demo(
        &data.lending_pool,
        &principal,
        params.force.unwrap_or(false),
    )
    .await?;
    Ok(HttpResponse::Ok().json(result))
}
