//! Audit query, verification and export handlers.
//!
//! Verification answers 200 whether the chain is intact or not; a
//! TAMPERED verdict is a result for the auditor, not a server error.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use shared::dtos::audit::{AuditEventResponse, DecisionTraceResponse};
use shared::models::enums::UserRole;

use crate::auth::Principal;
use crate::errors::{ApiError, ApiResult};
use crate::models::Decision;
use crate::services::{audit, scope};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub event_type: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub fmt: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub event_type: Option<String>,
    pub limit: Option<i64>,
}

/// `GET /api/audit/verify`
pub async fn verify(principal: Principal, data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Admin, UserRole::Ceo, UserRole::Underwriter])?;
    let result = audit::verify_chain(&data.lending_pool).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// `GET /api/audit/events` - time range and event-type filtered query.
pub async fn list_events(
    principal: Principal,
    params: web::Query<RangeParams>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Admin, UserRole::Ceo])?;
    let events = audit::events_in_range(
        &data.lending_pool,
        params.from,
        params.to,
        params.event_type.as_deref(),
        params.limit.unwrap_or(500).clamp(1, 10_000),
    )
    .await?;
    let responses: Vec<AuditEventResponse> = events.iter().map(|e| e.to_response()).collect();
    Ok(HttpResponse::Ok().json(responses))
}

/// `GET /api/applications/{id}/audit` - events for one application,
/// scope-checked like every other application read.
pub async fn events_for_application(
    principal: Principal,
    path: web::Path<i64>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Admin, UserRole::Underwriter, UserRole::LoanOfficer])?;
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    let events = audit::events_for_application(&data.lending_pool, app.id).await?;
    let responses: Vec<AuditEventResponse> = events.iter().map(|e| e.to_response()).collect();
    Ok(HttpResponse::Ok().json(responses))
}

/// `GET /api/audit/decisions/{decision_id}/trace`
pub async fn decision_trace(
    principal: Principal,
    path: web::Path<i64>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Admin, UserRole::Underwriter, UserRole::Ceo])?;

    let row = sqlx::query("SELECT * FROM decisions WHERE id = $1")
        .bind(*path)
        .fetch_optional(&data.lending_pool)
        .await?
        .ok_or(ApiError::NotFound("decision"))?;
    let decision = Decision::from_row(&row);

    // Scope still applies through the owning application.
    scope::fetch_application_scoped(
        &data.lending_pool,
        &principal.data_scope,
        decision.application_id,
    )
    .await?;

    let events = audit::events_for_application(&data.lending_pool, decision.application_id).await?;
    let mut events_by_type: HashMap<String, Vec<AuditEventResponse>> = HashMap::new();
    for event in &events {
        events_by_type
            .entry(event.event_type.clone())
            .or_default()
            .push(event.to_response());
    }

    Ok(HttpResponse::Ok().json(DecisionTraceResponse {
        decision_id: decision.id,
        application_id: decision.application_id,
        decision_type: decision.decision_type.as_str().to_string(),
        decided_by: decision.decided_by.clone(),
        decided_at: decision.created_at,
        events_by_type,
    }))
}

/// `GET /api/audit/export?fmt=json|csv`
pub async fn export(
    principal: Principal,
    params: web::Query<ExportParams>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Admin, UserRole::Ceo])?;
    let events = audit::events_in_range(
        &data.lending_pool,
        params.from,
        params.to,
        params.event_type.as_deref(),
        params.limit.unwrap_or(10_000).clamp(1, 100_000),
    )
    .await?;

    match params.fmt.as_deref().unwrap_or("json") {
        "csv" => {
            let csv = audit::export_csv(&events)?;
            Ok(HttpResponse::Ok()
                .content_type("text/csv")
                .insert_header((
                    "Content-Disposition",
                    "attachment; filename=\"audit_export.csv\"",
                ))
                .body(csv))
        }
        "json" => {
            let responses: Vec<AuditEventResponse> =
                events.iter().map(|e| e.to_response()).collect();
            Ok(HttpResponse::Ok()
                .insert_header((
                    "Content-Disposition",
                    "attachment; filename=\"audit_export.json\"",
                ))
                .json(responses))
        }
        other => Err(ApiError::validation(
            "fmt",
            format!("unknown export format '{}'", other),
        )),
    }
}
