//! Decision handlers.
//!
//! # Endpoints
//!
//! - `POST /api/applications/{id}/decisions` - Render a decision (UW)
//! - `POST /api/applications/{id}/decisions/propose` - Write-free preview
//! - `GET /api/applications/{id}/decisions` - List decisions
//! - `GET /api/applications/{id}/decisions/{did}` - Fetch one decision

use actix_web::{web, HttpResponse};

use shared::dtos::decisions::RenderDecisionRequest;
use shared::models::enums::UserRole;

use crate::auth::Principal;
use crate::errors::{ApiError, ApiResult};
use crate::models::Decision;
use crate::services::{decisions, scope};
use crate::AppState;

pub async fn render_decision(
    principal: Principal,
    path: web::Path<i64>,
    body: web::Json<RenderDecisionRequest>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    let decision =
        decisions::render_decision(&data.lending_pool, &principal, &app, &body).await?;
    Ok(HttpResponse::Created().json(decision.to_response()))
}

pub async fn propose_decision(
    principal: Principal,
    path: web::Path<i64>,
    body: web::Json<RenderDecisionRequest>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Underwriter, UserRole::Admin])?;
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    let preview =
        decisions::propose_decision(&data.lending_pool, &principal, &app, &body).await?;
    Ok(HttpResponse::Ok().json(preview))
}

pub async fn list_decisions(
    principal: Principal,
    path: web::Path<i64>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    let rows = sqlx::query("SELECT * FROM decisions WHERE application_id = $1 ORDER BY id")
        .bind(app.id)
        .fetch_all(&data.lending_pool)
        .await?;
    let items: Vec<_> = rows
        .iter()
        .map(|row| Decision::from_row(row).to_response())
        .collect();
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_decision(
    principal: Principal,
    path: web::Path<(i64, i64)>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let (application_id, decision_id) = path.into_inner();
    let app = scope::fetch_application_scoped(
        &data.lending_pool,
        &principal.data_scope,
        application_id,
    )
    .await?;
    let row = sqlx::query("SELECT * FROM decisions WHERE id = $1 AND application_id = $2")
        .bind(decision_id)
        .bind(app.id)
        .fetch_optional(&data.lending_pool)
        .await?
        .ok_or(ApiError::NotFound("decision"))?;
    Ok(HttpResponse::Ok().json(Decision::from_row(&row).to_response()))
}
