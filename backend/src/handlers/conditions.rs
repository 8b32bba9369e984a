//! Underwriting condition handlers.
//!
//! # Endpoints
//!
//! - `GET /api/applications/{id}/conditions?open_only=` - List conditions
//! - `POST /api/applications/{id}/conditions` - Issue a condition (UW)
//! - `POST /api/applications/{id}/conditions/{cid}/respond` - Borrower response
//! - `POST /api/applications/{id}/conditions/{cid}/action` - UW review action

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use shared::dtos::conditions::{
    ConditionActionRequest, CreateConditionRequest, RespondConditionRequest,
};
use shared::models::enums::UserRole;

use crate::auth::Principal;
use crate::errors::ApiResult;
use crate::services::{conditions, lifecycle, scope};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub open_only: Option<bool>,
}

pub async fn list_conditions(
    principal: Principal,
    path: web::Path<i64>,
    params: web::Query<ListParams>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    let items = conditions::list_conditions(
        &data.lending_pool,
        app.id,
        params.open_only.unwrap_or(false),
    )
    .await?;
    let responses: Vec<_> = items.iter().map(|c| c.to_response()).collect();
    Ok(HttpResponse::Ok().json(responses))
}

pub async fn create_condition(
    principal: Principal,
    path: web::Path<i64>,
    body: web::Json<CreateConditionRequest>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Underwriter, UserRole::Admin])?;
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    lifecycle::ensure_not_terminal(&app)?;

    let condition =
        conditions::create_condition(&data.lending_pool, &principal, app.id, &body).await?;
    Ok(HttpResponse::Created().json(condition.to_response()))
}

pub async fn respond_condition(
    principal: Principal,
    path: web::Path<(i64, i64)>,
    body: web::Json<RespondConditionRequest>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Borrower, UserRole::LoanOfficer, UserRole::Admin])?;
    let (application_id, condition_id) = path.into_inner();
    let app = scope::fetch_application_scoped(
        &data.lending_pool,
        &principal.data_scope,
        application_id,
    )
    .await?;
    lifecycle::ensure_not_terminal(&app)?;

    let condition = conditions::respond(
        &data.lending_pool,
        &principal,
        app.id,
        condition_id,
        &body.response_text,
    )
    .await?;
    Ok(HttpResponse::Ok().json(condition.to_response()))
}

pub async fn condition_action(
    principal: Principal,
    path: web::Path<(i64, i64)>,
    body: web::Json<ConditionActionRequest>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let (application_id, condition_id) = path.into_inner();
    let app = scope::fetch_application_scoped(
        &data.lending_pool,
        &principal.data_scope,
        application_id,
    )
    .await?;
    lifecycle::ensure_not_terminal(&app)?;

    let condition = conditions::review_action(
        &data.lending_pool,
        &principal,
        app.id,
        condition_id,
        &body.action,
        body.waiver_rationale.as_deref(),
        body.note.as_deref(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(condition.to_response()))
}
