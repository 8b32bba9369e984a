//! Executive analytics handlers.
//!
//! # Endpoints
//!
//! - `GET /api/analytics/pipeline?days=` - Stage counts, pull-through, turn times
//! - `GET /api/analytics/denial-trends?days=&product=` - Denial rates and reasons

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use shared::models::enums::UserRole;

use crate::auth::Principal;
use crate::errors::ApiResult;
use crate::services::analytics;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PipelineParams {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DenialParams {
    pub days: Option<i64>,
    pub product: Option<String>,
}

pub async fn pipeline(
    principal: Principal,
    params: web::Query<PipelineParams>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Ceo, UserRole::Admin])?;
    let days = params.days.unwrap_or(90).clamp(1, 730);
    let summary = analytics::pipeline_summary(&data.lending_pool, days).await?;
    Ok(HttpResponse::Ok().json(summary))
}

pub async fn denial_trends(
    principal: Principal,
    params: web::Query<DenialParams>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Ceo, UserRole::Admin])?;
    let days = params.days.unwrap_or(180).clamp(1, 730);
    let trends = analytics::denial_trends(
        &data.lending_pool,
        days,
        params.product.as_deref().filter(|p| !p.is_empty()),
    )
    .await?;
    Ok(HttpResponse::Ok().json(trends))
}
