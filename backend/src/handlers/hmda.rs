//! HMDA collection handlers.
//!
//! These handlers talk to the compliance pool exclusively. The scope
//! check for the target application still runs against lending data
//! (SELECT-only for the compliance role), so out-of-scope collection
//! attempts answer 404 like every other read.

use actix_web::{web, HttpResponse};

use shared::dtos::hmda::CollectDemographicsRequest;
use shared::models::enums::UserRole;

use crate::auth::Principal;
use crate::errors::ApiResult;
use crate::errors::ApiError;
use crate::models::{HmdaDemographic, HmdaLoanData};
use crate::services::compliance::hmda;
use crate::services::scope;
use crate::AppState;

/// `POST /api/hmda/collect`
pub async fn collect_demographics(
    principal: Principal,
    body: web::Json<CollectDemographicsRequest>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::LoanOfficer, UserRole::Underwriter, UserRole::Admin])?;
    scope::fetch_application_scoped(
        &data.lending_pool,
        &principal.data_scope,
        body.application_id,
    )
    .await?;

    let response = hmda::upsert_demographics(&data.compliance_pool, &principal, &body).await?;
    Ok(HttpResponse::Created().json(response))
}

/// `GET /api/hmda/demographics/{application_id}`
pub async fn get_demographics(
    principal: Principal,
    path: web::Path<i64>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Underwriter, UserRole::Admin])?;
    scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;

    let rows = sqlx::query("SELECT * FROM hmda.demographics WHERE application_id = $1 ORDER BY id")
        .bind(*path)
        .fetch_all(&data.compliance_pool)
        .await?;
    let records: Vec<HmdaDemographic> = rows.iter().map(HmdaDemographic::from_row).collect();
    Ok(HttpResponse::Ok().json(records))
}

/// `GET /api/hmda/loan-data/{application_id}` - the snapshot taken at
/// underwriting submission.
pub async fn get_loan_data(
    principal: Principal,
    path: web::Path<i64>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Underwriter, UserRole::Admin])?;
    scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;

    let row = sqlx::query("SELECT * FROM hmda.loan_data WHERE application_id = $1")
        .bind(*path)
        .fetch_optional(&data.compliance_pool)
        .await?
        .ok_or(ApiError::NotFound("loan data snapshot"))?;
    Ok(HttpResponse::Ok().json(HmdaLoanData::from_row(&row)))
}
