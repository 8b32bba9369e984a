//! Application resource handlers.
//!
//! # Endpoints
//!
//! - `POST /api/applications` - Create a new application (with optional intake fields)
//! - `POST /api/applications/start` - Idempotent intake entry point
//! - `GET /api/applications` - List applications visible to the principal
//! - `GET /api/applications/{id}` - Fetch one application with borrowers
//! - `PATCH /api/applications/{id}` - Incremental validated field save
//! - `POST /api/applications/{id}/transition` - Stage transition (staff)
//! - `GET /api/applications/{id}/status` - Stage + pending actions
//! - `POST /api/applications/{id}/borrowers` - Attach a co-borrower
//! - `DELETE /api/applications/{id}/borrowers/{borrower_id}` - Detach
//! - `GET|POST /api/applications/{id}/rate-locks` - Rate locks
//! - `GET /api/applications/{id}/risk` - Risk factors (underwriters)
//!
//! Every read composes the principal's data scope; rows outside the scope
//! answer 404.

use actix_web::{web, HttpResponse};
use chrono::{Duration, Utc};
use log::info;
use serde::Deserialize;
use sqlx::Row;
use std::collections::HashMap;

use shared::dtos::applications::{
    AddBorrowerRequest, ApplicationListResponse, CreateApplicationRequest, CreateRateLockRequest,
    Pagination, StartApplicationResponse, StatusResponse,
};
use shared::models::enums::{ApplicationStage, EmploymentStatus, UserRole};

use crate::auth::Principal;
use crate::errors::{ApiError, ApiResult};
use crate::models::{Application, ApplicationFinancials, RateLock};
use crate::services::compliance::hmda::{snapshot_loan_data, LoanDataSnapshot};
use crate::services::{completeness, conditions, intake, lifecycle, risk, scope};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub from: String,
    pub to: String,
}

fn forbid_ceo(principal: &Principal) -> ApiResult<()> {
    if principal.role == UserRole::Ceo {
        return Err(ApiError::Role(
            "executive access is read-only".to_string(),
        ));
    }
    Ok(())
}

/// Creates a new application for the caller, validating any supplied
/// intake fields. Returns 201 with the application and borrowers.
pub async fn create_application(
    principal: Principal,
    body: web::Json<CreateApplicationRequest>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Borrower, UserRole::Admin])?;
    info!("POST /api/applications - principal {}", principal.user_id);

    let (app, _save) = intake::create_application(&data.lending_pool, &principal, &body).await?;
    let borrowers =
        scope::borrower_summaries(&data.lending_pool, &principal.data_scope, app.id).await?;
    Ok(HttpResponse::Created().json(app.to_response(borrowers)))
}

/// Idempotent intake entry: returns the most recent in-flight application
/// for this principal, or creates a fresh inquiry.
pub async fn start_application(
    principal: Principal,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Borrower, UserRole::Admin])?;

    let (app, is_new) = intake::start_application(&data.lending_pool, &principal).await?;
    let borrowers =
        scope::borrower_summaries(&data.lending_pool, &principal.data_scope, app.id).await?;
    let body = StartApplicationResponse {
        application: app.to_response(borrowers),
        is_new,
    };

    let response = if is_new {
        HttpResponse::Created().json(body)
    } else {
        HttpResponse::Ok().json(body)
    };
    Ok(response)
}

/// Lists applications in scope with offset pagination.
pub async fn list_applications(
    principal: Principal,
    params: web::Query<ListParams>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let offset = params.offset.unwrap_or(0).max(0);
    let limit = params.limit.unwrap_or(20).clamp(1, 100);

    let predicate = scope::application_predicate(&principal.data_scope, 1);
    let next_bind = if predicate.bind.is_some() { 2 } else { 1 };

    let count_sql = format!(
        "SELECT COUNT(*) FROM applications a WHERE {}",
        predicate.clause
    );
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(bind) = &predicate.bind {
        count_query = count_query.bind(bind.clone());
    }
    let total = count_query.fetch_one(&data.lending_pool).await?;

    let list_sql = format!(
        "SELECT a.* FROM applications a WHERE {} \
         ORDER BY a.updated_at DESC OFFSET ${} LIMIT ${}",
        predicate.clause,
        next_bind,
        next_bind + 1
    );
    let mut list_query = sqlx::query(&list_sql);
    if let Some(bind) = &predicate.bind {
        list_query = list_query.bind(bind.clone());
    }
    let rows = list_query
        .bind(offset)
        .bind(limit)
        .fetch_all(&data.lending_pool)
        .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in &rows {
        let app = Application::from_row(row);
        let borrowers =
            scope::borrower_summaries(&data.lending_pool, &principal.data_scope, app.id).await?;
        items.push(app.to_response(borrowers));
    }

    Ok(HttpResponse::Ok().json(ApplicationListResponse {
        pagination: Pagination {
            total,
            offset,
            limit,
            has_more: offset + (items.len() as i64) < total,
        },
        data: items,
    }))
}

pub async fn get_application(
    principal: Principal,
    path: web::Path<i64>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    let borrowers =
        scope::borrower_summaries(&data.lending_pool, &principal.data_scope, app.id).await?;
    Ok(HttpResponse::Ok().json(app.to_response(borrowers)))
}

/// Sparse field save; responds with updated/errors/remaining/corrections.
pub async fn patch_application(
    principal: Principal,
    path: web::Path<i64>,
    body: web::Json<HashMap<String, serde_json::Value>>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    forbid_ceo(&principal)?;
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    let save =
        intake::update_application_fields(&data.lending_pool, &principal, &app, &body).await?;
    Ok(HttpResponse::Ok().json(save))
}

/// Explicit stage transition with the optimistic `from` guard. Submitting
/// a file to underwriting also snapshots the HMDA loan data.
pub async fn transition_application(
    principal: Principal,
    path: web::Path<i64>,
    body: web::Json<TransitionRequest>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[
        UserRole::Borrower,
        UserRole::LoanOfficer,
        UserRole::Underwriter,
        UserRole::Admin,
    ])?;
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;

    let from = ApplicationStage::parse(&body.from)
        .ok_or_else(|| ApiError::validation("from", "unknown stage"))?;
    let to = ApplicationStage::parse(&body.to)
        .ok_or_else(|| ApiError::validation("to", "unknown stage"))?;

    // Borrowers may only withdraw their own file.
    if principal.role == UserRole::Borrower && to != ApplicationStage::Withdrawn {
        return Err(ApiError::Role(
            "borrowers can only withdraw an application".to_string(),
        ));
    }

    let mut tx = data.lending_pool.begin().await?;
    let updated = lifecycle::transition_stage(&mut tx, &principal, app.id, from, to).await?;
    tx.commit().await?;

    if to == ApplicationStage::Underwriting {
        submit_loan_data_snapshot(&data, &principal, &updated).await?;
    }

    let borrowers =
        scope::borrower_summaries(&data.lending_pool, &principal.data_scope, updated.id).await?;
    Ok(HttpResponse::Ok().json(updated.to_response(borrowers)))
}

/// Copies financials and loan metadata into the compliance schema on
/// underwriting submission. Runs after the lending transaction commits so
/// the snapshot reads settled data.
async fn submit_loan_data_snapshot(
    data: &web::Data<AppState>,
    principal: &Principal,
    app: &Application,
) -> ApiResult<()> {
    let rows = sqlx::query("SELECT * FROM application_financials WHERE application_id = $1")
        .bind(app.id)
        .fetch_all(&data.lending_pool)
        .await?;
    let financials: Vec<ApplicationFinancials> =
        rows.iter().map(ApplicationFinancials::from_row).collect();

    let total_income: rust_decimal::Decimal = financials
        .iter()
        .filter_map(|f| f.gross_monthly_income)
        .sum();
    let total_debts: rust_decimal::Decimal =
        financials.iter().filter_map(|f| f.monthly_debts).sum();
    let dti = if total_income > rust_decimal::Decimal::ZERO {
        Some((total_debts / total_income).round_dp(4))
    } else {
        None
    };
    let credit_score = financials.iter().filter_map(|f| f.credit_score).min();

    let rate_row = sqlx::query(
        "SELECT * FROM rate_locks WHERE application_id = $1 AND is_active = TRUE \
         ORDER BY lock_date DESC LIMIT 1",
    )
    .bind(app.id)
    .fetch_optional(&data.lending_pool)
    .await?;
    let interest_rate = rate_row
        .map(|row| RateLock::from_row(&row))
        .filter(|lock| lock.is_currently_active(Utc::now()))
        .map(|lock| lock.locked_rate);

    snapshot_loan_data(
        &data.compliance_pool,
        principal,
        &LoanDataSnapshot {
            application_id: app.id,
            gross_monthly_income: if total_income > rust_decimal::Decimal::ZERO {
                Some(total_income)
            } else {
                None
            },
            dti_ratio: dti,
            credit_score,
            loan_type: app.loan_type.map(|l| l.as_str().to_string()),
            loan_purpose: Some("purchase".to_string()),
            property_location: app.property_address.clone(),
            interest_rate,
            total_fees: None,
        },
    )
    .await
}

/// Stage plus what the caller should do next.
pub async fn get_status(
    principal: Principal,
    path: web::Path<i64>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;

    let report = completeness::check_completeness(&data.lending_pool, app.id, app.loan_type).await?;
    let missing: Vec<_> = report
        .requirements
        .iter()
        .filter(|r| !r.is_provided)
        .map(|r| r.doc_type)
        .collect();

    let all_conditions = conditions::list_conditions(&data.lending_pool, app.id, false).await?;
    let open: Vec<i64> = all_conditions
        .iter()
        .filter(|c| c.status == shared::models::enums::ConditionStatus::Open)
        .map(|c| c.id)
        .collect();
    let responded: Vec<i64> = all_conditions
        .iter()
        .filter(|c| c.status == shared::models::enums::ConditionStatus::Responded)
        .map(|c| c.id)
        .collect();

    let pending_actions =
        lifecycle::pending_actions(app.stage, principal.role, &missing, &open, &responded);
    Ok(HttpResponse::Ok().json(StatusResponse {
        application_id: app.id,
        stage: app.stage,
        pending_actions,
    }))
}

/// Attaches a co-borrower. 409 when the pair already exists, 404 for an
/// unknown borrower.
pub async fn add_borrower(
    principal: Principal,
    path: web::Path<i64>,
    body: web::Json<AddBorrowerRequest>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    forbid_ceo(&principal)?;
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    lifecycle::ensure_not_terminal(&app)?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM borrowers WHERE id = $1")
        .bind(body.borrower_id)
        .fetch_optional(&data.lending_pool)
        .await?;
    if exists.is_none() {
        return Err(ApiError::NotFound("borrower"));
    }

    let mut tx = data.lending_pool.begin().await?;
    if body.is_primary {
        sqlx::query(
            "UPDATE application_borrowers SET is_primary = FALSE WHERE application_id = $1",
        )
        .bind(app.id)
        .execute(&mut *tx)
        .await?;
    }
    sqlx::query(
        "INSERT INTO application_borrowers (application_id, borrower_id, is_primary) \
         VALUES ($1, $2, $3)",
    )
    .bind(app.id)
    .bind(body.borrower_id)
    .bind(body.is_primary)
    .execute(&mut *tx)
    .await?;

    crate::services::audit::write_audit_event(
        &mut tx,
        crate::services::audit::AuditDraft::new("coborrower_added")
            .user(&principal.user_id, principal.role.as_str())
            .application(app.id)
            .data(serde_json::json!({
                "borrower_id": body.borrower_id,
                "is_primary": body.is_primary,
            })),
    )
    .await?;
    tx.commit().await?;

    let borrowers =
        scope::borrower_summaries(&data.lending_pool, &principal.data_scope, app.id).await?;
    Ok(HttpResponse::Created().json(app.to_response(borrowers)))
}

/// Detaches a co-borrower. The primary borrower and the last remaining
/// borrower cannot be removed.
pub async fn remove_borrower(
    principal: Principal,
    path: web::Path<(i64, i64)>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    forbid_ceo(&principal)?;
    let (application_id, borrower_id) = path.into_inner();
    let app = scope::fetch_application_scoped(
        &data.lending_pool,
        &principal.data_scope,
        application_id,
    )
    .await?;
    lifecycle::ensure_not_terminal(&app)?;

    let row = sqlx::query(
        "SELECT is_primary, \
                (SELECT COUNT(*) FROM application_borrowers WHERE application_id = $1) AS total \
         FROM application_borrowers WHERE application_id = $1 AND borrower_id = $2",
    )
    .bind(application_id)
    .bind(borrower_id)
    .fetch_optional(&data.lending_pool)
    .await?
    .ok_or(ApiError::NotFound("application borrower"))?;
    let is_primary: bool = row.get("is_primary");
    let total: i64 = row.get("total");

    if is_primary {
        return Err(ApiError::BadRequest(
            "the primary borrower cannot be removed".to_string(),
        ));
    }
    if total <= 1 {
        return Err(ApiError::BadRequest(
            "an application must keep at least one borrower".to_string(),
        ));
    }

    let mut tx = data.lending_pool.begin().await?;
    sqlx::query("DELETE FROM application_borrowers WHERE application_id = $1 AND borrower_id = $2")
        .bind(application_id)
        .bind(borrower_id)
        .execute(&mut *tx)
        .await?;
    crate::services::audit::write_audit_event(
        &mut tx,
        crate::services::audit::AuditDraft::new("coborrower_removed")
            .user(&principal.user_id, principal.role.as_str())
            .application(application_id)
            .data(serde_json::json!({"borrower_id": borrower_id})),
    )
    .await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "borrower removed",
        "borrower_id": borrower_id,
    })))
}

pub async fn list_rate_locks(
    principal: Principal,
    path: web::Path<i64>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    let rows =
        sqlx::query("SELECT * FROM rate_locks WHERE application_id = $1 ORDER BY lock_date DESC")
            .bind(app.id)
            .fetch_all(&data.lending_pool)
            .await?;
    let now = Utc::now();
    let locks: Vec<_> = rows
        .iter()
        .map(|row| RateLock::from_row(row).to_response(now))
        .collect();
    Ok(HttpResponse::Ok().json(locks))
}

/// Locks a rate; any previously active lock is deactivated.
pub async fn create_rate_lock(
    principal: Principal,
    path: web::Path<i64>,
    body: web::Json<CreateRateLockRequest>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::LoanOfficer, UserRole::Underwriter, UserRole::Admin])?;
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    lifecycle::ensure_not_terminal(&app)?;

    if body.locked_rate <= rust_decimal::Decimal::ZERO {
        return Err(ApiError::validation("locked_rate", "rate must be positive"));
    }
    let lock_days = body.lock_days.unwrap_or(30).clamp(1, 365);
    let now = Utc::now();
    let expiration = now + Duration::days(lock_days);

    let mut tx = data.lending_pool.begin().await?;
    sqlx::query("UPDATE rate_locks SET is_active = FALSE WHERE application_id = $1")
        .bind(app.id)
        .execute(&mut *tx)
        .await?;
    let row = sqlx::query(
        "INSERT INTO rate_locks (application_id, locked_rate, lock_date, expiration_date) \
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(app.id)
    .bind(body.locked_rate)
    .bind(now)
    .bind(expiration)
    .fetch_one(&mut *tx)
    .await?;
    let lock = RateLock::from_row(&row);

    crate::services::audit::write_audit_event(
        &mut tx,
        crate::services::audit::AuditDraft::new("rate_locked")
            .user(&principal.user_id, principal.role.as_str())
            .application(app.id)
            .data(serde_json::json!({
                "locked_rate": lock.locked_rate.to_string(),
                "expiration_date": lock.expiration_date.to_rfc3339(),
            })),
    )
    .await?;
    tx.commit().await?;

    Ok(HttpResponse::Created().json(lock.to_response(now)))
}

/// Risk factors for underwriting review.
pub async fn get_risk(
    principal: Principal,
    path: web::Path<i64>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Underwriter, UserRole::LoanOfficer, UserRole::Admin])?;
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;

    let rows = sqlx::query("SELECT * FROM application_financials WHERE application_id = $1")
        .bind(app.id)
        .fetch_all(&data.lending_pool)
        .await?;
    let financials: Vec<ApplicationFinancials> =
        rows.iter().map(ApplicationFinancials::from_row).collect();

    let borrower_rows = sqlx::query(
        "SELECT ab.is_primary, b.employment_status FROM application_borrowers ab \
         INNER JOIN borrowers b ON ab.borrower_id = b.id WHERE ab.application_id = $1",
    )
    .bind(app.id)
    .fetch_all(&data.lending_pool)
    .await?;
    let employment: Vec<(bool, Option<EmploymentStatus>)> = borrower_rows
        .iter()
        .map(|row| {
            let is_primary: bool = row.get("is_primary");
            let status: Option<String> = row.get("employment_status");
            (
                is_primary,
                status.as_deref().and_then(EmploymentStatus::parse),
            )
        })
        .collect();

    let assessment = risk::compute_risk_factors(&app, &financials, &employment);
    Ok(HttpResponse::Ok().json(assessment))
}
