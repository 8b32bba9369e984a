//! Compliance check handlers.
//!
//! Running the checks persists a `compliance_check` audit event whose
//! recorded verdict later gates approval decisions.

use actix_web::{web, HttpResponse};
use rust_decimal::Decimal;

use shared::models::enums::UserRole;

use crate::auth::Principal;
use crate::errors::ApiResult;
use crate::models::{ApplicationFinancials, Document};
use crate::services::audit::{write_audit_event, AuditDraft};
use crate::services::completeness::atr_qm_doc_presence;
use crate::services::compliance::checks::{
    check_atr_qm, check_ecoa, check_trid, run_all_checks, ComplianceRunResult,
};
use crate::services::scope;
use crate::AppState;

async fn run_checks_for(
    data: &web::Data<AppState>,
    app: &crate::models::Application,
) -> ApiResult<ComplianceRunResult> {
    let rows = sqlx::query("SELECT * FROM application_financials WHERE application_id = $1")
        .bind(app.id)
        .fetch_all(&data.lending_pool)
        .await?;
    let financials: Vec<ApplicationFinancials> =
        rows.iter().map(ApplicationFinancials::from_row).collect();

    let total_income: Decimal = financials
        .iter()
        .filter_map(|f| f.gross_monthly_income)
        .sum();
    let total_debts: Decimal = financials.iter().filter_map(|f| f.monthly_debts).sum();
    let dti = if total_income > Decimal::ZERO {
        Some((total_debts / total_income).round_dp(4))
    } else {
        None
    };

    let rows = sqlx::query("SELECT * FROM documents WHERE application_id = $1")
        .bind(app.id)
        .fetch_all(&data.lending_pool)
        .await?;
    let documents: Vec<Document> = rows.iter().map(Document::from_row).collect();
    let (has_income_docs, has_asset_docs, has_employment_docs) = atr_qm_doc_presence(&documents);

    Ok(run_all_checks(
        check_ecoa(false),
        check_atr_qm(dti, has_income_docs, has_asset_docs, has_employment_docs),
        check_trid(
            app.le_delivery_date,
            app.created_at,
            app.cd_delivery_date,
            app.closing_date,
        ),
    ))
}

/// `POST /api/applications/{id}/compliance-check`
pub async fn run_compliance_check(
    principal: Principal,
    path: web::Path<i64>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Underwriter, UserRole::LoanOfficer, UserRole::Admin])?;
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;

    let result = run_checks_for(&data, &app).await?;

    let mut tx = data.lending_pool.begin().await?;
    write_audit_event(
        &mut tx,
        AuditDraft::new("compliance_check")
            .user(&principal.user_id, principal.role.as_str())
            .application(app.id)
            .data(serde_json::json!({
                "overall_status": result.overall_status.as_str(),
                "can_proceed": result.can_proceed,
                "checks": result
                    .checks
                    .iter()
                    .map(|c| serde_json::json!({
                        "regulation": c.regulation,
                        "status": c.status.as_str(),
                    }))
                    .collect::<Vec<_>>(),
            })),
    )
    .await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(result))
}

/// `GET /api/applications/{id}/compliance-check` - recompute without
/// recording; useful for dashboards.
pub async fn get_compliance_check(
    principal: Principal,
    path: web::Path<i64>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[
        UserRole::Underwriter,
        UserRole::LoanOfficer,
        UserRole::Ceo,
        UserRole::Admin,
    ])?;
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    let result = run_checks_for(&data, &app).await?;
    Ok(HttpResponse::Ok().json(result))
}
