//! Application intake: borrower auto-creation, the idempotent intake
//! entry point, and incremental field saves.
//!
//! Field saves run every value through the per-field validators and
//! report four buckets back to the caller: what was stored, what was
//! rejected (per-field messages), which intake fields are still missing,
//! and which stored values were overwritten (with the old value, so a
//! conversational client can confirm the correction).

use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use std::str::FromStr;

use shared::dtos::applications::{CreateApplicationRequest, FieldCorrection, FieldSaveResponse};
use shared::models::enums::ApplicationStage;

use crate::auth::Principal;
use crate::errors::{ApiError, ApiResult};
use crate::models::{Application, ApplicationFinancials, Borrower};
use crate::services::audit::{write_audit_event, AuditDraft};
use crate::services::intake_validation::validate_field;
use crate::services::lifecycle;
use crate::services::{freshness, lifecycle::ensure_not_terminal};

/// Intake fields tracked for the `remaining` list.
const INTAKE_FIELDS: [&str; 10] = [
    "loan_type",
    "property_address",
    "loan_amount",
    "property_value",
    "ssn",
    "dob",
    "employment_status",
    "gross_monthly_income",
    "monthly_debts",
    "credit_score",
];

/// Fields stored on the application row.
const APPLICATION_FIELDS: [&str; 4] = [
    "loan_type",
    "property_address",
    "loan_amount",
    "property_value",
];

/// Fields stored on the primary borrower.
const BORROWER_FIELDS: [&str; 6] = [
    "ssn",
    "dob",
    "email",
    "employment_status",
    "first_name",
    "last_name",
];

/// Fields stored on the primary borrower's financials row.
const FINANCIAL_FIELDS: [&str; 4] = [
    "gross_monthly_income",
    "monthly_debts",
    "total_assets",
    "credit_score",
];

/// Timeline fields settable by staff through the sparse PATCH.
const DATE_FIELDS: [&str; 3] = ["le_delivery_date", "cd_delivery_date", "closing_date"];

pub async fn find_or_create_borrower(
    tx: &mut Transaction<'_, Postgres>,
    principal: &Principal,
) -> ApiResult<Borrower> {
    let existing = sqlx::query("SELECT * FROM borrowers WHERE subject = $1")
        .bind(&principal.user_id)
        .fetch_optional(&mut **tx)
        .await?;
    if let Some(row) = existing {
        return Ok(Borrower::from_row(&row));
    }

    let (first_name, last_name) = match principal.name.split_once(' ') {
        Some((first, last)) => (first.to_string(), last.to_string()),
        None => (principal.name.clone(), String::new()),
    };
    let row = sqlx::query(
        "INSERT INTO borrowers (subject, first_name, last_name, email) \
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(&principal.user_id)
    .bind(first_name)
    .bind(last_name)
    .bind(&principal.email)
    .fetch_one(&mut **tx)
    .await?;
    info!("Created borrower profile for subject {}", principal.user_id);
    Ok(Borrower::from_row(&row))
}

async fn insert_application(
    tx: &mut Transaction<'_, Postgres>,
    principal: &Principal,
    borrower: &Borrower,
) -> ApiResult<Application> {
    let row = sqlx::query("INSERT INTO applications (stage) VALUES ('inquiry') RETURNING *")
        .fetch_one(&mut **tx)
        .await?;
    let app = Application::from_row(&row);

    sqlx::query(
        "INSERT INTO application_borrowers (application_id, borrower_id, is_primary) \
         VALUES ($1, $2, TRUE)",
    )
    .bind(app.id)
    .bind(borrower.id)
    .execute(&mut **tx)
    .await?;

    write_audit_event(
        tx,
        AuditDraft::new("application_created")
            .user(&principal.user_id, principal.role.as_str())
            .application(app.id)
            .data(serde_json::json!({"borrower_id": borrower.id})),
    )
    .await?;

    Ok(app)
}

/// Creates a new application for the principal, applies any intake fields
/// supplied in the request, and advances inquiry -> application when the
/// core loan fields are all present.
pub async fn create_application(
    pool: &PgPool,
    principal: &Principal,
    request: &CreateApplicationRequest,
) -> ApiResult<(Application, FieldSaveResponse)> {
    let mut tx = pool.begin().await?;
    let borrower = find_or_create_borrower(&mut tx, principal).await?;
    let app = insert_application(&mut tx, principal, &borrower).await?;

    let mut fields: HashMap<String, serde_json::Value> = HashMap::new();
    if let Some(loan_type) = &request.loan_type {
        fields.insert("loan_type".to_string(), serde_json::json!(loan_type));
    }
    if let Some(address) = &request.property_address {
        fields.insert("property_address".to_string(), serde_json::json!(address));
    }
    if let Some(amount) = request.loan_amount {
        fields.insert("loan_amount".to_string(), serde_json::json!(amount.to_string()));
    }
    if let Some(value) = request.property_value {
        fields.insert(
            "property_value".to_string(),
            serde_json::json!(value.to_string()),
        );
    }

    let save = save_fields(&mut tx, principal, app.id, &borrower, &fields).await?;

    // Re-read to observe the saved fields, then advance if intake is far
    // enough along.
    let row = sqlx::query("SELECT * FROM applications WHERE id = $1")
        .bind(app.id)
        .fetch_one(&mut *tx)
        .await?;
    let mut app = Application::from_row(&row);
    if app.loan_type.is_some()
        && app.property_address.is_some()
        && app.loan_amount.is_some()
        && app.property_value.is_some()
    {
        app = lifecycle::transition_stage(
            &mut tx,
            principal,
            app.id,
            ApplicationStage::Inquiry,
            ApplicationStage::Application,
        )
        .await?;
    }

    tx.commit().await?;
    Ok((app, save))
}

/// Idempotent intake entry point: returns the principal's most recent
/// non-terminal application when one exists, otherwise creates a fresh
/// inquiry.
pub async fn start_application(
    pool: &PgPool,
    principal: &Principal,
) -> ApiResult<(Application, bool)> {
    let mut tx = pool.begin().await?;
    let borrower = find_or_create_borrower(&mut tx, principal).await?;

    let existing = sqlx::query(
        "SELECT a.* FROM applications a \
         INNER JOIN application_borrowers ab ON ab.application_id = a.id \
         WHERE ab.borrower_id = $1 AND a.stage NOT IN ('closed', 'denied', 'withdrawn') \
         ORDER BY a.updated_at DESC LIMIT 1",
    )
    .bind(borrower.id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(row) = existing {
        tx.commit().await?;
        return Ok((Application::from_row(&row), false));
    }

    let app = insert_application(&mut tx, principal, &borrower).await?;
    tx.commit().await?;
    Ok((app, true))
}

fn value_as_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_patch_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }
    freshness::parse_date(value)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

async fn current_field_value(
    tx: &mut Transaction<'_, Postgres>,
    field: &str,
    app: &Application,
    borrower: &Borrower,
) -> ApiResult<Option<String>> {
    if APPLICATION_FIELDS.contains(&field) {
        return Ok(match field {
            "loan_type" => app.loan_type.map(|l| l.as_str().to_string()),
            "property_address" => app.property_address.clone(),
            "loan_amount" => app.loan_amount.map(|d| format!("{:.2}", d)),
            "property_value" => app.property_value.map(|d| format!("{:.2}", d)),
            _ => None,
        });
    }
    if BORROWER_FIELDS.contains(&field) {
        return Ok(match field {
            "ssn" => borrower.ssn.clone(),
            "dob" => borrower.dob.map(|d| d.format("%Y-%m-%d").to_string()),
            "email" => Some(borrower.email.clone()),
            "employment_status" => borrower.employment_status.map(|e| e.as_str().to_string()),
            "first_name" => Some(borrower.first_name.clone()),
            "last_name" => Some(borrower.last_name.clone()),
            _ => None,
        });
    }
    if FINANCIAL_FIELDS.contains(&field) {
        let row = sqlx::query(
            "SELECT * FROM application_financials WHERE application_id = $1 AND borrower_id = $2",
        )
        .bind(app.id)
        .bind(borrower.id)
        .fetch_optional(&mut **tx)
        .await?;
        let financials = row.map(|r| ApplicationFinancials::from_row(&r));
        return Ok(financials.and_then(|f| match field {
            "gross_monthly_income" => f.gross_monthly_income.map(|d| format!("{:.2}", d)),
            "monthly_debts" => f.monthly_debts.map(|d| format!("{:.2}", d)),
            "total_assets" => f.total_assets.map(|d| format!("{:.2}", d)),
            "credit_score" => f.credit_score.map(|s| s.to_string()),
            _ => None,
        }));
    }
    if DATE_FIELDS.contains(&field) {
        return Ok(match field {
            "le_delivery_date" => app.le_delivery_date.map(|d| d.to_rfc3339()),
            "cd_delivery_date" => app.cd_delivery_date.map(|d| d.to_rfc3339()),
            "closing_date" => app.closing_date.map(|d| d.to_rfc3339()),
            _ => None,
        });
    }
    Ok(None)
}

async fn apply_application_field(
    tx: &mut Transaction<'_, Postgres>,
    app_id: i64,
    field: &str,
    value: &str,
) -> ApiResult<()> {
    match field {
        "loan_type" | "property_address" => {
            let sql = format!("UPDATE applications SET {} = $1, updated_at = now() WHERE id = $2", field);
            sqlx::query(&sql).bind(value).bind(app_id).execute(&mut **tx).await?;
        }
        "loan_amount" | "property_value" => {
            let amount = Decimal::from_str(value)
                .map_err(|_| ApiError::Internal("validated amount failed to parse".to_string()))?;
            let sql = format!("UPDATE applications SET {} = $1, updated_at = now() WHERE id = $2", field);
            sqlx::query(&sql).bind(amount).bind(app_id).execute(&mut **tx).await?;
        }
        _ => {}
    }
    Ok(())
}

async fn apply_borrower_field(
    tx: &mut Transaction<'_, Postgres>,
    borrower_id: i64,
    field: &str,
    value: &str,
) -> ApiResult<()> {
    match field {
        "dob" => {
            let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map_err(|_| ApiError::Internal("validated date failed to parse".to_string()))?;
            sqlx::query("UPDATE borrowers SET dob = $1, updated_at = now() WHERE id = $2")
                .bind(date)
                .bind(borrower_id)
                .execute(&mut **tx)
                .await?;
        }
        "ssn" | "email" | "employment_status" | "first_name" | "last_name" => {
            let sql = format!("UPDATE borrowers SET {} = $1, updated_at = now() WHERE id = $2", field);
            sqlx::query(&sql).bind(value).bind(borrower_id).execute(&mut **tx).await?;
        }
        _ => {}
    }
    Ok(())
}

async fn apply_financial_field(
    tx: &mut Transaction<'_, Postgres>,
    app_id: i64,
    borrower_id: i64,
    field: &str,
    value: &str,
) -> ApiResult<()> {
    sqlx::query(
        "INSERT INTO application_financials (application_id, borrower_id) VALUES ($1, $2) \
         ON CONFLICT (application_id, borrower_id) DO NOTHING",
    )
    .bind(app_id)
    .bind(borrower_id)
    .execute(&mut **tx)
    .await?;

    match field {
        "credit_score" => {
            let score: i32 = value
                .parse()
                .map_err(|_| ApiError::Internal("validated score failed to parse".to_string()))?;
            sqlx::query(
                "UPDATE application_financials SET credit_score = $1, updated_at = now() \
                 WHERE application_id = $2 AND borrower_id = $3",
            )
            .bind(score)
            .bind(app_id)
            .bind(borrower_id)
            .execute(&mut **tx)
            .await?;
        }
        "gross_monthly_income" | "monthly_debts" | "total_assets" => {
            let amount = Decimal::from_str(value)
                .map_err(|_| ApiError::Internal("validated amount failed to parse".to_string()))?;
            let sql = format!(
                "UPDATE application_financials SET {} = $1, updated_at = now() \
                 WHERE application_id = $2 AND borrower_id = $3",
                field
            );
            sqlx::query(&sql)
                .bind(amount)
                .bind(app_id)
                .bind(borrower_id)
                .execute(&mut **tx)
                .await?;
        }
        _ => {}
    }
    Ok(())
}

async fn recompute_dti(
    tx: &mut Transaction<'_, Postgres>,
    app_id: i64,
    borrower_id: i64,
) -> ApiResult<()> {
    let row = sqlx::query(
        "SELECT gross_monthly_income, monthly_debts FROM application_financials \
         WHERE application_id = $1 AND borrower_id = $2",
    )
    .bind(app_id)
    .bind(borrower_id)
    .fetch_optional(&mut **tx)
    .await?;
    let Some(row) = row else { return Ok(()) };

    let income: Option<Decimal> = row.get("gross_monthly_income");
    let debts: Option<Decimal> = row.get("monthly_debts");
    let dti = match (income, debts) {
        (Some(income), Some(debts)) if income > Decimal::ZERO => {
            Some((debts / income).round_dp(4))
        }
        _ => None,
    };

    sqlx::query(
        "UPDATE application_financials SET dti_ratio = $1 \
         WHERE application_id = $2 AND borrower_id = $3",
    )
    .bind(dti)
    .bind(app_id)
    .bind(borrower_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn save_fields(
    tx: &mut Transaction<'_, Postgres>,
    principal: &Principal,
    app_id: i64,
    borrower: &Borrower,
    fields: &HashMap<String, serde_json::Value>,
) -> ApiResult<FieldSaveResponse> {
    let row = sqlx::query("SELECT * FROM applications WHERE id = $1")
        .bind(app_id)
        .fetch_one(&mut **tx)
        .await?;
    let app = Application::from_row(&row);

    let mut updated = Vec::new();
    let mut errors = HashMap::new();
    let mut corrections = HashMap::new();
    let mut touched_financials = false;

    for (field, raw) in fields {
        let Some(value) = value_as_string(raw) else {
            errors.insert(field.clone(), "value must be a string or number".to_string());
            continue;
        };

        // Staff timeline fields bypass the intake validators but still
        // parse through the tolerant date parser.
        if DATE_FIELDS.contains(&field.as_str()) {
            let Some(parsed) = parse_patch_date(&value) else {
                errors.insert(field.clone(), "unrecognized date format".to_string());
                continue;
            };
            let old = current_field_value(tx, field, &app, borrower).await?;
            let sql = format!("UPDATE applications SET {} = $1, updated_at = now() WHERE id = $2", field);
            sqlx::query(&sql).bind(parsed).bind(app_id).execute(&mut **tx).await?;
            if let Some(old) = old {
                corrections.insert(
                    field.clone(),
                    FieldCorrection {
                        old,
                        new: parsed.to_rfc3339(),
                    },
                );
            }
            updated.push(field.clone());
            continue;
        }

        if field == "assigned_to" {
            sqlx::query("UPDATE applications SET assigned_to = $1, updated_at = now() WHERE id = $2")
                .bind(&value)
                .bind(app_id)
                .execute(&mut **tx)
                .await?;
            updated.push(field.clone());
            continue;
        }

        match validate_field(field, &value) {
            Err(message) => {
                errors.insert(field.clone(), message);
            }
            Ok(normalized) => {
                let old = current_field_value(tx, field, &app, borrower).await?;
                if let Some(old) = &old {
                    if *old != normalized {
                        corrections.insert(
                            field.clone(),
                            FieldCorrection {
                                old: old.clone(),
                                new: normalized.clone(),
                            },
                        );
                    }
                }

                if APPLICATION_FIELDS.contains(&field.as_str()) {
                    apply_application_field(tx, app_id, field, &normalized).await?;
                } else if BORROWER_FIELDS.contains(&field.as_str()) {
                    apply_borrower_field(tx, borrower.id, field, &normalized).await?;
                } else if FINANCIAL_FIELDS.contains(&field.as_str()) {
                    apply_financial_field(tx, app_id, borrower.id, field, &normalized).await?;
                    touched_financials = true;
                }
                updated.push(field.clone());
            }
        }
    }

    if touched_financials {
        recompute_dti(tx, app_id, borrower.id).await?;
    }

    // Remaining intake fields, judged against post-save state.
    let mut remaining = Vec::new();
    let row = sqlx::query("SELECT * FROM applications WHERE id = $1")
        .bind(app_id)
        .fetch_one(&mut **tx)
        .await?;
    let app_after = Application::from_row(&row);
    let borrower_row = sqlx::query("SELECT * FROM borrowers WHERE id = $1")
        .bind(borrower.id)
        .fetch_one(&mut **tx)
        .await?;
    let borrower_after = Borrower::from_row(&borrower_row);
    for field in INTAKE_FIELDS {
        let present = current_field_value(tx, field, &app_after, &borrower_after)
            .await?
            .is_some();
        if !present {
            remaining.push(field.to_string());
        }
    }

    if !updated.is_empty() || !errors.is_empty() {
        write_audit_event(
            tx,
            AuditDraft::new("application_fields_updated")
                .user(&principal.user_id, principal.role.as_str())
                .application(app_id)
                .data(serde_json::json!({
                    "updated": updated,
                    "rejected": errors.keys().collect::<Vec<_>>(),
                    "corrected": corrections.keys().collect::<Vec<_>>(),
                })),
        )
        .await?;
    }

    Ok(FieldSaveResponse {
        updated,
        errors,
        remaining,
        corrections,
    })
}

/// Validates and applies a sparse field map to an application the caller
/// already resolved through their scope.
pub async fn update_application_fields(
    pool: &PgPool,
    principal: &Principal,
    app: &Application,
    fields: &HashMap<String, serde_json::Value>,
) -> ApiResult<FieldSaveResponse> {
    ensure_not_terminal(app)?;
    if fields.is_empty() {
        return Err(ApiError::BadRequest("no fields supplied".to_string()));
    }

    let mut tx = pool.begin().await?;
    let row = sqlx::query(
        "SELECT b.* FROM application_borrowers ab \
         INNER JOIN borrowers b ON ab.borrower_id = b.id \
         WHERE ab.application_id = $1 AND ab.is_primary = TRUE",
    )
    .bind(app.id)
    .fetch_optional(&mut *tx)
    .await?;
    let borrower = row
        .map(|r| Borrower::from_row(&r))
        .ok_or(ApiError::NotFound("primary borrower"))?;

    let save = save_fields(&mut tx, principal, app.id, &borrower, fields).await?;
    tx.commit().await?;
    Ok(save)
}
