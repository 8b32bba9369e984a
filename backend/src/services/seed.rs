//! Demo data seeding.
//!
//! Seeds a small demo portfolio for local development and walkthroughs.
//! Idempotent: a manifest row keyed by the hash of the seed configuration
//! makes repeat calls no-ops unless `force` is set.

use log::info;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::str::FromStr;

use crate::auth::Principal;
use crate::errors::ApiResult;
use crate::services::audit::{write_audit_event, AuditDraft};

/// Bumping the version invalidates the manifest and allows re-seeding.
const SEED_CONFIG: &str = "crestline-demo-portfolio-v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedResult {
    pub status: String,
    pub borrowers: i64,
    pub applications: i64,
}

fn config_hash() -> String {
    let mut hasher = Sha256::new();
    hasher.update(SEED_CONFIG.as_bytes());
    hex::encode(hasher.finalize())
}

struct DemoBorrower {
    subject: &'static str,
    first_name: &'static str,
    last_name: &'static str,
    email: &'static str,
    employment_status: &'static str,
}

struct DemoApplication {
    borrower_index: usize,
    stage: &'static str,
    loan_type: &'static str,
    property_address: &'static str,
    loan_amount: &'static str,
    property_value: &'static str,
    income: &'static str,
    debts: &'static str,
    credit_score: i32,
}

const DEMO_BORROWERS: [DemoBorrower; 3] = [
    DemoBorrower {
        subject: "demo-borrower-1",
        first_name: "Maya",
        last_name: "Okafor",
        email: "maya.okafor@example.com",
        employment_status: "w2_employee",
    },
    DemoBorrower {
        subject: "demo-borrower-2",
        first_name: "Daniel",
        last_name: "Reyes",
        email: "daniel.reyes@example.com",
        employment_status: "self_employed",
    },
    DemoBorrower {
        subject: "demo-borrower-3",
        first_name: "Priya",
        last_name: "Shah",
        email: "priya.shah@example.com",
        employment_status: "w2_employee",
    },
];

const DEMO_APPLICATIONS: [DemoApplication; 3] = [
    DemoApplication {
        borrower_index: 0,
        stage: "application",
        loan_type: "conventional_30",
        property_address: "412 Alder Way, Bend OR",
        loan_amount: "380000.00",
        property_value: "475000.00",
        income: "9500.00",
        debts: "2800.00",
        credit_score: 742,
    },
    DemoApplication {
        borrower_index: 1,
        stage: "underwriting",
        loan_type: "fha",
        property_address: "88 Cannery Row, Astoria OR",
        loan_amount: "295000.00",
        property_value: "340000.00",
        income: "7200.00",
        debts: "3100.00",
        credit_score: 688,
    },
    DemoApplication {
        borrower_index: 2,
        stage: "processing",
        loan_type: "jumbo",
        property_address: "1501 Summit Dr, Lake Oswego OR",
        loan_amount: "1250000.00",
        property_value: "1600000.00",
        income: "24000.00",
        debts: "6500.00",
        credit_score: 781,
    },
];

async fn insert_demo_rows(tx: &mut Transaction<'_, Postgres>) -> ApiResult<(i64, i64)> {
    let mut borrower_ids = Vec::new();
    for demo in &DEMO_BORROWERS {
        let id: i64 = sqlx::query(
            "INSERT INTO borrowers (subject, first_name, last_name, email, employment_status) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (subject) DO UPDATE SET updated_at = now() \
             RETURNING id",
        )
        .bind(demo.subject)
        .bind(demo.first_name)
        .bind(demo.last_name)
        .bind(demo.email)
        .bind(demo.employment_status)
        .fetch_one(&mut **tx)
        .await?
        .get("id");
        borrower_ids.push(id);
    }

    let mut application_count = 0;
    for demo in &DEMO_APPLICATIONS {
        let borrower_id = borrower_ids[demo.borrower_index];
        let app_id: i64 = sqlx::query(
            "INSERT INTO applications (stage, loan_type, property_address, loan_amount, property_value) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(demo.stage)
        .bind(demo.loan_type)
        .bind(demo.property_address)
        .bind(Decimal::from_str(demo.loan_amount).unwrap_or_default())
        .bind(Decimal::from_str(demo.property_value).unwrap_or_default())
        .fetch_one(&mut **tx)
        .await?
        .get("id");

        sqlx::query(
            "INSERT INTO application_borrowers (application_id, borrower_id, is_primary) \
             VALUES ($1, $2, TRUE)",
        )
        .bind(app_id)
        .bind(borrower_id)
        .execute(&mut **tx)
        .await?;

        let income = Decimal::from_str(demo.income).unwrap_or_default();
        let debts = Decimal::from_str(demo.debts).unwrap_or_default();
        let dti = if income > Decimal::ZERO {
            Some((debts / income).round_dp(4))
        } else {
            None
        };
        sqlx::query(
            "INSERT INTO application_financials \
             (application_id, borrower_id, gross_monthly_income, monthly_debts, total_assets, \
              credit_score, dti_ratio) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(app_id)
        .bind(borrower_id)
        .bind(income)
        .bind(debts)
        .bind(income * Decimal::from(10))
        .bind(demo.credit_score)
        .bind(dti)
        .execute(&mut **tx)
        .await?;

        application_count += 1;
    }

    // One open condition on the underwriting file keeps the condition
    // workflow demonstrable.
    sqlx::query(
        "INSERT INTO conditions (application_id, description, severity, issued_by) \
         SELECT a.id, 'Provide year-to-date profit and loss statement', 'prior_to_approval', 'demo-underwriter' \
         FROM applications a WHERE a.stage = 'underwriting' \
         ORDER BY a.id DESC LIMIT 1",
    )
    .execute(&mut **tx)
    .await?;

    Ok((borrower_ids.len() as i64, application_count))
}

pub async fn seed_demo(pool: &PgPool, principal: &Principal, force: bool) -> ApiResult<SeedResult> {
    let hash = config_hash();
    let mut tx = pool.begin().await?;

    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM demo_data_manifest WHERE config_hash = $1 LIMIT 1")
            .bind(&hash)
            .fetch_optional(&mut *tx)
            .await?;

    if existing.is_some() && !force {
        tx.rollback().await?;
        return Ok(SeedResult {
            status: "already_seeded".to_string(),
            borrowers: 0,
            applications: 0,
        });
    }

    let (borrowers, applications) = insert_demo_rows(&mut tx).await?;

    sqlx::query("INSERT INTO demo_data_manifest (config_hash, summary) VALUES ($1, $2)")
        .bind(&hash)
        .bind(format!(
            "{} borrowers, {} applications",
            borrowers, applications
        ))
        .execute(&mut *tx)
        .await?;

    write_audit_event(
        &mut tx,
        AuditDraft::new("demo_seeded")
            .user(&principal.user_id, principal.role.as_str())
            .data(serde_json::json!({
                "borrowers": borrowers,
                "applications": applications,
                "forced": force,
            })),
    )
    .await?;

    tx.commit().await?;
    info!("Seeded demo portfolio: {} applications", applications);
    Ok(SeedResult {
        status: "seeded".to_string(),
        borrowers,
        applications,
    })
}
