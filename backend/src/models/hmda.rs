use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;

/// HMDA demographic record, isolated in the `hmda` schema.
///
/// Each field carries its own collection method so the upsert precedence
/// (`visual_observation < document_extraction < self_reported`) can be
/// applied per field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HmdaDemographic {
    pub id: i64,
    pub application_id: i64,
    pub borrower_id: Option<i64>,
    pub race: Option<String>,
    pub ethnicity: Option<String>,
    pub sex: Option<String>,
    pub age: Option<String>,
    pub race_method: Option<String>,
    pub ethnicity_method: Option<String>,
    pub sex_method: Option<String>,
    pub age_method: Option<String>,
    pub collected_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HmdaDemographic {
    pub fn from_row(row: &PgRow) -> Self {
        HmdaDemographic {
            id: row.get("id"),
            application_id: row.get("application_id"),
            borrower_id: row.get("borrower_id"),
            race: row.get("race"),
            ethnicity: row.get("ethnicity"),
            sex: row.get("sex"),
            age: row.get("age"),
            race_method: row.get("race_method"),
            ethnicity_method: row.get("ethnicity_method"),
            sex_method: row.get("sex_method"),
            age_method: row.get("age_method"),
            collected_at: row.get("collected_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// Non-demographic HMDA-reportable loan data, snapshotted when the file is
/// submitted to underwriting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HmdaLoanData {
    pub id: i64,
    pub application_id: i64,
    pub gross_monthly_income: Option<Decimal>,
    pub dti_ratio: Option<Decimal>,
    pub credit_score: Option<i32>,
    pub loan_type: Option<String>,
    pub loan_purpose: Option<String>,
    pub property_location: Option<String>,
    pub interest_rate: Option<Decimal>,
    pub total_fees: Option<Decimal>,
    pub snapshot_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl HmdaLoanData {
    pub fn from_row(row: &PgRow) -> Self {
        HmdaLoanData {
            id: row.get("id"),
            application_id: row.get("application_id"),
            gross_monthly_income: row.get("gross_monthly_income"),
            dti_ratio: row.get("dti_ratio"),
            credit_score: row.get("credit_score"),
            loan_type: row.get("loan_type"),
            loan_purpose: row.get("loan_purpose"),
            property_location: row.get("property_location"),
            interest_rate: row.get("interest_rate"),
            total_fees: row.get("total_fees"),
            snapshot_at: row.get("snapshot_at"),
            created_at: row.get("created_at"),
        }
    }
}
