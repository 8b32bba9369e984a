use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;

use shared::dtos::applications::{ApplicationResponse, BorrowerSummary, RateLockResponse};
use shared::models::enums::{ApplicationStage, LoanType};

/// The loan file.
///
/// Terminal stages (`closed`, `denied`, `withdrawn`) accept no further
/// lifecycle writes other than audit events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub stage: ApplicationStage,
    pub loan_type: Option<LoanType>,
    pub property_address: Option<String>,
    pub loan_amount: Option<Decimal>,
    pub property_value: Option<Decimal>,
    /// Loan-officer principal id this file is assigned to.
    pub assigned_to: Option<String>,
    pub le_delivery_date: Option<DateTime<Utc>>,
    pub cd_delivery_date: Option<DateTime<Utc>>,
    pub closing_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn from_row(row: &PgRow) -> Self {
        let stage: String = row.get("stage");
        let loan_type: Option<String> = row.get("loan_type");
        Application {
            id: row.get("id"),
            stage: ApplicationStage::parse(&stage).unwrap_or(ApplicationStage::Inquiry),
            loan_type: loan_type.as_deref().and_then(LoanType::parse),
            property_address: row.get("property_address"),
            loan_amount: row.get("loan_amount"),
            property_value: row.get("property_value"),
            assigned_to: row.get("assigned_to"),
            le_delivery_date: row.get("le_delivery_date"),
            cd_delivery_date: row.get("cd_delivery_date"),
            closing_date: row.get("closing_date"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    pub fn to_response(&self, borrowers: Vec<BorrowerSummary>) -> ApplicationResponse {
        ApplicationResponse {
            id: self.id,
            stage: self.stage,
            loan_type: self.loan_type,
            property_address: self.property_address.clone(),
            loan_amount: self.loan_amount,
            property_value: self.property_value,
            assigned_to: self.assigned_to.clone(),
            le_delivery_date: self.le_delivery_date,
            cd_delivery_date: self.cd_delivery_date,
            closing_date: self.closing_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
            borrowers,
        }
    }
}

/// Junction row linking an application to a borrower. At most one row per
/// application carries `is_primary = true` (partial unique index).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationBorrower {
    pub id: i64,
    pub application_id: i64,
    pub borrower_id: i64,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl ApplicationBorrower {
    pub fn from_row(row: &PgRow) -> Self {
        ApplicationBorrower {
            id: row.get("id"),
            application_id: row.get("application_id"),
            borrower_id: row.get("borrower_id"),
            is_primary: row.get("is_primary"),
            created_at: row.get("created_at"),
        }
    }
}

/// Per-(application, borrower) financial snapshot. The file-level DTI is
/// the sum of debts over the sum of incomes across all rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationFinancials {
    pub id: i64,
    pub application_id: i64,
    pub borrower_id: Option<i64>,
    pub gross_monthly_income: Option<Decimal>,
    pub monthly_debts: Option<Decimal>,
    pub total_assets: Option<Decimal>,
    pub credit_score: Option<i32>,
    pub dti_ratio: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationFinancials {
    pub fn from_row(row: &PgRow) -> Self {
        ApplicationFinancials {
            id: row.get("id"),
            application_id: row.get("application_id"),
            borrower_id: row.get("borrower_id"),
            gross_monthly_income: row.get("gross_monthly_income"),
            monthly_debts: row.get("monthly_debts"),
            total_assets: row.get("total_assets"),
            credit_score: row.get("credit_score"),
            dti_ratio: row.get("dti_ratio"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// Rate lock on an application. A lock is active iff `is_active` and the
/// expiration date has not passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLock {
    pub id: i64,
    pub application_id: i64,
    pub locked_rate: Decimal,
    pub lock_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl RateLock {
    pub fn from_row(row: &PgRow) -> Self {
        RateLock {
            id: row.get("id"),
            application_id: row.get("application_id"),
            locked_rate: row.get("locked_rate"),
            lock_date: row.get("lock_date"),
            expiration_date: row.get("expiration_date"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
        }
    }

    pub fn is_currently_active(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expiration_date
    }

    pub fn to_response(&self, now: DateTime<Utc>) -> RateLockResponse {
        RateLockResponse {
            id: self.id,
            application_id: self.application_id,
            locked_rate: self.locked_rate,
            lock_date: self.lock_date,
            expiration_date: self.expiration_date,
            is_active: self.is_currently_active(now),
        }
    }
}
