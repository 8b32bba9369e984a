use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;

use shared::models::enums::EmploymentStatus;

/// Borrower profile linked to the identity provider's subject.
///
/// Created on first intake by a new principal and never deleted while
/// referenced by applications. `ssn` and `dob` are PII; they are masked at
/// the response boundary for scopes that carry `pii_mask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Borrower {
    pub id: i64,
    /// Identity-provider subject (`sub` claim), unique per borrower.
    pub subject: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub ssn: Option<String>,
    pub dob: Option<NaiveDate>,
    pub employment_status: Option<EmploymentStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Borrower {
    pub fn from_row(row: &PgRow) -> Self {
        let employment: Option<String> = row.get("employment_status");
        Borrower {
            id: row.get("id"),
            subject: row.get("subject"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            email: row.get("email"),
            ssn: row.get("ssn"),
            dob: row.get("dob"),
            employment_status: employment.as_deref().and_then(EmploymentStatus::parse),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}
