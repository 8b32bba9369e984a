use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::enums::{ApplicationStage, EmploymentStatus, LoanType};

/// Request payload for starting a new application.
///
/// All fields are optional; whatever is present is run through the intake
/// validators before being stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateApplicationRequest {
    pub loan_type: Option<String>,
    pub property_address: Option<String>,
    pub loan_amount: Option<Decimal>,
    pub property_value: Option<Decimal>,
}

/// Borrower as embedded in application responses.
///
/// `ssn` and `dob` are masked at the response boundary for principals whose
/// scope carries `pii_mask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowerSummary {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employment_status: Option<EmploymentStatus>,
    pub is_primary: bool,
}

/// Full application resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationResponse {
    pub id: i64,
    pub stage: ApplicationStage,
    pub loan_type: Option<LoanType>,
    pub property_address: Option<String>,
    pub loan_amount: Option<Decimal>,
    pub property_value: Option<Decimal>,
    pub assigned_to: Option<String>,
    pub le_delivery_date: Option<DateTime<Utc>>,
    pub cd_delivery_date: Option<DateTime<Utc>>,
    pub closing_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub borrowers: Vec<BorrowerSummary>,
}

/// Response from the intake entry point; `is_new` distinguishes a freshly
/// created application from an idempotent return of an in-flight one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartApplicationResponse {
    #[serde(flatten)]
    pub application: ApplicationResponse,
    pub is_new: bool,
}

/// Offset pagination envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationListResponse {
    pub data: Vec<ApplicationResponse>,
    pub pagination: Pagination,
}

/// Old/new pair reported when an incremental save overwrites a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCorrection {
    pub old: String,
    pub new: String,
}

/// Result of an incremental field save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSaveResponse {
    pub updated: Vec<String>,
    pub errors: HashMap<String, String>,
    pub remaining: Vec<String>,
    pub corrections: HashMap<String, FieldCorrection>,
}

/// Request to attach a co-borrower to an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddBorrowerRequest {
    pub borrower_id: i64,
    #[serde(default)]
    pub is_primary: bool,
}

/// One actionable item on the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub action_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub application_id: i64,
    pub stage: ApplicationStage,
    pub pending_actions: Vec<PendingAction>,
}

/// Request to lock a rate on an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRateLockRequest {
    pub locked_rate: Decimal,
    /// Lock period in days from now; defaults to 30.
    pub lock_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLockResponse {
    pub id: i64,
    pub application_id: i64,
    pub locked_rate: Decimal,
    pub lock_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub is_active: bool,
}
