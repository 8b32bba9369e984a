use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::enums::{DocumentStatus, DocumentType};

/// Document metadata as returned by the API.
///
/// `file_path` is stripped for principals whose scope carries
/// `document_metadata_only`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub id: i64,
    pub application_id: i64,
    pub borrower_id: Option<i64>,
    pub condition_id: Option<i64>,
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub file_path: Option<String>,
    #[serde(default)]
    pub quality_flags: Vec<String>,
    pub uploaded_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One structured field extracted from a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub field_name: String,
    pub field_value: Option<String>,
    pub confidence: Option<f64>,
    pub source_page: Option<i32>,
}

/// Loan-officer triage verdict on a processed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDocumentRequest {
    /// One of `accepted`, `flagged_for_resubmission`, `rejected`.
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Per-required-document entry in the completeness report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementStatus {
    pub doc_type: DocumentType,
    pub is_provided: bool,
    pub status: Option<DocumentStatus>,
    #[serde(default)]
    pub quality_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessResponse {
    pub application_id: i64,
    pub required_count: usize,
    pub provided_count: usize,
    pub is_complete: bool,
    pub requirements: Vec<RequirementStatus>,
}
