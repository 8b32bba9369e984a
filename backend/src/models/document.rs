use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;

use shared::dtos::documents::{DocumentResponse, ExtractionResponse};
use shared::models::enums::{DocumentStatus, DocumentType};

/// Document uploaded against an application.
///
/// `file_path` is the object-store key (`{app_id}/{doc_id}/{filename}`);
/// it stays NULL between the metadata insert and the successful blob
/// upload. `quality_flags` is a JSON array of strings in a TEXT column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub application_id: i64,
    pub borrower_id: Option<i64>,
    /// Back-link when the upload answers an underwriting condition.
    pub condition_id: Option<i64>,
    pub doc_type: DocumentType,
    pub file_path: Option<String>,
    pub status: DocumentStatus,
    pub quality_flags: Option<String>,
    pub uploaded_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn from_row(row: &PgRow) -> Self {
        let doc_type: String = row.get("doc_type");
        let status: String = row.get("status");
        Document {
            id: row.get("id"),
            application_id: row.get("application_id"),
            borrower_id: row.get("borrower_id"),
            condition_id: row.get("condition_id"),
            doc_type: DocumentType::parse(&doc_type).unwrap_or(DocumentType::Other),
            file_path: row.get("file_path"),
            status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Uploaded),
            quality_flags: row.get("quality_flags"),
            uploaded_by: row.get("uploaded_by"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    /// Parsed quality flags; a missing or malformed column reads as none.
    pub fn flags(&self) -> Vec<String> {
        self.quality_flags
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .unwrap_or_default()
    }

    /// Response shape; `strip_path` removes the object-store key for
    /// metadata-only scopes.
    pub fn to_response(&self, strip_path: bool) -> DocumentResponse {
        DocumentResponse {
            id: self.id,
            application_id: self.application_id,
            borrower_id: self.borrower_id,
            condition_id: self.condition_id,
            doc_type: self.doc_type,
            status: self.status,
            file_path: if strip_path {
                None
            } else {
                self.file_path.clone()
            },
            quality_flags: self.flags(),
            uploaded_by: self.uploaded_by.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Structured field extracted from a document by the extraction worker.
/// HMDA-coded fields are never stored here; they are routed to the
/// compliance schema instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentExtraction {
    pub id: i64,
    pub document_id: i64,
    pub field_name: String,
    pub field_value: Option<String>,
    pub confidence: Option<f64>,
    pub source_page: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl DocumentExtraction {
    pub fn from_row(row: &PgRow) -> Self {
        DocumentExtraction {
            id: row.get("id"),
            document_id: row.get("document_id"),
            field_name: row.get("field_name"),
            field_value: row.get("field_value"),
            confidence: row.get("confidence"),
            source_page: row.get("source_page"),
            created_at: row.get("created_at"),
        }
    }

    pub fn to_response(&self) -> ExtractionResponse {
        ExtractionResponse {
            field_name: self.field_name.clone(),
            field_value: self.field_value.clone(),
            confidence: self.confidence,
            source_page: self.source_page,
        }
    }
}
