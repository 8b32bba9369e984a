use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;

/// Compliance knowledge-base document (regulation, guideline, or policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbDocument {
    pub id: i64,
    pub title: String,
    /// 1 = federal regulation, 2 = agency guideline, 3 = internal policy.
    pub tier: i32,
    pub source_file: String,
    pub description: Option<String>,
    pub effective_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl KbDocument {
    pub fn from_row(row: &PgRow) -> Self {
        KbDocument {
            id: row.get("id"),
            title: row.get("title"),
            tier: row.get("tier"),
            source_file: row.get("source_file"),
            description: row.get("description"),
            effective_date: row.get("effective_date"),
            created_at: row.get("created_at"),
        }
    }
}

/// Embedded text chunk from a knowledge-base document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbChunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_text: String,
    pub section_ref: Option<String>,
    pub chunk_index: i32,
    pub embedding: Option<Vec<f64>>,
    pub created_at: DateTime<Utc>,
}

impl KbChunk {
    pub fn from_row(row: &PgRow) -> Self {
        KbChunk {
            id: row.get("id"),
            document_id: row.get("document_id"),
            chunk_text: row.get("chunk_text"),
            section_ref: row.get("section_ref"),
            chunk_index: row.get("chunk_index"),
            embedding: row.get("embedding"),
            created_at: row.get("created_at"),
        }
    }
}
