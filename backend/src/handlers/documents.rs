//! Document upload, listing, triage and completeness handlers.
//!
//! Upload accepts multipart/form-data with a `file` part and a `doc_type`
//! text part, streams the bytes to the object store under
//! `{application_id}/{document_id}/{filename}`, commits the metadata row,
//! and only then spawns the detached extraction task. Executive scopes
//! (`document_metadata_only`) never see object keys and are refused
//! content access outright.

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use log::info;
use std::sync::Arc;

use shared::dtos::documents::ReviewDocumentRequest;
use shared::models::enums::{DocumentStatus, DocumentType, UserRole};

use crate::auth::Principal;
use crate::errors::{ApiError, ApiResult};
use crate::models::{Document, DocumentExtraction};
use crate::services::audit::{write_audit_event, AuditDraft};
use crate::services::{completeness, extraction, lifecycle, scope};
use crate::AppState;

/// Anything larger than 50 MiB answers 413.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

const ALLOWED_CONTENT_TYPES: [&str; 3] = ["application/pdf", "image/png", "image/jpeg"];

struct UploadParts {
    doc_type: DocumentType,
    condition_id: Option<i64>,
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

async fn read_text_field(field: &mut actix_multipart::Field) -> ApiResult<String> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| ApiError::BadRequest(format!("invalid multipart data: {}", e)))?;
        bytes.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}

async fn parse_upload(mut payload: Multipart) -> ApiResult<UploadParts> {
    let mut doc_type: Option<DocumentType> = None;
    let mut condition_id: Option<i64> = None;
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| ApiError::BadRequest(format!("invalid multipart data: {}", e)))?;

        let Some(content_disposition) = field.content_disposition() else {
            continue;
        };
        let field_name = content_disposition.get_name().unwrap_or("").to_string();

        match field_name.as_str() {
            "doc_type" => {
                let raw = read_text_field(&mut field).await?;
                doc_type = Some(
                    DocumentType::parse(&raw)
                        .ok_or_else(|| ApiError::validation("doc_type", "unknown document type"))?,
                );
            }
            "condition_id" => {
                let raw = read_text_field(&mut field).await?;
                if !raw.is_empty() {
                    condition_id = Some(raw.parse().map_err(|_| {
                        ApiError::validation("condition_id", "must be an integer")
                    })?);
                }
            }
            "file" => {
                filename = Some(
                    content_disposition
                        .get_filename()
                        .unwrap_or("document.pdf")
                        .to_string(),
                );
                let declared = field
                    .content_type()
                    .map(|m| m.essence_str().to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                if !ALLOWED_CONTENT_TYPES.contains(&declared.as_str()) {
                    return Err(ApiError::validation(
                        "file",
                        format!("unsupported content type '{}'", declared),
                    ));
                }
                content_type = Some(declared);

                let mut buffer = Vec::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk
                        .map_err(|e| ApiError::Internal(format!("upload read failed: {}", e)))?;
                    if buffer.len() + chunk.len() > MAX_UPLOAD_BYTES {
                        return Err(ApiError::PayloadTooLarge);
                    }
                    buffer.extend_from_slice(&chunk);
                }
                bytes = Some(buffer);
            }
            _ => {}
        }
    }

    Ok(UploadParts {
        doc_type: doc_type.ok_or_else(|| ApiError::validation("doc_type", "doc_type is required"))?,
        condition_id,
        filename: filename.ok_or_else(|| ApiError::validation("file", "file part is required"))?,
        content_type: content_type
            .ok_or_else(|| ApiError::validation("file", "file part is required"))?,
        bytes: bytes.ok_or_else(|| ApiError::validation("file", "file part is required"))?,
    })
}

/// `POST /api/applications/{id}/documents`
pub async fn upload_document(
    principal: Principal,
    path: web::Path<i64>,
    payload: Multipart,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::Borrower, UserRole::LoanOfficer, UserRole::Admin])?;
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    lifecycle::ensure_not_terminal(&app)?;

    let upload = parse_upload(payload).await?;
    info!(
        "POST /api/applications/{}/documents - {} ({} bytes)",
        app.id,
        upload.filename,
        upload.bytes.len()
    );

    // Resolve the primary borrower for attribution.
    let primary: Option<i64> = sqlx::query_scalar(
        "SELECT borrower_id FROM application_borrowers \
         WHERE application_id = $1 AND is_primary = TRUE",
    )
    .bind(app.id)
    .fetch_optional(&data.lending_pool)
    .await?;

    let mut tx = data.lending_pool.begin().await?;
    let row = sqlx::query(
        "INSERT INTO documents (application_id, borrower_id, condition_id, doc_type, status, uploaded_by) \
         VALUES ($1, $2, $3, $4, 'processing', $5) RETURNING *",
    )
    .bind(app.id)
    .bind(primary)
    .bind(upload.condition_id)
    .bind(upload.doc_type.as_str())
    .bind(&principal.user_id)
    .fetch_one(&mut *tx)
    .await?;
    let mut document = Document::from_row(&row);

    let key = crate::clients::BlobStore::object_key(app.id, document.id, &upload.filename);
    data.blob
        .put(&key, upload.bytes, &upload.content_type)
        .await?;

    let row = sqlx::query("UPDATE documents SET file_path = $1, updated_at = now() WHERE id = $2 RETURNING *")
        .bind(&key)
        .bind(document.id)
        .fetch_one(&mut *tx)
        .await?;
    document = Document::from_row(&row);

    write_audit_event(
        &mut tx,
        AuditDraft::new("document_uploaded")
            .user(&principal.user_id, principal.role.as_str())
            .application(app.id)
            .data(serde_json::json!({
                "document_id": document.id,
                "doc_type": document.doc_type.as_str(),
                "condition_id": document.condition_id,
            })),
    )
    .await?;
    tx.commit().await?;

    // The task must only see committed state, so it is spawned after the
    // commit, detached from this request's lifetime.
    let state: Arc<AppState> = data.clone().into_inner();
    let document_id = document.id;
    tokio::spawn(async move {
        extraction::process_document(state, document_id).await;
    });

    let strip = principal.data_scope.document_metadata_only;
    Ok(HttpResponse::Created().json(document.to_response(strip)))
}

/// `GET /api/applications/{id}/documents` (metadata only)
pub async fn list_documents(
    principal: Principal,
    path: web::Path<i64>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    let rows = sqlx::query("SELECT * FROM documents WHERE application_id = $1 ORDER BY id")
        .bind(app.id)
        .fetch_all(&data.lending_pool)
        .await?;
    let strip = principal.data_scope.document_metadata_only;
    let documents: Vec<_> = rows
        .iter()
        .map(|row| Document::from_row(row).to_response(strip))
        .collect();
    Ok(HttpResponse::Ok().json(documents))
}

async fn fetch_document(
    data: &web::Data<AppState>,
    application_id: i64,
    document_id: i64,
) -> ApiResult<Document> {
    let row = sqlx::query("SELECT * FROM documents WHERE id = $1 AND application_id = $2")
        .bind(document_id)
        .bind(application_id)
        .fetch_optional(&data.lending_pool)
        .await?
        .ok_or(ApiError::NotFound("document"))?;
    Ok(Document::from_row(&row))
}

/// `GET /api/applications/{id}/documents/{doc_id}`
pub async fn get_document(
    principal: Principal,
    path: web::Path<(i64, i64)>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let (application_id, document_id) = path.into_inner();
    let app = scope::fetch_application_scoped(
        &data.lending_pool,
        &principal.data_scope,
        application_id,
    )
    .await?;
    let document = fetch_document(&data, app.id, document_id).await?;
    let strip = principal.data_scope.document_metadata_only;
    Ok(HttpResponse::Ok().json(document.to_response(strip)))
}

/// `GET /api/applications/{id}/documents/{doc_id}/extractions`
pub async fn list_extractions(
    principal: Principal,
    path: web::Path<(i64, i64)>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let (application_id, document_id) = path.into_inner();
    let app = scope::fetch_application_scoped(
        &data.lending_pool,
        &principal.data_scope,
        application_id,
    )
    .await?;
    let document = fetch_document(&data, app.id, document_id).await?;
    let rows =
        sqlx::query("SELECT * FROM document_extractions WHERE document_id = $1 ORDER BY id")
            .bind(document.id)
            .fetch_all(&data.lending_pool)
            .await?;
    let extractions: Vec<_> = rows
        .iter()
        .map(|row| DocumentExtraction::from_row(row).to_response())
        .collect();
    Ok(HttpResponse::Ok().json(extractions))
}

/// `GET /api/applications/{id}/documents/{doc_id}/content`
///
/// Refused at this layer for metadata-only scopes, before any blob read.
pub async fn get_document_content(
    principal: Principal,
    path: web::Path<(i64, i64)>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    if principal.data_scope.document_metadata_only {
        return Err(ApiError::Role(
            "document content is not available to executive access".to_string(),
        ));
    }

    let (application_id, document_id) = path.into_inner();
    let app = scope::fetch_application_scoped(
        &data.lending_pool,
        &principal.data_scope,
        application_id,
    )
    .await?;
    let document = fetch_document(&data, app.id, document_id).await?;
    let file_path = document
        .file_path
        .ok_or(ApiError::NotFound("document content"))?;

    let bytes = data.blob.get(&file_path).await?;
    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .body(bytes))
}

/// `POST /api/applications/{id}/documents/{doc_id}/review`
///
/// Loan-officer triage. Only a terminally-processed document may be
/// flagged for resubmission.
pub async fn review_document(
    principal: Principal,
    path: web::Path<(i64, i64)>,
    body: web::Json<ReviewDocumentRequest>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    principal.require_role(&[UserRole::LoanOfficer, UserRole::Admin])?;
    let (application_id, document_id) = path.into_inner();
    let app = scope::fetch_application_scoped(
        &data.lending_pool,
        &principal.data_scope,
        application_id,
    )
    .await?;
    let document = fetch_document(&data, app.id, document_id).await?;

    let new_status = match body.action.as_str() {
        "accepted" => DocumentStatus::Accepted,
        "rejected" => DocumentStatus::Rejected,
        "flagged_for_resubmission" => {
            if !document.status.is_terminal_processed() {
                return Err(ApiError::precondition(
                    "document_not_processed",
                    "only a processed document can be flagged for resubmission",
                ));
            }
            DocumentStatus::FlaggedForResubmission
        }
        other => {
            return Err(ApiError::validation(
                "action",
                format!("unknown review action '{}'", other),
            ));
        }
    };

    let mut tx = data.lending_pool.begin().await?;
    let row = sqlx::query(
        "UPDATE documents SET status = $1, updated_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(new_status.as_str())
    .bind(document.id)
    .fetch_one(&mut *tx)
    .await?;
    let updated = Document::from_row(&row);

    write_audit_event(
        &mut tx,
        AuditDraft::new("document_reviewed")
            .user(&principal.user_id, principal.role.as_str())
            .application(app.id)
            .data(serde_json::json!({
                "document_id": document.id,
                "action": body.action.clone(),
                "note": body.note.clone(),
            })),
    )
    .await?;
    tx.commit().await?;

    let strip = principal.data_scope.document_metadata_only;
    Ok(HttpResponse::Ok().json(updated.to_response(strip)))
}

/// `GET /api/applications/{id}/completeness`
pub async fn get_completeness(
    principal: Principal,
    path: web::Path<i64>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let app =
        scope::fetch_application_scoped(&data.lending_pool, &principal.data_scope, *path).await?;
    let report =
        completeness::check_completeness(&data.lending_pool, app.id, app.loan_type).await?;
    Ok(HttpResponse::Ok().json(report))
}
