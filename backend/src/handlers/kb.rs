//! Knowledge-base search handler (read-only tool surface).

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::Principal;
use crate::errors::{ApiError, ApiResult};
use crate::services::kb;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

/// `GET /api/kb/search?q=` - ranked chunks from the regulatory corpus.
/// Any authenticated role may read the knowledge base.
pub async fn search(
    _principal: Principal,
    params: web::Query<SearchParams>,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let query = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::validation("q", "a search query is required"))?;
    let limit = params.limit.unwrap_or(5).clamp(1, 25);

    let results = kb::search(&data.lending_pool, &data.llm, query, limit).await?;
    Ok(HttpResponse::Ok().json(results))
}
