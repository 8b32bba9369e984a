//! Knowledge-base search.
//!
//! Read-only tool over the regulatory corpus: the query is embedded
//! through the LLM contract and chunks are ranked by cosine similarity
//! in-process. If the embeddings endpoint is down the search degrades to
//! a plain text match rather than failing the caller.

use log::warn;
use sqlx::{PgPool, Row};

use serde::{Deserialize, Serialize};

use crate::clients::LlmClient;
use crate::errors::ApiResult;
use crate::models::KbChunk;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbSearchResult {
    pub document_title: String,
    pub tier: i32,
    pub section_ref: Option<String>,
    pub chunk_text: String,
    pub score: f64,
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub async fn search(
    pool: &PgPool,
    llm: &LlmClient,
    query: &str,
    limit: usize,
) -> ApiResult<Vec<KbSearchResult>> {
    let rows = sqlx::query(
        "SELECT c.*, d.title AS document_title, d.tier AS document_tier \
         FROM kb_chunks c INNER JOIN kb_documents d ON c.document_id = d.id",
    )
    .fetch_all(pool)
    .await?;

    let chunks: Vec<(KbChunk, String, i32)> = rows
        .iter()
        .map(|row| {
            (
                KbChunk::from_row(row),
                row.get("document_title"),
                row.get("document_tier"),
            )
        })
        .collect();

    let query_embedding = match llm.get_embeddings(&[query.to_string()]).await {
        Ok(mut embeddings) if !embeddings.is_empty() => Some(embeddings.remove(0)),
        Ok(_) => None,
        Err(e) => {
            warn!("Embeddings unavailable, falling back to text match: {}", e);
            None
        }
    };

    let mut results: Vec<KbSearchResult> = match query_embedding {
        Some(query_embedding) => chunks
            .into_iter()
            .filter_map(|(chunk, title, tier)| {
                let embedding = chunk.embedding.as_ref()?;
                let score = cosine_similarity(&query_embedding, embedding);
                Some(KbSearchResult {
                    document_title: title,
                    tier,
                    section_ref: chunk.section_ref.clone(),
                    chunk_text: chunk.chunk_text,
                    score,
                })
            })
            .collect(),
        None => {
            let needle = query.to_lowercase();
            chunks
                .into_iter()
                .filter(|(chunk, _, _)| chunk.chunk_text.to_lowercase().contains(&needle))
                .map(|(chunk, title, tier)| KbSearchResult {
                    document_title: title,
                    tier,
                    section_ref: chunk.section_ref.clone(),
                    chunk_text: chunk.chunk_text,
                    score: 0.0,
                })
                .collect()
        }
    };

    results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.tier.cmp(&b.tier)));
    results.truncate(limit);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.5, -0.25, 1.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn mismatched_or_empty_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
