use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;

use shared::dtos::decisions::DecisionResponse;
use shared::models::enums::DecisionType;

/// Recorded underwriting decision.
///
/// A `denied` decision always carries at least one denial reason (ECOA
/// adverse-action rule); the service layer rejects the write otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: i64,
    pub application_id: i64,
    pub decision_type: DecisionType,
    pub rationale: Option<String>,
    pub ai_recommendation: Option<String>,
    pub ai_agreement: Option<bool>,
    pub override_rationale: Option<String>,
    pub denial_reasons: Option<serde_json::Value>,
    pub credit_score_used: Option<i32>,
    pub credit_score_source: Option<String>,
    pub contributing_factors: Option<String>,
    pub decided_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn from_row(row: &PgRow) -> Self {
        let decision_type: String = row.get("decision_type");
        Decision {
            id: row.get("id"),
            application_id: row.get("application_id"),
            decision_type: DecisionType::parse(&decision_type).unwrap_or(DecisionType::Suspended),
            rationale: row.get("rationale"),
            ai_recommendation: row.get("ai_recommendation"),
            ai_agreement: row.get("ai_agreement"),
            override_rationale: row.get("override_rationale"),
            denial_reasons: row.get("denial_reasons"),
            credit_score_used: row.get("credit_score_used"),
            credit_score_source: row.get("credit_score_source"),
            contributing_factors: row.get("contributing_factors"),
            decided_by: row.get("decided_by"),
            created_at: row.get("created_at"),
        }
    }

    /// Denial reasons as a string list regardless of JSON column shape.
    pub fn reasons(&self) -> Vec<String> {
        self.denial_reasons
            .as_ref()
            .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn to_response(&self) -> DecisionResponse {
        DecisionResponse {
            id: self.id,
            application_id: self.application_id,
            decision_type: self.decision_type,
            rationale: self.rationale.clone(),
            ai_recommendation: self.ai_recommendation.clone(),
            ai_agreement: self.ai_agreement,
            override_rationale: self.override_rationale.clone(),
            denial_reasons: self.reasons(),
            credit_score_used: self.credit_score_used,
            credit_score_source: self.credit_score_source.clone(),
            contributing_factors: self.contributing_factors.clone(),
            decided_by: self.decided_by.clone(),
            created_at: self.created_at,
        }
    }
}
