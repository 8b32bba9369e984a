use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::enums::{ApplicationStage, DecisionType};

/// Request to render (or preview) an underwriting decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderDecisionRequest {
    /// One of `approve`, `deny`, `suspend`.
    pub decision: String,
    pub rationale: String,
    #[serde(default)]
    pub denial_reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_score_used: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_score_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributing_factors: Option<String>,
}

/// Recorded decision resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub id: i64,
    pub application_id: i64,
    pub decision_type: DecisionType,
    pub rationale: Option<String>,
    pub ai_recommendation: Option<String>,
    pub ai_agreement: Option<bool>,
    pub override_rationale: Option<String>,
    #[serde(default)]
    pub denial_reasons: Vec<String>,
    pub credit_score_used: Option<i32>,
    pub credit_score_source: Option<String>,
    pub contributing_factors: Option<String>,
    pub decided_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Computed outcome of a decision without any writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionPreviewResponse {
    pub decision_type: DecisionType,
    pub new_stage: ApplicationStage,
    pub outstanding_conditions: usize,
    pub compliance_status: Option<String>,
    pub ai_recommendation: Option<String>,
    pub ai_agreement: Option<bool>,
}
