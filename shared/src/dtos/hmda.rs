use serde::{Deserialize, Serialize};

/// Request to record HMDA demographic data for a borrower on an
/// application. Each demographic field carries its own collection method;
/// omitted methods default to `self_reported`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectDemographicsRequest {
    pub application_id: i64,
    pub borrower_id: Option<i64>,
    pub race: Option<String>,
    pub ethnicity: Option<String>,
    pub sex: Option<String>,
    pub age: Option<String>,
    pub race_collected_method: Option<String>,
    pub ethnicity_collected_method: Option<String>,
    pub sex_collected_method: Option<String>,
    pub age_collected_method: Option<String>,
}

/// How a conflicting field was resolved during upsert: `overwritten` when
/// the incoming method outranked the stored one, `kept_existing` otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub resolution: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemographicsResponse {
    pub application_id: i64,
    pub borrower_id: Option<i64>,
    pub race: Option<String>,
    pub ethnicity: Option<String>,
    pub sex: Option<String>,
    pub age: Option<String>,
    pub race_method: Option<String>,
    pub ethnicity_method: Option<String>,
    pub sex_method: Option<String>,
    pub age_method: Option<String>,
    #[serde(default)]
    pub conflicts: Vec<FieldConflict>,
}
