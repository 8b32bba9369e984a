//! HMDA demographic collection and the loan-data snapshot.
//!
//! All writes here go through the compliance pool; nothing in this module
//! touches lending tables beyond what the `compliance_app` role can read.
//! Demographic upserts resolve per-field conflicts by collection-method
//! precedence, which makes a sequence of same-field updates commutative:
//! the strongest source wins no matter the arrival order.

use log::info;
use rust_decimal::Decimal;
use sqlx::PgPool;

use shared::dtos::hmda::{CollectDemographicsRequest, DemographicsResponse, FieldConflict};
use shared::models::enums::CollectionMethod;

use crate::auth::Principal;
use crate::errors::ApiResult;
use crate::models::HmdaDemographic;
use crate::services::audit::{write_audit_event, AuditDraft};

struct FieldUpdate {
    value: Option<String>,
    method: Option<String>,
}

fn resolve_field(
    field: &'static str,
    incoming_value: Option<&str>,
    incoming_method: CollectionMethod,
    existing_value: Option<&str>,
    existing_method: Option<CollectionMethod>,
    conflicts: &mut Vec<FieldConflict>,
) -> FieldUpdate {
    let Some(incoming) = incoming_value else {
        // Nothing collected for this field; keep whatever is stored.
        return FieldUpdate {
            value: existing_value.map(|v| v.to_string()),
            method: existing_method.map(|m| m.as_str().to_string()),
        };
    };

    match existing_value {
        None => FieldUpdate {
            value: Some(incoming.to_string()),
            method: Some(incoming_method.as_str().to_string()),
        },
        Some(existing) => {
            let existing_method =
                existing_method.unwrap_or(CollectionMethod::NotProvided);
            if existing == incoming && existing_method == incoming_method {
                // Identical re-collection is not a conflict.
                return FieldUpdate {
                    value: Some(existing.to_string()),
                    method: Some(existing_method.as_str().to_string()),
                };
            }
            if incoming_method.precedence() > existing_method.precedence() {
                conflicts.push(FieldConflict {
                    field: field.to_string(),
                    resolution: "overwritten".to_string(),
                });
                FieldUpdate {
                    value: Some(incoming.to_string()),
                    method: Some(incoming_method.as_str().to_string()),
                }
            } else {
                conflicts.push(FieldConflict {
                    field: field.to_string(),
                    resolution: "kept_existing".to_string(),
                });
                FieldUpdate {
                    value: Some(existing.to_string()),
                    method: Some(existing_method.as_str().to_string()),
                }
            }
        }
    }
}

fn method_or_default(raw: &Option<String>) -> CollectionMethod {
    raw.as_deref()
        .and_then(CollectionMethod::parse)
        .unwrap_or(CollectionMethod::SelfReported)
}

/// Upserts demographic data for (application, borrower), resolving each
/// field by method precedence, and records the collection attempt in the
/// audit trail.
pub async fn upsert_demographics(
    compliance_pool: &PgPool,
    principal: &Principal,
    request: &CollectDemographicsRequest,
) -> ApiResult<DemographicsResponse> {
    let mut tx = compliance_pool.begin().await?;

    let existing = sqlx::query(
        "SELECT * FROM hmda.demographics \
         WHERE application_id = $1 AND borrower_id IS NOT DISTINCT FROM $2 \
         FOR UPDATE",
    )
    .bind(request.application_id)
    .bind(request.borrower_id)
    .fetch_optional(&mut *tx)
    .await?
    .map(|row| HmdaDemographic::from_row(&row));

    let mut conflicts = Vec::new();
    let existing_ref = existing.as_ref();
    let parse = |m: &Option<String>| m.as_deref().and_then(CollectionMethod::parse);

    let race = resolve_field(
        "race",
        request.race.as_deref(),
        method_or_default(&request.race_collected_method),
        existing_ref.and_then(|e| e.race.as_deref()),
        existing_ref.and_then(|e| parse(&e.race_method)),
        &mut conflicts,
    );
    let ethnicity = resolve_field(
        "ethnicity",
        request.ethnicity.as_deref(),
        method_or_default(&request.ethnicity_collected_method),
        existing_ref.and_then(|e| e.ethnicity.as_deref()),
        existing_ref.and_then(|e| parse(&e.ethnicity_method)),
        &mut conflicts,
    );
    let sex = resolve_field(
        "sex",
        request.sex.as_deref(),
        method_or_default(&request.sex_collected_method),
        existing_ref.and_then(|e| e.sex.as_deref()),
        existing_ref.and_then(|e| parse(&e.sex_method)),
        &mut conflicts,
    );
    let age = resolve_field(
        "age",
        request.age.as_deref(),
        method_or_default(&request.age_collected_method),
        existing_ref.and_then(|e| e.age.as_deref()),
        existing_ref.and_then(|e| parse(&e.age_method)),
        &mut conflicts,
    );

    let row = match existing_ref {
        Some(existing) => {
            sqlx::query(
                "UPDATE hmda.demographics SET \
                 race = $1, race_method = $2, ethnicity = $3, ethnicity_method = $4, \
                 sex = $5, sex_method = $6, age = $7, age_method = $8, \
                 collected_at = now(), updated_at = now() \
                 WHERE id = $9 RETURNING *",
            )
            .bind(&race.value)
            .bind(&race.method)
            .bind(&ethnicity.value)
            .bind(&ethnicity.method)
            .bind(&sex.value)
            .bind(&sex.method)
            .bind(&age.value)
            .bind(&age.method)
            .bind(existing.id)
            .fetch_one(&mut *tx)
            .await?
        }
        None => {
            sqlx::query(
                "INSERT INTO hmda.demographics \
                 (application_id, borrower_id, race, race_method, ethnicity, ethnicity_method, \
                  sex, sex_method, age, age_method) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
            )
            .bind(request.application_id)
            .bind(request.borrower_id)
            .bind(&race.value)
            .bind(&race.method)
            .bind(&ethnicity.value)
            .bind(&ethnicity.method)
            .bind(&sex.value)
            .bind(&sex.method)
            .bind(&age.value)
            .bind(&age.method)
            .fetch_one(&mut *tx)
            .await?
        }
    };
    let stored = HmdaDemographic::from_row(&row);

    let collected: Vec<&str> = [
        request.race.as_ref().map(|_| "race"),
        request.ethnicity.as_ref().map(|_| "ethnicity"),
        request.sex.as_ref().map(|_| "sex"),
        request.age.as_ref().map(|_| "age"),
    ]
    .into_iter()
    .flatten()
    .collect();

    write_audit_event(
        &mut tx,
        AuditDraft::new("hmda_collection")
            .user(&principal.user_id, principal.role.as_str())
            .application(request.application_id)
            .data(serde_json::json!({
                "borrower_id": request.borrower_id,
                "fields_collected": collected,
                "conflicts": conflicts,
            })),
    )
    .await?;

    tx.commit().await?;

    Ok(DemographicsResponse {
        application_id: stored.application_id,
        borrower_id: stored.borrower_id,
        race: stored.race,
        ethnicity: stored.ethnicity,
        sex: stored.sex,
        age: stored.age,
        race_method: stored.race_method,
        ethnicity_method: stored.ethnicity_method,
        sex_method: stored.sex_method,
        age_method: stored.age_method,
        conflicts,
    })
}

/// Inputs for the loan-data snapshot, gathered by the caller from lending
/// data before crossing into the compliance schema.
#[derive(Debug, Clone, Default)]
pub struct LoanDataSnapshot {
    pub application_id: i64,
    pub gross_monthly_income: Option<Decimal>,
    pub dti_ratio: Option<Decimal>,
    pub credit_score: Option<i32>,
    pub loan_type: Option<String>,
    pub loan_purpose: Option<String>,
    pub property_location: Option<String>,
    pub interest_rate: Option<Decimal>,
    pub total_fees: Option<Decimal>,
}

impl LoanDataSnapshot {
    fn field_presence(&self) -> (Vec<&'static str>, Vec<&'static str>) {
        let mut captured = Vec::new();
        let mut null_fields = Vec::new();
        let mut tally = |name: &'static str, present: bool| {
            if present {
                captured.push(name);
            } else {
                null_fields.push(name);
            }
        };
        tally("gross_monthly_income", self.gross_monthly_income.is_some());
        tally("dti_ratio", self.dti_ratio.is_some());
        tally("credit_score", self.credit_score.is_some());
        tally("loan_type", self.loan_type.is_some());
        tally("loan_purpose", self.loan_purpose.is_some());
        tally("property_location", self.property_location.is_some());
        tally("interest_rate", self.interest_rate.is_some());
        tally("total_fees", self.total_fees.is_some());
        (captured, null_fields)
    }
}

/// Upserts the HMDA-reportable loan-data snapshot for an application.
/// Runs on underwriting submission; re-submission updates in place.
pub async fn snapshot_loan_data(
    compliance_pool: &PgPool,
    principal: &Principal,
    snapshot: &LoanDataSnapshot,
) -> ApiResult<()> {
    let mut tx = compliance_pool.begin().await?;

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM hmda.loan_data WHERE application_id = $1 FOR UPDATE",
    )
    .bind(snapshot.application_id)
    .fetch_optional(&mut *tx)
    .await?;
    let is_update = existing.is_some();

    match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE hmda.loan_data SET \
                 gross_monthly_income = $1, dti_ratio = $2, credit_score = $3, loan_type = $4, \
                 loan_purpose = $5, property_location = $6, interest_rate = $7, total_fees = $8, \
                 snapshot_at = now() \
                 WHERE id = $9",
            )
            .bind(snapshot.gross_monthly_income)
            .bind(snapshot.dti_ratio)
            .bind(snapshot.credit_score)
            .bind(&snapshot.loan_type)
            .bind(&snapshot.loan_purpose)
            .bind(&snapshot.property_location)
            .bind(snapshot.interest_rate)
            .bind(snapshot.total_fees)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO hmda.loan_data \
                 (application_id, gross_monthly_income, dti_ratio, credit_score, loan_type, \
                  loan_purpose, property_location, interest_rate, total_fees) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(snapshot.application_id)
            .bind(snapshot.gross_monthly_income)
            .bind(snapshot.dti_ratio)
            .bind(snapshot.credit_score)
            .bind(&snapshot.loan_type)
            .bind(&snapshot.loan_purpose)
            .bind(&snapshot.property_location)
            .bind(snapshot.interest_rate)
            .bind(snapshot.total_fees)
            .execute(&mut *tx)
            .await?;
        }
    }

    let (captured_fields, null_fields) = snapshot.field_presence();
    write_audit_event(
        &mut tx,
        AuditDraft::new("hmda_loan_data_snapshot")
            .user(&principal.user_id, principal.role.as_str())
            .application(snapshot.application_id)
            .data(serde_json::json!({
                "captured_fields": captured_fields,
                "null_fields": null_fields,
                "is_update": is_update,
            })),
    )
    .await?;

    tx.commit().await?;
    info!(
        "HMDA loan-data snapshot for application {} ({})",
        snapshot.application_id,
        if is_update { "update" } else { "initial" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_reported_overwrites_document_extraction() {
        let mut conflicts = Vec::new();
        let update = resolve_field(
            "race",
            Some("White"),
            CollectionMethod::SelfReported,
            Some("Asian"),
            Some(CollectionMethod::DocumentExtraction),
            &mut conflicts,
        );
        assert_eq!(update.value.as_deref(), Some("White"));
        assert_eq!(update.method.as_deref(), Some("self_reported"));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].resolution, "overwritten");
    }

    #[test]
    fn document_extraction_keeps_self_reported() {
        let mut conflicts = Vec::new();
        let update = resolve_field(
            "race",
            Some("Asian"),
            CollectionMethod::DocumentExtraction,
            Some("White"),
            Some(CollectionMethod::SelfReported),
            &mut conflicts,
        );
        assert_eq!(update.value.as_deref(), Some("White"));
        assert_eq!(conflicts[0].resolution, "kept_existing");
    }

    #[test]
    fn equal_precedence_keeps_existing() {
        let mut conflicts = Vec::new();
        let update = resolve_field(
            "sex",
            Some("Female"),
            CollectionMethod::SelfReported,
            Some("Male"),
            Some(CollectionMethod::SelfReported),
            &mut conflicts,
        );
        assert_eq!(update.value.as_deref(), Some("Male"));
        assert_eq!(conflicts[0].resolution, "kept_existing");
    }

    #[test]
    fn identical_collection_is_not_a_conflict() {
        let mut conflicts = Vec::new();
        let update = resolve_field(
            "race",
            Some("White"),
            CollectionMethod::SelfReported,
            Some("White"),
            Some(CollectionMethod::SelfReported),
            &mut conflicts,
        );
        assert_eq!(update.value.as_deref(), Some("White"));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn first_collection_sets_without_conflict() {
        let mut conflicts = Vec::new();
        let update = resolve_field(
            "age",
            Some("35-44"),
            CollectionMethod::VisualObservation,
            None,
            None,
            &mut conflicts,
        );
        assert_eq!(update.value.as_deref(), Some("35-44"));
        assert_eq!(update.method.as_deref(), Some("visual_observation"));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn absent_incoming_field_preserves_existing() {
        let mut conflicts = Vec::new();
        let update = resolve_field(
            "ethnicity",
            None,
            CollectionMethod::SelfReported,
            Some("Not Hispanic or Latino"),
            Some(CollectionMethod::DocumentExtraction),
            &mut conflicts,
        );
        assert_eq!(update.value.as_deref(), Some("Not Hispanic or Latino"));
        assert_eq!(update.method.as_deref(), Some("document_extraction"));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn snapshot_field_presence_partitions_fields() {
        let snapshot = LoanDataSnapshot {
            application_id: 1,
            gross_monthly_income: Some(Decimal::from(10_000)),
            credit_score: Some(720),
            ..Default::default()
        };
        let (captured, nulls) = snapshot.field_presence();
        assert!(captured.contains(&"gross_monthly_income"));
        assert!(captured.contains(&"credit_score"));
        assert!(nulls.contains(&"dti_ratio"));
        assert!(nulls.contains(&"total_fees"));
        assert_eq!(captured.len() + nulls.len(), 8);
    }
}
