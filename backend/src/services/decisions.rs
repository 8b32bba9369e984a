//! Decision recording with compliance gating.
//!
//! Approvals are blocked unless the most recent recorded compliance check
//! on the file did not FAIL; denials must carry adverse-action reasons;
//! suspensions leave the stage untouched. The same computation backs a
//! write-free preview so the underwriter UI can show the outcome before
//! committing.

use sqlx::{PgPool, Postgres, Transaction};

use shared::dtos::decisions::{DecisionPreviewResponse, RenderDecisionRequest};
use shared::models::enums::{ApplicationStage, ComplianceStatus, DecisionType, UserRole};

use crate::auth::Principal;
use crate::errors::{ApiError, ApiResult};
use crate::models::{Application, Decision};
use crate::services::audit::{
    latest_ai_recommendation, latest_compliance_status, write_audit_event, AuditDraft,
};
use crate::services::lifecycle;

fn verdict_allows_approval(status: Option<&str>) -> bool {
    matches!(
        status.and_then(ComplianceStatus::parse),
        Some(ComplianceStatus::Pass)
            | Some(ComplianceStatus::ConditionalPass)
            | Some(ComplianceStatus::Warning)
    )
}

/// Resolves the requested decision against the current file state.
pub fn resolve_outcome(
    stage: ApplicationStage,
    decision: &str,
    outstanding_conditions: i64,
    compliance_status: Option<&str>,
    denial_reasons: &[String],
) -> ApiResult<(DecisionType, ApplicationStage)> {
    if !matches!(
        stage,
        ApplicationStage::Underwriting | ApplicationStage::ConditionalApproval
    ) {
        return Err(ApiError::precondition(
            "wrong_stage",
            format!("decisions can only be rendered in underwriting stages, not '{}'", stage),
        ));
    }

    match decision {
        "approve" => {
            if !verdict_allows_approval(compliance_status) {
                let detail = match compliance_status {
                    Some(status) => format!(
                        "compliance checks FAILED (ATR/QM, TRID or ECOA): last verdict was {}",
                        status
                    ),
                    None => "compliance checks FAILED to run: no recorded verdict on this application (ATR/QM)"
                        .to_string(),
                };
                return Err(ApiError::precondition("compliance_failed", detail));
            }
            if outstanding_conditions > 0 {
                if stage == ApplicationStage::ConditionalApproval {
                    return Err(ApiError::precondition(
                        "outstanding_conditions",
                        format!(
                            "{} conditions remain open; clear or waive them before final approval",
                            outstanding_conditions
                        ),
                    ));
                }
                Ok((
                    DecisionType::ConditionalApproval,
                    ApplicationStage::ConditionalApproval,
                ))
            } else {
                Ok((DecisionType::Approved, ApplicationStage::ClearToClose))
            }
        }
        "deny" => {
            if denial_reasons.iter().all(|r| r.trim().is_empty()) {
                return Err(ApiError::precondition(
                    "denial_reasons_required",
                    "at least one denial_reason is required for an adverse action",
                ));
            }
            Ok((DecisionType::Denied, ApplicationStage::Denied))
        }
        "suspend" => Ok((DecisionType::Suspended, stage)),
        other => Err(ApiError::BadRequest(format!(
            "unknown decision '{}'; expected approve, deny or suspend",
            other
        ))),
    }
}

async fn gather_context(
    tx: &mut Transaction<'_, Postgres>,
    app: &Application,
) -> ApiResult<(i64, Option<String>, Option<String>)> {
    // Everything reads on the open transaction so a single pooled
    // connection suffices.
    let outstanding: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM conditions \
         WHERE application_id = $1 AND status NOT IN ('cleared', 'waived')",
    )
    .bind(app.id)
    .fetch_one(&mut **tx)
    .await?;
    let compliance = latest_compliance_status(tx, app.id).await?;
    let recommendation = latest_ai_recommendation(tx, app.id).await?;
    Ok((outstanding, compliance, recommendation))
}

fn agreement(decision: &str, recommendation: Option<&str>) -> Option<bool> {
    recommendation.map(|rec| {
        let rec = rec.to_lowercase();
        match decision {
            "approve" => rec.contains("approve"),
            "deny" => rec.contains("deny"),
            "suspend" => rec.contains("suspend"),
            _ => false,
        }
    })
}

/// Computes the decision outcome without writing anything.
pub async fn propose_decision(
    pool: &PgPool,
    _principal: &Principal,
    app: &Application,
    request: &RenderDecisionRequest,
) -> ApiResult<DecisionPreviewResponse> {
    let mut tx = pool.begin().await?;
    let (outstanding, compliance, recommendation) = gather_context(&mut tx, app).await?;
    // Read-only; nothing to commit.
    tx.rollback().await?;

    let (decision_type, new_stage) = resolve_outcome(
        app.stage,
        &request.decision,
        outstanding,
        compliance.as_deref(),
        &request.denial_reasons,
    )?;

    Ok(DecisionPreviewResponse {
        decision_type,
        new_stage,
        outstanding_conditions: outstanding as usize,
        compliance_status: compliance,
        ai_agreement: agreement(&request.decision, recommendation.as_deref()),
        ai_recommendation: recommendation,
    })
}

/// Renders the decision: writes the Decision row, moves the stage, and
/// records the audit trail (including the high-risk override marker when
/// the underwriter goes against the recorded recommendation).
pub async fn render_decision(
    pool: &PgPool,
    principal: &Principal,
    app: &Application,
    request: &RenderDecisionRequest,
) -> ApiResult<Decision> {
    principal.require_role(&[UserRole::Underwriter, UserRole::Admin])?;

    let mut tx = pool.begin().await?;
    let (outstanding, compliance, recommendation) = gather_context(&mut tx, app).await?;

    let outcome = resolve_outcome(
        app.stage,
        &request.decision,
        outstanding,
        compliance.as_deref(),
        &request.denial_reasons,
    );

    let (decision_type, new_stage) = match outcome {
        Ok(resolved) => resolved,
        Err(error) => {
            // Failed attempts still leave a trace.
            let code = match &error {
                ApiError::Precondition { code, .. } => *code,
                _ => "invalid_decision",
            };
            write_audit_event(
                &mut tx,
                AuditDraft::new("decision")
                    .user(&principal.user_id, principal.role.as_str())
                    .application(app.id)
                    .data(serde_json::json!({
                        "error": code,
                        "requested": request.decision,
                    })),
            )
            .await?;
            tx.commit().await?;
            return Err(error);
        }
    };

    let ai_agreement = agreement(&request.decision, recommendation.as_deref());
    let denial_reasons: Vec<String> = request
        .denial_reasons
        .iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();

    let row = sqlx::query(
        "INSERT INTO decisions \
         (application_id, decision_type, rationale, ai_recommendation, ai_agreement, \
          override_rationale, denial_reasons, credit_score_used, credit_score_source, \
          contributing_factors, decided_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
    )
    .bind(app.id)
    .bind(decision_type.as_str())
    .bind(&request.rationale)
    .bind(&recommendation)
    .bind(ai_agreement)
    .bind(&request.override_rationale)
    .bind(if denial_reasons.is_empty() {
        None
    } else {
        Some(serde_json::json!(denial_reasons))
    })
    .bind(request.credit_score_used)
    .bind(&request.credit_score_source)
    .bind(&request.contributing_factors)
    .bind(&principal.user_id)
    .fetch_one(&mut *tx)
    .await?;
    let decision = Decision::from_row(&row);

    if new_stage != app.stage {
        lifecycle::transition_stage(&mut tx, principal, app.id, app.stage, new_stage).await?;
    }

    // Disagreement with the recorded recommendation plus an override
    // rationale gets its own high-risk marker.
    if ai_agreement == Some(false) {
        if let Some(override_rationale) = &request.override_rationale {
            write_audit_event(
                &mut tx,
                AuditDraft::new("override")
                    .user(&principal.user_id, principal.role.as_str())
                    .application(app.id)
                    .decision(decision.id)
                    .data(serde_json::json!({
                        "high_risk": true,
                        "override_rationale": override_rationale,
                        "ai_recommendation": recommendation,
                    })),
            )
            .await?;
        }
    }

    write_audit_event(
        &mut tx,
        AuditDraft::new("decision")
            .user(&principal.user_id, principal.role.as_str())
            .application(app.id)
            .decision(decision.id)
            .data(serde_json::json!({
                "decision_type": decision_type.as_str(),
                "new_stage": new_stage.as_str(),
                "outstanding_conditions": outstanding,
                "compliance_status": compliance,
            })),
    )
    .await?;

    tx.commit().await?;
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reasons(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn approval_requires_underwriting_stage() {
        let err = resolve_outcome(ApplicationStage::Processing, "approve", 0, Some("PASS"), &[])
            .unwrap_err();
        assert!(matches!(err, ApiError::Precondition { code: "wrong_stage", .. }));
    }

    #[test]
    fn approval_blocked_without_compliance_verdict() {
        let err =
            resolve_outcome(ApplicationStage::Underwriting, "approve", 0, None, &[]).unwrap_err();
        match err {
            ApiError::Precondition { code, message } => {
                assert_eq!(code, "compliance_failed");
                assert!(message.contains("FAILED"));
                assert!(message.contains("ATR/QM"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn approval_blocked_on_fail_verdict() {
        let err = resolve_outcome(ApplicationStage::Underwriting, "approve", 0, Some("FAIL"), &[])
            .unwrap_err();
        assert!(matches!(err, ApiError::Precondition { code: "compliance_failed", .. }));
    }

    #[test]
    fn approval_allowed_on_warning_and_conditional_pass() {
        for verdict in ["PASS", "CONDITIONAL_PASS", "WARNING"] {
            let (decision_type, stage) =
                resolve_outcome(ApplicationStage::Underwriting, "approve", 0, Some(verdict), &[])
                    .unwrap();
            assert_eq!(decision_type, DecisionType::Approved);
            assert_eq!(stage, ApplicationStage::ClearToClose);
        }
    }

    #[test]
    fn approval_with_outstanding_conditions_is_conditional() {
        let (decision_type, stage) =
            resolve_outcome(ApplicationStage::Underwriting, "approve", 2, Some("PASS"), &[])
                .unwrap();
        assert_eq!(decision_type, DecisionType::ConditionalApproval);
        assert_eq!(stage, ApplicationStage::ConditionalApproval);
    }

    #[test]
    fn final_approval_from_conditional_requires_zero_conditions() {
        let err = resolve_outcome(
            ApplicationStage::ConditionalApproval,
            "approve",
            1,
            Some("PASS"),
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Precondition { code: "outstanding_conditions", .. }));

        let (decision_type, stage) = resolve_outcome(
            ApplicationStage::ConditionalApproval,
            "approve",
            0,
            Some("PASS"),
            &[],
        )
        .unwrap();
        assert_eq!(decision_type, DecisionType::Approved);
        assert_eq!(stage, ApplicationStage::ClearToClose);
    }

    #[test]
    fn denial_requires_reasons() {
        let err =
            resolve_outcome(ApplicationStage::Underwriting, "deny", 0, Some("PASS"), &[])
                .unwrap_err();
        match err {
            ApiError::Precondition { code, .. } => assert_eq!(code, "denial_reasons_required"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn denial_with_reasons_moves_to_denied() {
        let (decision_type, stage) = resolve_outcome(
            ApplicationStage::Underwriting,
            "deny",
            3,
            None,
            &reasons(&["Insufficient income", "High DTI"]),
        )
        .unwrap();
        assert_eq!(decision_type, DecisionType::Denied);
        assert_eq!(stage, ApplicationStage::Denied);
    }

    #[test]
    fn suspend_leaves_stage() {
        let (decision_type, stage) =
            resolve_outcome(ApplicationStage::Underwriting, "suspend", 5, None, &[]).unwrap();
        assert_eq!(decision_type, DecisionType::Suspended);
        assert_eq!(stage, ApplicationStage::Underwriting);
    }

    #[test]
    fn agreement_matches_recommendation_text() {
        assert_eq!(agreement("approve", Some("approve with conditions")), Some(true));
        assert_eq!(agreement("deny", Some("recommend approval")), Some(false));
        assert_eq!(agreement("approve", None), None);
    }
}
