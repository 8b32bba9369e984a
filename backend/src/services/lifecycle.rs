//! Application stage machine.
//!
//! The transition table is immutable data declared here; it is consulted
//! by every stage-changing write. Terminal stages accept nothing, and the
//! optimistic `from` guard keeps concurrent writers from double-applying a
//! transition. Guard failures still leave an audit event so attempts are
//! visible in the trail.

use sqlx::{Postgres, Transaction};

use shared::dtos::applications::PendingAction;
use shared::models::enums::{ApplicationStage, DocumentType, UserRole};

use crate::auth::Principal;
use crate::errors::{ApiError, ApiResult};
use crate::models::Application;
use crate::services::audit::{write_audit_event, AuditDraft};

use shared::models::enums::ApplicationStage::*;

/// Permitted transitions per stage.
pub fn allowed_transitions(stage: ApplicationStage) -> &'static [ApplicationStage] {
    match stage {
        Inquiry => &[Prequalification, Application, Withdrawn],
        Prequalification => &[Application, Withdrawn],
        Application => &[Processing, Withdrawn],
        // Processing can bounce a file back to application for rework.
        Processing => &[Underwriting, Application, Withdrawn],
        // A suspend decision leaves the stage untouched, so it does not
        // appear here.
        Underwriting => &[ConditionalApproval, ClearToClose, Denied],
        ConditionalApproval => &[ClearToClose, Underwriting, Denied],
        // Clear-to-close can be re-opened into underwriting.
        ClearToClose => &[Closed, Underwriting, Denied],
        Closed | Denied | Withdrawn => &[],
    }
}

pub fn can_transition(from: ApplicationStage, to: ApplicationStage) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Moves an application from `from` to `to` inside the caller's
/// transaction, re-reading the current stage under lock as the optimistic
/// guard. Writes the `stage_transition` audit event; guard failures write
/// an audit event with an `error` marker before returning the typed error.
pub async fn transition_stage(
    tx: &mut Transaction<'_, Postgres>,
    principal: &Principal,
    application_id: i64,
    from: ApplicationStage,
    to: ApplicationStage,
) -> ApiResult<Application> {
    let row = sqlx::query("SELECT * FROM applications WHERE id = $1 FOR UPDATE")
        .bind(application_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ApiError::NotFound("application"))?;
    let current = Application::from_row(&row);

    if current.stage != from {
        write_audit_event(
            tx,
            AuditDraft::new("stage_transition")
                .user(&principal.user_id, principal.role.as_str())
                .application(application_id)
                .data(serde_json::json!({
                    "error": "wrong_stage",
                    "expected": from.as_str(),
                    "actual": current.stage.as_str(),
                    "requested": to.as_str(),
                })),
        )
        .await?;
        return Err(ApiError::precondition(
            "wrong_stage",
            format!(
                "application is in stage '{}', not '{}'",
                current.stage, from
            ),
        ));
    }

    if !can_transition(from, to) {
        write_audit_event(
            tx,
            AuditDraft::new("stage_transition")
                .user(&principal.user_id, principal.role.as_str())
                .application(application_id)
                .data(serde_json::json!({
                    "error": "invalid_transition",
                    "from_stage": from.as_str(),
                    "to_stage": to.as_str(),
                })),
        )
        .await?;
        return Err(ApiError::precondition(
            "invalid_transition",
            format!("cannot transition from '{}' to '{}'", from, to),
        ));
    }

    let row = sqlx::query(
        "UPDATE applications SET stage = $1, updated_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(to.as_str())
    .bind(application_id)
    .fetch_one(&mut **tx)
    .await?;
    let updated = Application::from_row(&row);

    write_audit_event(
        tx,
        AuditDraft::new("stage_transition")
            .user(&principal.user_id, principal.role.as_str())
            .application(application_id)
            .data(serde_json::json!({
                "from_stage": from.as_str(),
                "to_stage": to.as_str(),
            })),
    )
    .await?;

    Ok(updated)
}

/// Guards any lifecycle write against terminal applications.
pub fn ensure_not_terminal(app: &Application) -> ApiResult<()> {
    if app.stage.is_terminal() {
        return Err(ApiError::precondition(
            "terminal_stage",
            format!("application in stage '{}' accepts no further writes", app.stage),
        ));
    }
    Ok(())
}

/// Computes what the caller should do next on this file. Pure over the
/// inputs; the status handler assembles them from the database.
pub fn pending_actions(
    stage: ApplicationStage,
    role: UserRole,
    missing_doc_types: &[DocumentType],
    open_condition_ids: &[i64],
    responded_condition_ids: &[i64],
) -> Vec<PendingAction> {
    if stage.is_terminal() {
        return vec![];
    }

    let mut actions = Vec::new();
    for doc_type in missing_doc_types {
        actions.push(PendingAction {
            action_type: "upload_document".to_string(),
            description: format!("Upload required document: {}", doc_type),
            detail: Some(doc_type.as_str().to_string()),
        });
    }
    for id in open_condition_ids {
        actions.push(PendingAction {
            action_type: "respond_condition".to_string(),
            description: format!("Respond to underwriting condition #{}", id),
            detail: Some(id.to_string()),
        });
    }
    if matches!(role, UserRole::Underwriter | UserRole::Admin) {
        for id in responded_condition_ids {
            actions.push(PendingAction {
                action_type: "review_condition".to_string(),
                description: format!("Review borrower response on condition #{}", id),
                detail: Some(id.to_string()),
            });
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inquiry_can_reach_application_or_withdraw() {
        assert!(can_transition(Inquiry, Application));
        assert!(can_transition(Inquiry, Prequalification));
        assert!(can_transition(Inquiry, Withdrawn));
        assert!(!can_transition(Inquiry, Underwriting));
    }

    #[test]
    fn processing_can_bounce_back() {
        assert!(can_transition(Processing, Application));
        assert!(can_transition(Processing, Underwriting));
    }

    #[test]
    fn underwriting_outcomes() {
        assert!(can_transition(Underwriting, ConditionalApproval));
        assert!(can_transition(Underwriting, ClearToClose));
        assert!(can_transition(Underwriting, Denied));
        assert!(!can_transition(Underwriting, Closed));
    }

    #[test]
    fn clear_to_close_can_reopen() {
        assert!(can_transition(ClearToClose, Underwriting));
        assert!(can_transition(ClearToClose, Closed));
    }

    #[test]
    fn terminal_stages_go_nowhere() {
        for stage in [Closed, Denied, Withdrawn] {
            assert!(allowed_transitions(stage).is_empty());
        }
    }

    #[test]
    fn terminal_stage_has_no_pending_actions() {
        let actions = pending_actions(
            Closed,
            UserRole::Borrower,
            &[DocumentType::W2],
            &[1],
            &[2],
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn clear_to_close_still_reports_actions() {
        let actions = pending_actions(ClearToClose, UserRole::Borrower, &[DocumentType::Id], &[], &[]);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, "upload_document");
    }

    #[test]
    fn review_actions_are_underwriter_only() {
        let borrower = pending_actions(Underwriting, UserRole::Borrower, &[], &[], &[7]);
        assert!(borrower.is_empty());
        let uw = pending_actions(Underwriting, UserRole::Underwriter, &[], &[], &[7]);
        assert_eq!(uw[0].action_type, "review_condition");
    }
}
