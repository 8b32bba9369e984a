//! Document completeness evaluation.
//!
//! The requirement matrix keys on (loan_type, primary borrower's
//! employment status) with a fallback chain: exact -> (loan_type,
//! _default) -> (_default, _default). The matrix is immutable data
//! declared here; changing it means a restart, never a runtime swap.

use sqlx::PgPool;

use shared::dtos::documents::{CompletenessResponse, RequirementStatus};
use shared::models::enums::{DocumentStatus, DocumentType, EmploymentStatus, LoanType};

use crate::errors::ApiResult;
use crate::models::Document;

use shared::models::enums::DocumentType::*;

/// Requirements for a (loan_type, employment_status) cell; `None` in
/// either position is the `_default` row/column.
fn matrix_lookup(
    loan_type: Option<LoanType>,
    employment: Option<EmploymentStatus>,
) -> Option<&'static [DocumentType]> {
    match (loan_type, employment) {
        // FHA underwriting wants tax returns across the board.
        (Some(LoanType::Fha), Some(EmploymentStatus::SelfEmployed)) => {
            Some(&[TaxReturn, BankStatement, Id])
        }
        (Some(LoanType::Fha), None) => Some(&[W2, PayStub, TaxReturn, BankStatement, Id]),
        // Jumbo files add an appraisal up front.
        (Some(LoanType::Jumbo), None) => Some(&[W2, PayStub, BankStatement, Id, PropertyAppraisal]),
        // Defaults by employment status.
        (None, Some(EmploymentStatus::SelfEmployed)) => Some(&[TaxReturn, BankStatement, Id]),
        (None, Some(EmploymentStatus::Retired)) => Some(&[TaxReturn, BankStatement, Id]),
        (None, Some(EmploymentStatus::Unemployed)) => Some(&[BankStatement, Id]),
        (None, Some(EmploymentStatus::W2Employee)) => Some(&[W2, PayStub, BankStatement, Id]),
        // Global default: W2 employee requirements.
        (None, None) => Some(&[W2, PayStub, BankStatement, Id]),
        _ => None,
    }
}

/// Required document types with the exact -> loan-type default -> global
/// default fallback chain.
pub fn required_doc_types(
    loan_type: Option<LoanType>,
    employment: Option<EmploymentStatus>,
) -> &'static [DocumentType] {
    matrix_lookup(loan_type, employment)
        .or_else(|| matrix_lookup(loan_type, None))
        .or_else(|| matrix_lookup(None, employment))
        .or_else(|| matrix_lookup(None, None))
        .unwrap_or(&[W2, PayStub, BankStatement, Id])
}

/// Evaluates completeness for an application given its documents. A
/// requirement counts as provided when its newest non-rejected document
/// exists; the newest document's status and quality flags ride along.
pub fn evaluate(
    application_id: i64,
    loan_type: Option<LoanType>,
    employment: Option<EmploymentStatus>,
    documents: &[Document],
) -> CompletenessResponse {
    let required = required_doc_types(loan_type, employment);

    let mut requirements = Vec::with_capacity(required.len());
    let mut provided_count = 0;
    for doc_type in required {
        let newest = documents
            .iter()
            .filter(|d| d.doc_type == *doc_type && d.status != DocumentStatus::Rejected)
            .max_by_key(|d| (d.created_at, d.id));
        let is_provided = newest.is_some();
        if is_provided {
            provided_count += 1;
        }
        requirements.push(RequirementStatus {
            doc_type: *doc_type,
            is_provided,
            status: newest.map(|d| d.status),
            quality_flags: newest.map(|d| d.flags()).unwrap_or_default(),
        });
    }

    CompletenessResponse {
        application_id,
        required_count: required.len(),
        provided_count,
        is_complete: provided_count == required.len(),
        requirements,
    }
}

/// Loads the documents and the primary borrower's employment status, then
/// evaluates.
pub async fn check_completeness(
    pool: &PgPool,
    application_id: i64,
    loan_type: Option<LoanType>,
) -> ApiResult<CompletenessResponse> {
    let employment: Option<String> = sqlx::query_scalar::<_, Option<String>>(
        "SELECT b.employment_status FROM application_borrowers ab \
         INNER JOIN borrowers b ON ab.borrower_id = b.id \
         WHERE ab.application_id = $1 AND ab.is_primary = TRUE",
    )
    .bind(application_id)
    .fetch_optional(pool)
    .await?
    .flatten();

    let rows = sqlx::query("SELECT * FROM documents WHERE application_id = $1")
        .bind(application_id)
        .fetch_all(pool)
        .await?;
    let documents: Vec<Document> = rows.iter().map(Document::from_row).collect();

    Ok(evaluate(
        application_id,
        loan_type,
        employment.as_deref().and_then(EmploymentStatus::parse),
        &documents,
    ))
}

/// Document classes backing the ATR/QM documentation gates.
pub fn atr_qm_doc_presence(documents: &[Document]) -> (bool, bool, bool) {
    let present = |types: &[DocumentType]| {
        documents
            .iter()
            .any(|d| types.contains(&d.doc_type) && d.status != DocumentStatus::Rejected)
    };
    let has_income = present(&[W2, PayStub, TaxReturn]);
    let has_assets = present(&[BankStatement]);
    let has_employment = present(&[W2, PayStub]);
    (has_income, has_assets, has_employment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn doc(id: i64, doc_type: DocumentType, status: DocumentStatus) -> Document {
        Document {
            id,
            application_id: 1,
            borrower_id: Some(1),
            condition_id: None,
            doc_type,
            file_path: Some(format!("1/{}/file.pdf", id)),
            status,
            quality_flags: None,
            uploaded_by: Some("sarah-001".to_string()),
            created_at: Utc::now() + Duration::seconds(id),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn default_requirements_are_w2_employee_set() {
        let required = required_doc_types(None, None);
        assert!(required.contains(&W2));
        assert!(required.contains(&PayStub));
        assert!(required.contains(&BankStatement));
        assert!(required.contains(&Id));
        assert_eq!(required.len(), 4);
    }

    #[test]
    fn self_employed_swaps_w2_for_tax_return() {
        let required = required_doc_types(None, Some(EmploymentStatus::SelfEmployed));
        assert!(required.contains(&TaxReturn));
        assert!(!required.contains(&W2));
        assert!(!required.contains(&PayStub));
    }

    #[test]
    fn unemployed_needs_only_statement_and_id() {
        let required = required_doc_types(None, Some(EmploymentStatus::Unemployed));
        assert_eq!(required, &[BankStatement, Id]);
    }

    #[test]
    fn fha_default_adds_tax_return() {
        let required = required_doc_types(Some(LoanType::Fha), Some(EmploymentStatus::Other));
        assert!(required.contains(&TaxReturn));
    }

    #[test]
    fn unknown_combination_falls_back_to_default() {
        let required = required_doc_types(Some(LoanType::Va), Some(EmploymentStatus::W2Employee));
        assert!(required.contains(&W2));
        assert!(required.contains(&Id));
    }

    #[test]
    fn empty_file_is_incomplete_with_four_requirements() {
        let result = evaluate(1, Some(LoanType::Conventional30), None, &[]);
        assert_eq!(result.required_count, 4);
        assert_eq!(result.provided_count, 0);
        assert!(!result.is_complete);
        let types: Vec<DocumentType> = result.requirements.iter().map(|r| r.doc_type).collect();
        for required in [W2, PayStub, BankStatement, Id] {
            assert!(types.contains(&required));
        }
    }

    #[test]
    fn rejected_documents_do_not_count() {
        let docs = vec![doc(1, W2, DocumentStatus::Rejected)];
        let result = evaluate(1, Some(LoanType::Conventional30), None, &docs);
        assert_eq!(result.provided_count, 0);
        let w2 = result.requirements.iter().find(|r| r.doc_type == W2).unwrap();
        assert!(!w2.is_provided);
    }

    #[test]
    fn newest_non_rejected_document_wins() {
        let mut old = doc(1, W2, DocumentStatus::ProcessingComplete);
        old.quality_flags = Some(r#"["blurry"]"#.to_string());
        let new = doc(2, W2, DocumentStatus::ProcessingComplete);
        let result = evaluate(1, Some(LoanType::Conventional30), None, &[old, new]);
        let w2 = result.requirements.iter().find(|r| r.doc_type == W2).unwrap();
        assert!(w2.is_provided);
        assert!(w2.quality_flags.is_empty());
    }

    #[test]
    fn full_set_is_complete() {
        let docs = vec![
            doc(1, W2, DocumentStatus::ProcessingComplete),
            doc(2, PayStub, DocumentStatus::ProcessingComplete),
            doc(3, BankStatement, DocumentStatus::Uploaded),
            doc(4, Id, DocumentStatus::Accepted),
        ];
        let result = evaluate(1, Some(LoanType::Conventional30), None, &docs);
        assert!(result.is_complete);
        assert_eq!(result.provided_count, 4);
    }

    #[test]
    fn atr_doc_classes() {
        let docs = vec![
            doc(1, TaxReturn, DocumentStatus::ProcessingComplete),
            doc(2, BankStatement, DocumentStatus::ProcessingComplete),
        ];
        let (income, assets, employment) = atr_qm_doc_presence(&docs);
        assert!(income);
        assert!(assets);
        // Tax return alone does not verify employment.
        assert!(!employment);
    }
}
