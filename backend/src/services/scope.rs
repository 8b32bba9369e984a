//! Data-scope query predicates and PII masking.
//!
//! Every list/get query over applications (and their documents,
//! conditions, decisions and status) composes its WHERE clause through
//! `application_predicate`, so there is exactly one place that decides
//! what a principal may observe. Out-of-scope reads surface as 404 at the
//! handler layer, never 403.

use chrono::NaiveDate;
use sqlx::{PgPool, Row};

use shared::dtos::applications::BorrowerSummary;

use crate::auth::DataScope;
use crate::errors::{ApiError, ApiResult};
use crate::models::{Application, Borrower};

/// Scope predicate over an `applications` table aliased `a`.
///
/// `bind_index` is the `$N` position the caller reserves for the scope
/// bind; `bind` is `Some` exactly when the clause consumes it. Scoped
/// queries bind the scope value first and number their own binds after it.
pub struct ScopePredicate {
    pub clause: String,
    pub bind: Option<String>,
}

pub fn application_predicate(scope: &DataScope, bind_index: usize) -> ScopePredicate {
    if scope.full_pipeline {
        return ScopePredicate {
            clause: "TRUE".to_string(),
            bind: None,
        };
    }
    if scope.own_data_only {
        if let Some(user_id) = &scope.user_id {
            return ScopePredicate {
                clause: format!(
                    "a.id IN (SELECT ab.application_id FROM application_borrowers ab \
                     INNER JOIN borrowers b ON ab.borrower_id = b.id WHERE b.subject = ${})",
                    bind_index
                ),
                bind: Some(user_id.clone()),
            };
        }
    }
    if let Some(assigned_to) = &scope.assigned_to {
        return ScopePredicate {
            clause: format!("a.assigned_to = ${}", bind_index),
            bind: Some(assigned_to.clone()),
        };
    }
    // No scope input matches no rows (prospects and malformed scopes).
    ScopePredicate {
        clause: "FALSE".to_string(),
        bind: None,
    }
}

/// SSN mask: keep the last four digits.
pub fn mask_ssn(ssn: &str) -> String {
    let digits: String = ssn.chars().filter(|c| c.is_ascii_digit()).collect();
    let last4 = if digits.len() >= 4 {
        &digits[digits.len() - 4..]
    } else {
        digits.as_str()
    };
    format!("***-**-{}", last4)
}

/// DOB mask: keep the birth year only.
pub fn mask_dob(dob: NaiveDate) -> String {
    format!("{}-**-**", dob.format("%Y"))
}

/// Builds the borrower summary embedded in application responses,
/// applying the scope's PII mask at this response boundary.
pub fn borrower_summary(borrower: &Borrower, is_primary: bool, scope: &DataScope) -> BorrowerSummary {
    let (ssn, dob) = if scope.pii_mask {
        (
            borrower.ssn.as_deref().map(mask_ssn),
            borrower.dob.map(mask_dob),
        )
    } else {
        (
            borrower.ssn.clone(),
            borrower.dob.map(|d| d.format("%Y-%m-%d").to_string()),
        )
    };
    BorrowerSummary {
        id: borrower.id,
        first_name: borrower.first_name.clone(),
        last_name: borrower.last_name.clone(),
        email: borrower.email.clone(),
        ssn,
        dob,
        employment_status: borrower.employment_status,
        is_primary,
    }
}

/// Loads one application the principal may see. A row outside the scope
/// reads exactly like a missing row.
pub async fn fetch_application_scoped(
    pool: &PgPool,
    scope: &DataScope,
    application_id: i64,
) -> ApiResult<Application> {
    let predicate = application_predicate(scope, 1);
    let sql = format!(
        "SELECT a.* FROM applications a WHERE {} AND a.id = ${}",
        predicate.clause,
        if predicate.bind.is_some() { 2 } else { 1 }
    );
    let mut query = sqlx::query(&sql);
    if let Some(bind) = &predicate.bind {
        query = query.bind(bind.clone());
    }
    query = query.bind(application_id);

    let row = query.fetch_optional(pool).await?;
    match row {
        Some(row) => Ok(Application::from_row(&row)),
        // Existence is not confirmed either way.
        None => Err(ApiError::OutOfScope),
    }
}

/// Borrower summaries for an application, masked per the scope.
pub async fn borrower_summaries(
    pool: &PgPool,
    scope: &DataScope,
    application_id: i64,
) -> ApiResult<Vec<BorrowerSummary>> {
    let rows = sqlx::query(
        "SELECT b.*, ab.is_primary FROM application_borrowers ab \
         INNER JOIN borrowers b ON ab.borrower_id = b.id \
         WHERE ab.application_id = $1 \
         ORDER BY ab.is_primary DESC, b.id",
    )
    .bind(application_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let borrower = Borrower::from_row(row);
            let is_primary: bool = row.get("is_primary");
            borrower_summary(&borrower, is_primary, scope)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::enums::UserRole;

    #[test]
    fn full_pipeline_is_unrestricted() {
        let scope = DataScope::for_role(UserRole::Underwriter, "uw-1");
        let p = application_predicate(&scope, 1);
        assert_eq!(p.clause, "TRUE");
        assert!(p.bind.is_none());
    }

    #[test]
    fn borrower_scope_joins_the_junction() {
        let scope = DataScope::for_role(UserRole::Borrower, "sarah-001");
        let p = application_predicate(&scope, 1);
        assert!(p.clause.contains("application_borrowers"));
        assert!(p.clause.contains("b.subject = $1"));
        assert_eq!(p.bind.as_deref(), Some("sarah-001"));
    }

    #[test]
    fn loan_officer_scope_filters_assignment() {
        let scope = DataScope::for_role(UserRole::LoanOfficer, "lo-7");
        let p = application_predicate(&scope, 3);
        assert_eq!(p.clause, "a.assigned_to = $3");
        assert_eq!(p.bind.as_deref(), Some("lo-7"));
    }

    #[test]
    fn prospect_scope_matches_no_rows() {
        let scope = DataScope::for_role(UserRole::Prospect, "p-1");
        let p = application_predicate(&scope, 1);
        assert_eq!(p.clause, "FALSE");
    }

    #[test]
    fn ssn_mask_keeps_last_four() {
        assert_eq!(mask_ssn("123-45-6789"), "***-**-6789");
        assert_eq!(mask_ssn("123456789"), "***-**-6789");
    }

    #[test]
    fn dob_mask_keeps_year() {
        let dob = NaiveDate::from_ymd_opt(1990, 6, 15).unwrap();
        assert_eq!(mask_dob(dob), "1990-**-**");
    }
}
