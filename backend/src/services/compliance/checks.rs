//! ECOA, ATR/QM and TRID checks plus the combined runner.
//!
//! Business-day arithmetic counts Mondays through Fridays only; federal
//! holidays are not modeled, which a production TRID implementation would
//! have to add.

use chrono::{DateTime, Datelike, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shared::models::enums::ComplianceStatus;

/// Result of one regulation check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub regulation: String,
    pub status: ComplianceStatus,
    pub rationale: String,
    #[serde(default)]
    pub details: Vec<String>,
}

/// Weekdays strictly after `from` up to and including `to`; zero when the
/// interval is empty or inverted.
pub fn business_days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let mut from_day = from.date_naive();
    let to_day = to.date_naive();
    let mut count = 0;
    while from_day < to_day {
        from_day = from_day.succ_opt().expect("date overflow");
        if !matches!(from_day.weekday(), Weekday::Sat | Weekday::Sun) {
            count += 1;
        }
    }
    count
}

/// ECOA: decisions rest on financial factors alone. The structural
/// enforcement is that lending queries cannot reach the HMDA schema at
/// all; this check reports whether a demographic lookup was attempted
/// (and refused) during underwriting.
pub fn check_ecoa(has_demographic_query: bool) -> ComplianceCheck {
    if has_demographic_query {
        ComplianceCheck {
            regulation: "ECOA".to_string(),
            status: ComplianceStatus::Warning,
            rationale: "A demographic data query was attempted and refused during underwriting"
                .to_string(),
            details: vec![
                "Demographic data is isolated from lending decisions by schema-level grants"
                    .to_string(),
            ],
        }
    } else {
        ComplianceCheck {
            regulation: "ECOA".to_string(),
            status: ComplianceStatus::Pass,
            rationale: "Decision inputs are limited to financial factors".to_string(),
            details: vec![],
        }
    }
}

/// ATR/QM: DTI drives the verdict, documentation gates the safe harbor.
pub fn check_atr_qm(
    dti: Option<Decimal>,
    has_income_docs: bool,
    has_asset_docs: bool,
    has_employment_docs: bool,
) -> ComplianceCheck {
    let safe_harbor = Decimal::new(43, 2); // 0.43
    let presumption_cap = Decimal::new(50, 2); // 0.50

    let mut details = Vec::new();
    if !has_income_docs {
        details.push("Income documentation is missing".to_string());
    }
    if !has_asset_docs {
        details.push("Asset documentation is missing".to_string());
    }
    if !has_employment_docs {
        details.push("Employment documentation is missing".to_string());
    }
    let all_docs = has_income_docs && has_asset_docs && has_employment_docs;

    let Some(dti) = dti else {
        return ComplianceCheck {
            regulation: "ATR/QM".to_string(),
            status: ComplianceStatus::Fail,
            rationale: "DTI cannot be computed from the financials on file".to_string(),
            details,
        };
    };

    if dti > presumption_cap {
        ComplianceCheck {
            regulation: "ATR/QM".to_string(),
            status: ComplianceStatus::Fail,
            rationale: format!("DTI {:.1}% exceeds the 50% qualified-mortgage cap", dti * Decimal::from(100)),
            details,
        }
    } else if dti > safe_harbor {
        details.push(
            "DTI in the 43-50% band carries a rebuttable presumption of compliance".to_string(),
        );
        ComplianceCheck {
            regulation: "ATR/QM".to_string(),
            status: ComplianceStatus::ConditionalPass,
            rationale: "Rebuttable presumption: DTI is above the 43% safe harbor".to_string(),
            details,
        }
    } else if all_docs {
        ComplianceCheck {
            regulation: "ATR/QM".to_string(),
            status: ComplianceStatus::Pass,
            rationale: "Safe harbor: DTI within 43% with full documentation".to_string(),
            details,
        }
    } else {
        ComplianceCheck {
            regulation: "ATR/QM".to_string(),
            status: ComplianceStatus::Warning,
            rationale: "DTI is within the safe harbor but documentation is incomplete".to_string(),
            details,
        }
    }
}

/// TRID: LE within 3 business days of application; CD at least 3 business
/// days before closing.
pub fn check_trid(
    le_delivery_date: Option<DateTime<Utc>>,
    app_created_at: DateTime<Utc>,
    cd_delivery_date: Option<DateTime<Utc>>,
    closing_date: Option<DateTime<Utc>>,
) -> ComplianceCheck {
    let mut details = Vec::new();
    let mut worst = ComplianceStatus::Pass;

    let raise = |status: ComplianceStatus, worst: &mut ComplianceStatus| {
        if status.severity_rank() > worst.severity_rank() {
            *worst = status;
        }
    };

    match le_delivery_date {
        Some(le) => {
            let days = business_days_between(app_created_at, le);
            if days <= 3 {
                details.push(format!(
                    "Loan Estimate delivered on time ({} business days after application)",
                    days
                ));
            } else {
                details.push(format!(
                    "Loan Estimate delivery at {} business days exceeds the 3-business-day limit",
                    days
                ));
                raise(ComplianceStatus::Fail, &mut worst);
            }
        }
        None => {
            details.push("Loan Estimate not yet delivered".to_string());
            raise(ComplianceStatus::Warning, &mut worst);
        }
    }

    match closing_date {
        None => {
            details.push("No closing scheduled; Closing Disclosure timing not applicable".to_string());
        }
        Some(closing) => match cd_delivery_date {
            Some(cd) => {
                let days = business_days_between(cd, closing);
                if days >= 3 {
                    details.push(format!(
                        "Closing Disclosure delivered on time ({} business days before closing)",
                        days
                    ));
                } else {
                    details.push(format!(
                        "Closing Disclosure must be at least 3 business days before closing (got {})",
                        days
                    ));
                    raise(ComplianceStatus::Fail, &mut worst);
                }
            }
            None => {
                details.push("Closing scheduled but Closing Disclosure not yet delivered".to_string());
                raise(ComplianceStatus::Warning, &mut worst);
            }
        },
    }

    let rationale = match worst {
        ComplianceStatus::Pass => "Disclosure timing requirements are satisfied".to_string(),
        ComplianceStatus::Warning => "A required disclosure has not been delivered yet".to_string(),
        _ => "Disclosure timing violates TRID limits".to_string(),
    };

    ComplianceCheck {
        regulation: "TRID".to_string(),
        status: worst,
        rationale,
        details,
    }
}

/// Combined verdict over all checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRunResult {
    pub checks: Vec<ComplianceCheck>,
    pub overall_status: ComplianceStatus,
    pub can_proceed: bool,
}

pub fn run_all_checks(
    ecoa: ComplianceCheck,
    atr_qm: ComplianceCheck,
    trid: ComplianceCheck,
) -> ComplianceRunResult {
    let checks = vec![ecoa, atr_qm, trid];
    let overall_status = checks
        .iter()
        .map(|c| c.status)
        .max_by_key(|s| s.severity_rank())
        .unwrap_or(ComplianceStatus::Pass);
    ComplianceRunResult {
        can_proceed: overall_status != ComplianceStatus::Fail,
        overall_status,
        checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    // -- ECOA ------------------------------------------------------------

    #[test]
    fn ecoa_default_passes() {
        let result = check_ecoa(false);
        assert_eq!(result.status, ComplianceStatus::Pass);
        assert_eq!(result.regulation, "ECOA");
        assert!(result.rationale.to_lowercase().contains("financial factors"));
    }

    #[test]
    fn ecoa_demographic_query_warns() {
        let result = check_ecoa(true);
        assert_eq!(result.status, ComplianceStatus::Warning);
        assert!(result.rationale.to_lowercase().contains("attempted and refused"));
    }

    // -- ATR/QM ----------------------------------------------------------

    #[test]
    fn atr_qm_pass_low_dti_all_docs() {
        let result = check_atr_qm(Some(dec!(0.38)), true, true, true);
        assert_eq!(result.status, ComplianceStatus::Pass);
        assert!(result.rationale.to_lowercase().contains("safe harbor"));
    }

    #[test]
    fn atr_qm_conditional_pass_elevated_dti() {
        let result = check_atr_qm(Some(dec!(0.46)), true, true, true);
        assert_eq!(result.status, ComplianceStatus::ConditionalPass);
        assert!(result.rationale.to_lowercase().contains("rebuttable presumption"));
    }

    #[test]
    fn atr_qm_fail_extreme_dti() {
        let result = check_atr_qm(Some(dec!(0.55)), true, true, true);
        assert_eq!(result.status, ComplianceStatus::Fail);
        assert!(result.rationale.contains("50%"));
    }

    #[test]
    fn atr_qm_fail_no_dti() {
        let result = check_atr_qm(None, true, true, true);
        assert_eq!(result.status, ComplianceStatus::Fail);
        assert!(result.rationale.to_lowercase().contains("cannot be computed"));
    }

    #[test]
    fn atr_qm_warning_missing_income_docs() {
        let result = check_atr_qm(Some(dec!(0.35)), false, true, true);
        assert_eq!(result.status, ComplianceStatus::Warning);
        assert!(result.details.iter().any(|d| d.to_lowercase().contains("income")));
    }

    #[test]
    fn atr_qm_warning_missing_asset_docs() {
        let result = check_atr_qm(Some(dec!(0.35)), true, false, true);
        assert_eq!(result.status, ComplianceStatus::Warning);
        assert!(result.details.iter().any(|d| d.to_lowercase().contains("asset")));
    }

    #[test]
    fn atr_qm_warning_missing_employment_docs_only() {
        let result = check_atr_qm(Some(dec!(0.35)), true, true, false);
        assert_eq!(result.status, ComplianceStatus::Warning);
        assert!(result.details.iter().any(|d| d.to_lowercase().contains("employment")));
    }

    #[test]
    fn atr_qm_boundary_at_043_is_pass() {
        let result = check_atr_qm(Some(dec!(0.43)), true, true, true);
        assert_eq!(result.status, ComplianceStatus::Pass);
    }

    #[test]
    fn atr_qm_boundary_at_050_is_conditional_pass() {
        let result = check_atr_qm(Some(dec!(0.50)), true, true, true);
        assert_eq!(result.status, ComplianceStatus::ConditionalPass);
    }

    #[test]
    fn atr_qm_elevated_dti_wins_over_missing_docs() {
        // DTI 0.43-0.50 drives CONDITIONAL_PASS regardless of doc
        // completeness; missing-doc details are still appended.
        let result = check_atr_qm(Some(dec!(0.46)), false, true, true);
        assert_eq!(result.status, ComplianceStatus::ConditionalPass);
        assert!(result.details.iter().any(|d| d.to_lowercase().contains("income")));
        assert!(result.details.iter().any(|d| d.to_lowercase().contains("rebuttable")));
    }

    #[test]
    fn atr_qm_no_dti_no_docs_lists_everything() {
        let result = check_atr_qm(None, false, false, false);
        assert_eq!(result.status, ComplianceStatus::Fail);
        assert!(result.details.iter().any(|d| d.to_lowercase().contains("income")));
        assert!(result.details.iter().any(|d| d.to_lowercase().contains("asset")));
        assert!(result.details.iter().any(|d| d.to_lowercase().contains("employment")));
    }

    // -- TRID ------------------------------------------------------------

    #[test]
    fn trid_pass_le_on_time() {
        // Monday -> Wednesday = 2 business days
        let result = check_trid(Some(utc(2026, 3, 4)), utc(2026, 3, 2), None, None);
        assert_eq!(result.status, ComplianceStatus::Pass);
        assert!(result.details.iter().any(|d| d.to_lowercase().contains("on time")));
    }

    #[test]
    fn trid_fail_le_late() {
        // Mon -> Mon next week = 5 business days
        let result = check_trid(Some(utc(2026, 3, 9)), utc(2026, 3, 2), None, None);
        assert_eq!(result.status, ComplianceStatus::Fail);
        assert!(result.details.iter().any(|d| d.to_lowercase().contains("exceeds")));
    }

    #[test]
    fn trid_warning_no_le_date() {
        let result = check_trid(None, utc(2026, 3, 2), None, None);
        assert_eq!(result.status, ComplianceStatus::Warning);
        assert!(result.details.iter().any(|d| d.to_lowercase().contains("not yet delivered")));
    }

    #[test]
    fn trid_pass_cd_on_time() {
        // CD Mon -> closing Mon next week = 5 business days
        let result = check_trid(
            Some(utc(2026, 2, 22)),
            utc(2026, 2, 20),
            Some(utc(2026, 3, 2)),
            Some(utc(2026, 3, 9)),
        );
        assert_eq!(result.status, ComplianceStatus::Pass);
    }

    #[test]
    fn trid_fail_cd_late() {
        // CD Thu -> closing Fri = 1 business day
        let result = check_trid(
            Some(utc(2026, 2, 22)),
            utc(2026, 2, 20),
            Some(utc(2026, 3, 5)),
            Some(utc(2026, 3, 6)),
        );
        assert_eq!(result.status, ComplianceStatus::Fail);
        assert!(result.details.iter().any(|d| d.contains("must be at least 3")));
    }

    #[test]
    fn trid_warning_no_cd_with_closing_scheduled() {
        let result = check_trid(
            Some(utc(2026, 2, 22)),
            utc(2026, 2, 20),
            None,
            Some(utc(2026, 3, 15)),
        );
        assert_eq!(result.status, ComplianceStatus::Warning);
    }

    #[test]
    fn trid_pass_no_closing_date() {
        let result = check_trid(Some(utc(2026, 2, 22)), utc(2026, 2, 20), None, None);
        assert_eq!(result.status, ComplianceStatus::Pass);
    }

    #[test]
    fn trid_le_boundary_exactly_three_days_passes() {
        // Mon -> Thu = exactly 3 business days
        let result = check_trid(Some(utc(2026, 3, 5)), utc(2026, 3, 2), None, None);
        assert_eq!(result.status, ComplianceStatus::Pass);
    }

    #[test]
    fn trid_cd_boundary_exactly_three_days_passes() {
        // CD Mon -> closing Thu = 3 business days
        let result = check_trid(
            Some(utc(2026, 2, 22)),
            utc(2026, 2, 20),
            Some(utc(2026, 3, 2)),
            Some(utc(2026, 3, 5)),
        );
        assert_eq!(result.status, ComplianceStatus::Pass);
    }

    // -- Combined runner -------------------------------------------------

    fn passing_trid() -> ComplianceCheck {
        check_trid(Some(utc(2026, 2, 22)), utc(2026, 2, 20), None, None)
    }

    #[test]
    fn run_all_overall_pass() {
        let combined = run_all_checks(
            check_ecoa(false),
            check_atr_qm(Some(dec!(0.35)), true, true, true),
            passing_trid(),
        );
        assert_eq!(combined.overall_status, ComplianceStatus::Pass);
        assert!(combined.can_proceed);
        assert_eq!(combined.checks.len(), 3);
    }

    #[test]
    fn run_all_overall_fail_blocks() {
        let combined = run_all_checks(
            check_ecoa(false),
            check_atr_qm(Some(dec!(0.55)), true, true, true),
            passing_trid(),
        );
        assert_eq!(combined.overall_status, ComplianceStatus::Fail);
        assert!(!combined.can_proceed);
    }

    #[test]
    fn run_all_overall_warning_can_proceed() {
        let combined = run_all_checks(
            check_ecoa(true),
            check_atr_qm(Some(dec!(0.35)), true, true, true),
            passing_trid(),
        );
        assert_eq!(combined.overall_status, ComplianceStatus::Warning);
        assert!(combined.can_proceed);
    }

    #[test]
    fn run_all_overall_conditional_pass() {
        let combined = run_all_checks(
            check_ecoa(false),
            check_atr_qm(Some(dec!(0.46)), true, true, true),
            passing_trid(),
        );
        assert_eq!(combined.overall_status, ComplianceStatus::ConditionalPass);
        assert!(combined.can_proceed);
    }

    // -- Business days ---------------------------------------------------

    #[test]
    fn business_days_weekday_span() {
        // Mon -> Wed
        assert_eq!(business_days_between(utc(2026, 3, 2), utc(2026, 3, 4)), 2);
        // Mon -> Thu
        assert_eq!(business_days_between(utc(2026, 3, 2), utc(2026, 3, 5)), 3);
    }

    #[test]
    fn business_days_skip_weekends() {
        // Fri -> Mon = 1 business day
        assert_eq!(business_days_between(utc(2026, 3, 6), utc(2026, 3, 9)), 1);
        // Mon -> next Mon = 5
        assert_eq!(business_days_between(utc(2026, 3, 2), utc(2026, 3, 9)), 5);
    }

    #[test]
    fn business_days_empty_or_inverted_is_zero() {
        assert_eq!(business_days_between(utc(2026, 3, 2), utc(2026, 3, 2)), 0);
        assert_eq!(business_days_between(utc(2026, 3, 9), utc(2026, 3, 2)), 0);
    }

    #[test]
    fn business_days_triangle_inequality() {
        let a = utc(2026, 3, 2);
        let b = utc(2026, 3, 11);
        let c = utc(2026, 3, 20);
        assert!(
            business_days_between(a, b) + business_days_between(b, c)
                >= business_days_between(a, c)
        );
    }
}
