//! Risk-factor computation for underwriting.
//!
//! Pure over its inputs; the handler gathers application, financials and
//! borrower employment data and this module rates each factor Low /
//! Medium / High with notes the underwriter can act on.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shared::models::enums::EmploymentStatus;

use crate::models::{Application, ApplicationFinancials};

pub const RISK_LOW: &str = "Low";
pub const RISK_MEDIUM: &str = "Medium";
pub const RISK_HIGH: &str = "High";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub value: Option<f64>,
    pub rating: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditFactor {
    pub value: Option<i32>,
    pub rating: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityFactor {
    pub value: Option<String>,
    pub rating: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub dti: RiskFactor,
    pub ltv: RiskFactor,
    pub credit: CreditFactor,
    pub income_stability: StabilityFactor,
    pub asset_sufficiency: RiskFactor,
    pub compensating_factors: Vec<String>,
    pub warnings: Vec<String>,
}

fn pct(value: Decimal) -> f64 {
    value.round_dp(1).to_f64().unwrap_or(0.0)
}

fn stability_rating(status: EmploymentStatus) -> &'static str {
    match status {
        EmploymentStatus::W2Employee | EmploymentStatus::Retired => RISK_LOW,
        EmploymentStatus::SelfEmployed | EmploymentStatus::Other => RISK_MEDIUM,
        EmploymentStatus::Unemployed => RISK_HIGH,
    }
}

fn rating_order(rating: &str) -> u8 {
    match rating {
        RISK_LOW => 0,
        RISK_MEDIUM => 1,
        _ => 2,
    }
}

/// Computes all risk factors for a file.
///
/// `borrower_employment` carries (is_primary, employment_status) per
/// borrower on the application.
pub fn compute_risk_factors(
    app: &Application,
    financials: &[ApplicationFinancials],
    borrower_employment: &[(bool, Option<EmploymentStatus>)],
) -> RiskAssessment {
    let mut warnings = Vec::new();

    // DTI
    let total_income: Decimal = financials
        .iter()
        .filter_map(|f| f.gross_monthly_income)
        .sum();
    let total_debts: Decimal = financials.iter().filter_map(|f| f.monthly_debts).sum();
    let dti = if total_income > Decimal::ZERO {
        let dti_pct = total_debts / total_income * Decimal::from(100);
        let rating = if dti_pct < Decimal::from(36) {
            RISK_LOW
        } else if dti_pct <= Decimal::from(43) {
            RISK_MEDIUM
        } else {
            RISK_HIGH
        };
        RiskFactor {
            value: Some(pct(dti_pct)),
            rating: Some(rating.to_string()),
        }
    } else {
        warnings.push("Missing income data: DTI cannot be computed".to_string());
        RiskFactor {
            value: None,
            rating: None,
        }
    };

    // LTV
    let loan_amount = app.loan_amount.unwrap_or(Decimal::ZERO);
    let property_value = app.property_value.unwrap_or(Decimal::ZERO);
    let ltv = if property_value > Decimal::ZERO && loan_amount > Decimal::ZERO {
        let ltv_pct = loan_amount / property_value * Decimal::from(100);
        let rating = if ltv_pct < Decimal::from(60) {
            RISK_LOW
        } else if ltv_pct <= Decimal::from(80) {
            RISK_MEDIUM
        } else {
            RISK_HIGH
        };
        RiskFactor {
            value: Some(pct(ltv_pct)),
            rating: Some(rating.to_string()),
        }
    } else {
        warnings.push("Missing loan amount or property value: LTV cannot be computed".to_string());
        RiskFactor {
            value: None,
            rating: None,
        }
    };

    // Credit: the weakest score on the file drives the rating.
    let scores: Vec<i32> = financials.iter().filter_map(|f| f.credit_score).collect();
    let credit = match scores.iter().min() {
        Some(&min_score) => {
            let rating = if min_score > 680 {
                RISK_LOW
            } else if min_score >= 620 {
                RISK_MEDIUM
            } else {
                RISK_HIGH
            };
            CreditFactor {
                value: Some(min_score),
                rating: Some(rating.to_string()),
            }
        }
        None => {
            warnings.push("No credit score on file".to_string());
            CreditFactor {
                value: None,
                rating: None,
            }
        }
    };

    // Income stability: the worst employment status wins.
    let statuses: Vec<EmploymentStatus> = borrower_employment
        .iter()
        .filter_map(|(_, status)| *status)
        .collect();
    let income_stability = if statuses.is_empty() {
        warnings.push("No employment status on file".to_string());
        StabilityFactor {
            value: None,
            rating: None,
        }
    } else {
        let worst = statuses
            .iter()
            .map(|s| stability_rating(*s))
            .max_by_key(|r| rating_order(r))
            .unwrap_or(RISK_MEDIUM);
        StabilityFactor {
            value: Some(
                statuses
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            rating: Some(worst.to_string()),
        }
    };

    // Asset sufficiency relative to loan amount.
    let total_assets: Decimal = financials.iter().filter_map(|f| f.total_assets).sum();
    let asset_sufficiency = if loan_amount > Decimal::ZERO && total_assets > Decimal::ZERO {
        let asset_ratio = total_assets / loan_amount * Decimal::from(100);
        let rating = if asset_ratio > Decimal::from(20) {
            RISK_LOW
        } else if asset_ratio >= Decimal::from(10) {
            RISK_MEDIUM
        } else {
            RISK_HIGH
        };
        RiskFactor {
            value: Some(pct(asset_ratio)),
            rating: Some(rating.to_string()),
        }
    } else {
        if total_assets == Decimal::ZERO {
            warnings.push("No asset data on file".to_string());
        }
        RiskFactor {
            value: None,
            rating: None,
        }
    };

    // Compensating factors.
    let mut compensating_factors = Vec::new();
    if let Some(score) = credit.value {
        if score > 740 && dti.rating.as_deref() == Some(RISK_HIGH) {
            compensating_factors.push("Strong credit (>740) offsets elevated DTI".to_string());
        }
    }
    if let Some(ltv_value) = ltv.value {
        if ltv_value < 60.0 && credit.rating.as_deref() == Some(RISK_HIGH) {
            compensating_factors.push("Low LTV (<60%) offsets weak credit".to_string());
        }
    }
    if let Some(asset_value) = asset_sufficiency.value {
        if asset_value > 50.0 {
            compensating_factors.push("High reserves (>50% of loan amount)".to_string());
        }
    }

    RiskAssessment {
        dti,
        ltv,
        credit,
        income_stability,
        asset_sufficiency,
        compensating_factors,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use shared::models::enums::{ApplicationStage, LoanType};

    fn app(loan_amount: Option<Decimal>, property_value: Option<Decimal>) -> Application {
        Application {
            id: 1,
            stage: ApplicationStage::Underwriting,
            loan_type: Some(LoanType::Conventional30),
            property_address: Some("100 Test St".to_string()),
            loan_amount,
            property_value,
            assigned_to: None,
            le_delivery_date: None,
            cd_delivery_date: None,
            closing_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn financials(
        income: Option<Decimal>,
        debts: Option<Decimal>,
        assets: Option<Decimal>,
        score: Option<i32>,
    ) -> ApplicationFinancials {
        ApplicationFinancials {
            id: 1,
            application_id: 1,
            borrower_id: Some(1),
            gross_monthly_income: income,
            monthly_debts: debts,
            total_assets: assets,
            credit_score: score,
            dti_ratio: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn dti_rating_boundaries() {
        // 30% -> Low
        let rows = vec![financials(Some(dec!(10000)), Some(dec!(3000)), None, None)];
        let assessment = compute_risk_factors(&app(None, None), &rows, &[]);
        assert_eq!(assessment.dti.rating.as_deref(), Some(RISK_LOW));
        assert_eq!(assessment.dti.value, Some(30.0));

        // 40% -> Medium
        let rows = vec![financials(Some(dec!(10000)), Some(dec!(4000)), None, None)];
        let assessment = compute_risk_factors(&app(None, None), &rows, &[]);
        assert_eq!(assessment.dti.rating.as_deref(), Some(RISK_MEDIUM));

        // 45% -> High
        let rows = vec![financials(Some(dec!(10000)), Some(dec!(4500)), None, None)];
        let assessment = compute_risk_factors(&app(None, None), &rows, &[]);
        assert_eq!(assessment.dti.rating.as_deref(), Some(RISK_HIGH));
    }

    #[test]
    fn ltv_rating_boundaries() {
        let rows = vec![financials(None, None, None, None)];
        // 50% -> Low
        let assessment =
            compute_risk_factors(&app(Some(dec!(200000)), Some(dec!(400000))), &rows, &[]);
        assert_eq!(assessment.ltv.rating.as_deref(), Some(RISK_LOW));
        // 75% -> Medium
        let assessment =
            compute_risk_factors(&app(Some(dec!(300000)), Some(dec!(400000))), &rows, &[]);
        assert_eq!(assessment.ltv.rating.as_deref(), Some(RISK_MEDIUM));
        // 90% -> High
        let assessment =
            compute_risk_factors(&app(Some(dec!(360000)), Some(dec!(400000))), &rows, &[]);
        assert_eq!(assessment.ltv.rating.as_deref(), Some(RISK_HIGH));
    }

    #[test]
    fn credit_uses_minimum_score() {
        let rows = vec![
            financials(None, None, None, Some(780)),
            financials(None, None, None, Some(610)),
        ];
        let assessment = compute_risk_factors(&app(None, None), &rows, &[]);
        assert_eq!(assessment.credit.value, Some(610));
        assert_eq!(assessment.credit.rating.as_deref(), Some(RISK_HIGH));
    }

    #[test]
    fn credit_boundaries() {
        let assessment = compute_risk_factors(
            &app(None, None),
            &[financials(None, None, None, Some(681))],
            &[],
        );
        assert_eq!(assessment.credit.rating.as_deref(), Some(RISK_LOW));
        let assessment = compute_risk_factors(
            &app(None, None),
            &[financials(None, None, None, Some(620))],
            &[],
        );
        assert_eq!(assessment.credit.rating.as_deref(), Some(RISK_MEDIUM));
        let assessment = compute_risk_factors(
            &app(None, None),
            &[financials(None, None, None, Some(619))],
            &[],
        );
        assert_eq!(assessment.credit.rating.as_deref(), Some(RISK_HIGH));
    }

    #[test]
    fn worst_employment_status_drives_stability() {
        let assessment = compute_risk_factors(
            &app(None, None),
            &[],
            &[
                (true, Some(EmploymentStatus::W2Employee)),
                (false, Some(EmploymentStatus::Unemployed)),
            ],
        );
        assert_eq!(
            assessment.income_stability.rating.as_deref(),
            Some(RISK_HIGH)
        );
    }

    #[test]
    fn missing_inputs_produce_warnings() {
        let assessment = compute_risk_factors(&app(None, None), &[], &[]);
        assert!(assessment.dti.value.is_none());
        assert!(assessment
            .warnings
            .iter()
            .any(|w| w.contains("DTI cannot be computed")));
        assert!(assessment.warnings.iter().any(|w| w.contains("LTV")));
        assert!(assessment
            .warnings
            .iter()
            .any(|w| w.contains("credit score")));
    }

    #[test]
    fn strong_credit_offsets_high_dti() {
        let rows = vec![financials(
            Some(dec!(10000)),
            Some(dec!(5000)),
            None,
            Some(760),
        )];
        let assessment = compute_risk_factors(&app(None, None), &rows, &[]);
        assert!(assessment
            .compensating_factors
            .iter()
            .any(|f| f.contains("Strong credit")));
    }

    #[test]
    fn high_reserves_are_compensating() {
        let rows = vec![financials(None, None, Some(dec!(200000)), None)];
        let assessment =
            compute_risk_factors(&app(Some(dec!(300000)), Some(dec!(400000))), &rows, &[]);
        assert!(assessment
            .compensating_factors
            .iter()
            .any(|f| f.contains("High reserves")));
    }
}
