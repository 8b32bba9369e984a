//! Per-field intake validators.
//!
//! Each validator normalizes loose user input ("$6,250", "06/15/1990",
//! "w2") into the stored representation, or returns a message suitable
//! for the per-field error map. Enum validators accept a short alias list
//! and fall back to a fuzzy "did you mean" suggestion in the error
//! message.

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::models::enums::{EmploymentStatus, LoanType};

/// Monthly income above this is assumed to be a typo.
const MAX_MONTHLY_INCOME: &str = "1000000";
/// Loan and property values above this are rejected outright.
const MAX_LOAN_AMOUNT: &str = "100000000";

type FieldResult = Result<String, String>;

pub fn validate_ssn(input: &str) -> FieldResult {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 9 {
        return Err("SSN must be 9 digits".to_string());
    }
    let area = &digits[0..3];
    let group = &digits[3..5];
    let serial = &digits[5..9];
    if area == "000" || area == "666" || area.starts_with('9') {
        return Err("SSN area number is not valid".to_string());
    }
    if group == "00" || serial == "0000" {
        return Err("SSN is not valid".to_string());
    }
    if digits == "123456789" {
        return Err("SSN is not valid".to_string());
    }
    Ok(format!("{}-{}-{}", area, group, serial))
}

pub fn validate_dob(input: &str) -> FieldResult {
    let trimmed = input.trim();
    let parsed = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%m/%d/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%m-%d-%Y"))
        .map_err(|_| "date of birth must be YYYY-MM-DD or MM/DD/YYYY".to_string())?;

    let today = Utc::now().date_naive();
    let mut age = today.year() - parsed.year();
    if (today.month(), today.day()) < (parsed.month(), parsed.day()) {
        age -= 1;
    }
    if age < 18 {
        return Err("applicant must be at least 18 years old".to_string());
    }
    if age > 125 {
        return Err("date of birth is implausibly old".to_string());
    }
    Ok(parsed.format("%Y-%m-%d").to_string())
}

pub fn validate_email(input: &str) -> FieldResult {
    let normalized = input.trim().to_lowercase();
    let Some((local, domain)) = normalized.split_once('@') else {
        return Err("email address must contain '@'".to_string());
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err("email address is not valid".to_string());
    }
    Ok(normalized)
}

fn parse_money(input: &str) -> Result<Decimal, String> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    Decimal::from_str(&cleaned).map_err(|_| "must be a number".to_string())
}

pub fn validate_income(input: &str) -> FieldResult {
    let amount = parse_money(input)?;
    if amount < Decimal::ZERO {
        return Err("income cannot be negative".to_string());
    }
    if amount > Decimal::from_str(MAX_MONTHLY_INCOME).unwrap_or_default() {
        return Err("monthly income looks unusually high; please re-enter".to_string());
    }
    Ok(format!("{:.2}", amount))
}

pub fn validate_monthly_debts(input: &str) -> FieldResult {
    let amount = parse_money(input)?;
    if amount < Decimal::ZERO {
        return Err("monthly debts cannot be negative".to_string());
    }
    if amount > Decimal::from_str(MAX_MONTHLY_INCOME).unwrap_or_default() {
        return Err("monthly debts look unusually high; please re-enter".to_string());
    }
    Ok(format!("{:.2}", amount))
}

pub fn validate_total_assets(input: &str) -> FieldResult {
    let amount = parse_money(input)?;
    if amount < Decimal::ZERO {
        return Err("assets cannot be negative".to_string());
    }
    Ok(format!("{:.2}", amount))
}

pub fn validate_loan_amount(input: &str) -> FieldResult {
    let amount = parse_money(input)?;
    if amount <= Decimal::ZERO {
        return Err("loan amount must be positive".to_string());
    }
    if amount > Decimal::from_str(MAX_LOAN_AMOUNT).unwrap_or_default() {
        return Err("loan amount exceeds the maximum we originate".to_string());
    }
    Ok(format!("{:.2}", amount))
}

pub fn validate_property_value(input: &str) -> FieldResult {
    let amount = parse_money(input)?;
    if amount <= Decimal::ZERO {
        return Err("property value must be positive".to_string());
    }
    if amount > Decimal::from_str(MAX_LOAN_AMOUNT).unwrap_or_default() {
        return Err("property value exceeds the supported range".to_string());
    }
    Ok(format!("{:.2}", amount))
}

pub fn validate_credit_score(input: &str) -> FieldResult {
    let score: i32 = input
        .trim()
        .parse()
        .map_err(|_| "credit score must be a number".to_string())?;
    if !(300..=850).contains(&score) {
        return Err("credit score must be between 300 and 850".to_string());
    }
    Ok(score.to_string())
}

fn suggest(input: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .map(|c| (*c, strsim::jaro_winkler(&input.to_lowercase(), c)))
        .filter(|(_, score)| *score > 0.85)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c.to_string())
}

pub fn validate_loan_type(input: &str) -> FieldResult {
    let normalized = input.trim().to_lowercase().replace([' ', '-'], "_");
    if let Some(lt) = LoanType::parse(&normalized) {
        return Ok(lt.as_str().to_string());
    }
    // Common intake shorthand.
    let alias = match normalized.as_str() {
        "conventional" | "conv" | "30_year" | "30_year_fixed" => Some(LoanType::Conventional30),
        "15_year" | "15_year_fixed" => Some(LoanType::Conventional15),
        _ => None,
    };
    if let Some(lt) = alias {
        return Ok(lt.as_str().to_string());
    }
    let candidates: Vec<&str> = LoanType::all().iter().map(|l| l.as_str()).collect();
    match suggest(&normalized, &candidates) {
        Some(s) => Err(format!("unknown loan type; did you mean '{}'?", s)),
        None => Err("unknown loan type".to_string()),
    }
}

pub fn validate_employment_status(input: &str) -> FieldResult {
    let normalized = input.trim().to_lowercase().replace([' ', '-'], "_");
    if let Some(es) = EmploymentStatus::parse(&normalized) {
        return Ok(es.as_str().to_string());
    }
    let alias = match normalized.as_str() {
        "w2" | "w_2" | "employee" | "employed" => Some(EmploymentStatus::W2Employee),
        "1099" | "contractor" | "freelance" | "self_employed_1099" => {
            Some(EmploymentStatus::SelfEmployed)
        }
        _ => None,
    };
    if let Some(es) = alias {
        return Ok(es.as_str().to_string());
    }
    let candidates: Vec<&str> = EmploymentStatus::all().iter().map(|e| e.as_str()).collect();
    match suggest(&normalized, &candidates) {
        Some(s) => Err(format!("unknown employment status; did you mean '{}'?", s)),
        None => Err("unknown employment status".to_string()),
    }
}

/// Dispatch by field name; unknown fields are rejected so a typo in a
/// sparse PATCH body cannot silently vanish.
pub fn validate_field(field: &str, value: &str) -> FieldResult {
    match field {
        "ssn" => validate_ssn(value),
        "dob" => validate_dob(value),
        "email" => validate_email(value),
        "gross_monthly_income" => validate_income(value),
        "monthly_debts" => validate_monthly_debts(value),
        "total_assets" => validate_total_assets(value),
        "loan_amount" => validate_loan_amount(value),
        "property_value" => validate_property_value(value),
        "credit_score" => validate_credit_score(value),
        "loan_type" => validate_loan_type(value),
        "employment_status" => validate_employment_status(value),
        "property_address" => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err("property address cannot be empty".to_string())
            } else {
                Ok(trimmed.to_string())
            }
        }
        "first_name" | "last_name" => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err("name cannot be empty".to_string())
            } else {
                Ok(trimmed.to_string())
            }
        }
        _ => Err(format!("unknown field '{}'", field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssn_accepts_dashes_and_digits() {
        assert_eq!(validate_ssn("078-05-1120").unwrap(), "078-05-1120");
        assert_eq!(validate_ssn("078051120").unwrap(), "078-05-1120");
    }

    #[test]
    fn ssn_rejects_short_input() {
        let err = validate_ssn("12345").unwrap_err();
        assert!(err.contains("9 digits"));
    }

    #[test]
    fn ssn_rejects_reserved_series() {
        assert!(validate_ssn("000000000").is_err());
        assert!(validate_ssn("123456789").is_err());
        assert!(validate_ssn("666121234").is_err());
        assert!(validate_ssn("912341234").is_err());
    }

    #[test]
    fn dob_accepts_both_formats() {
        assert_eq!(validate_dob("1990-06-15").unwrap(), "1990-06-15");
        assert_eq!(validate_dob("06/15/1990").unwrap(), "1990-06-15");
    }

    #[test]
    fn dob_rejects_minors_and_garbage() {
        let err = validate_dob("2020-01-01").unwrap_err();
        assert!(err.contains("18"));
        assert!(validate_dob("not-a-date").is_err());
    }

    #[test]
    fn email_normalizes_case() {
        assert_eq!(validate_email("TEST@Example.COM").unwrap(), "test@example.com");
        assert!(validate_email("not-an-email").is_err());
    }

    #[test]
    fn income_strips_currency_formatting() {
        assert_eq!(validate_income("6250").unwrap(), "6250.00");
        assert_eq!(validate_income("$6,250").unwrap(), "6250.00");
    }

    #[test]
    fn income_rejects_negative_and_absurd() {
        assert!(validate_income("-1000").is_err());
        let err = validate_income("5000000").unwrap_err();
        assert!(err.contains("unusually high"));
    }

    #[test]
    fn loan_amount_bounds() {
        assert_eq!(validate_loan_amount("350000").unwrap(), "350000.00");
        assert!(validate_loan_amount("0").is_err());
        assert!(validate_loan_amount("200000000").is_err());
    }

    #[test]
    fn property_value_accepts_formatted_input() {
        assert_eq!(validate_property_value("$450,000").unwrap(), "450000.00");
        assert!(validate_property_value("-100").is_err());
    }

    #[test]
    fn credit_score_range() {
        assert_eq!(validate_credit_score("750").unwrap(), "750");
        assert!(validate_credit_score("200").is_err());
        assert!(validate_credit_score("900").is_err());
        assert!(validate_credit_score("excellent").is_err());
    }

    #[test]
    fn loan_type_exact_and_aliases() {
        assert_eq!(validate_loan_type("fha").unwrap(), "fha");
        assert_eq!(validate_loan_type("conventional").unwrap(), "conventional_30");
        assert_eq!(validate_loan_type("30 year fixed").unwrap(), "conventional_30");
    }

    #[test]
    fn loan_type_suggests_close_matches() {
        let err = validate_loan_type("jumob").unwrap_err();
        assert!(err.contains("jumbo"), "got: {}", err);
    }

    #[test]
    fn employment_aliases() {
        assert_eq!(validate_employment_status("w2").unwrap(), "w2_employee");
        assert_eq!(validate_employment_status("1099").unwrap(), "self_employed");
        assert_eq!(validate_employment_status("retired").unwrap(), "retired");
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(validate_field("favorite_color", "blue").is_err());
    }
}
