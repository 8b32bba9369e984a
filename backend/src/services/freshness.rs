//! Document freshness rules.
//!
//! Some document types carry a date field that must fall inside a recency
//! window (a pay stub older than a month says little about current
//! income). Stale or future-dated documents get a quality flag that
//! surfaces in the completeness report; an unparseable date yields no
//! flag, since absence of evidence is not staleness.

use chrono::NaiveDate;
use log::warn;

use shared::models::enums::DocumentType;

/// doc_type -> (date field to check, max age in days). Only types with
/// time-sensitive date fields are listed.
fn threshold(doc_type: DocumentType) -> Option<(&'static str, i64)> {
    match doc_type {
        DocumentType::PayStub => Some(("pay_period_end", 30)),
        DocumentType::BankStatement => Some(("statement_period_end", 60)),
        _ => None,
    }
}

const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",  // 2026-01-15
    "%m/%d/%Y",  // 01/15/2026
    "%m-%d-%Y",  // 01-15-2026
    "%Y/%m/%d",  // 2026/01/15
    "%d/%m/%Y",  // 15/01/2026
    "%B %d, %Y", // January 15, 2026
    "%b %d, %Y", // Jan 15, 2026
];

/// Tolerant date parser over the formats extraction actually produces.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Checks one document's extracted fields against its freshness window.
///
/// Returns `"future_date"` when the date lies after `reference_date`,
/// `"wrong_period"` when it is older than the window, and `None` when
/// fresh, not covered, or undeterminable.
pub fn check_freshness(
    doc_type: DocumentType,
    extractions: &[(String, Option<String>)],
    reference_date: NaiveDate,
) -> Option<&'static str> {
    let (field_name, max_days) = threshold(doc_type)?;

    let date_value = extractions
        .iter()
        .find(|(name, _)| name.to_lowercase() == field_name)
        .and_then(|(_, value)| value.as_deref())?;

    let Some(parsed) = parse_date(date_value) else {
        warn!(
            "Could not parse date '{}' from field '{}' on {}",
            date_value, field_name, doc_type
        );
        return None;
    };

    if parsed > reference_date {
        return Some("future_date");
    }
    if (reference_date - parsed).num_days() > max_days {
        return Some("wrong_period");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(name: &str, value: &str) -> (String, Option<String>) {
        (name.to_string(), Some(value.to_string()))
    }

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    }

    #[test]
    fn fresh_pay_stub_gets_no_flag() {
        let extractions = vec![ext("pay_period_end", "2026-03-01")];
        assert_eq!(
            check_freshness(DocumentType::PayStub, &extractions, reference()),
            None
        );
    }

    #[test]
    fn stale_pay_stub_is_wrong_period() {
        let extractions = vec![ext("pay_period_end", "2026-01-01")];
        assert_eq!(
            check_freshness(DocumentType::PayStub, &extractions, reference()),
            Some("wrong_period")
        );
    }

    #[test]
    fn future_date_is_flagged() {
        let extractions = vec![ext("pay_period_end", "2026-04-01")];
        assert_eq!(
            check_freshness(DocumentType::PayStub, &extractions, reference()),
            Some("future_date")
        );
    }

    #[test]
    fn bank_statement_window_is_sixty_days() {
        let fresh = vec![ext("statement_period_end", "2026-02-01")];
        assert_eq!(
            check_freshness(DocumentType::BankStatement, &fresh, reference()),
            None
        );
        let stale = vec![ext("statement_period_end", "2026-01-01")];
        assert_eq!(
            check_freshness(DocumentType::BankStatement, &stale, reference()),
            Some("wrong_period")
        );
    }

    #[test]
    fn uncovered_doc_type_is_skipped() {
        let extractions = vec![ext("pay_period_end", "2020-01-01")];
        assert_eq!(
            check_freshness(DocumentType::Id, &extractions, reference()),
            None
        );
    }

    #[test]
    fn unparseable_date_is_not_an_error() {
        let extractions = vec![ext("pay_period_end", "sometime last month")];
        assert_eq!(
            check_freshness(DocumentType::PayStub, &extractions, reference()),
            None
        );
    }

    #[test]
    fn missing_field_yields_no_flag() {
        let extractions = vec![ext("gross_pay", "5000")];
        assert_eq!(
            check_freshness(DocumentType::PayStub, &extractions, reference()),
            None
        );
    }

    #[test]
    fn parser_accepts_seven_formats() {
        for input in [
            "2026-01-15",
            "01/15/2026",
            "01-15-2026",
            "2026/01/15",
            "15/01/2026",
            "January 15, 2026",
            "Jan 15, 2026",
        ] {
            assert!(parse_date(input).is_some(), "failed on {}", input);
        }
        assert!(parse_date("the ides of march").is_none());
    }
}
