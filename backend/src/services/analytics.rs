//! Executive analytics derived from applications, decisions and the
//! audit trail.
//!
//! Stage counts come straight from the applications table; pull-through
//! and turn times are derived from `stage_transition` audit events, which
//! are totally ordered per application by the audit chain's commit order.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;

use crate::errors::ApiResult;

/// Mean duration between two named stage transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnTime {
    pub from_stage: String,
    pub to_stage: String,
    pub avg_days: f64,
    pub sample_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub time_range_days: i64,
    pub computed_at: DateTime<Utc>,
    pub stage_counts: HashMap<String, i64>,
    pub pull_through_rate: f64,
    pub turn_times: Vec<TurnTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPoint {
    pub period: String,
    pub total_decisions: i64,
    pub denials: i64,
    pub denial_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonCount {
    pub reason: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenialTrends {
    pub time_range_days: i64,
    pub computed_at: DateTime<Utc>,
    pub overall_denial_rate: f64,
    pub trend: Vec<TrendPoint>,
    pub top_reasons: Vec<ReasonCount>,
    /// Omitted (None) when a product filter is applied.
    pub by_product: Option<HashMap<String, f64>>,
}

fn rate_pct(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        (numerator as f64 / denominator as f64 * 1000.0).round() / 10.0
    }
}

/// Pipeline stage counts, pull-through and turn times over a window.
pub async fn pipeline_summary(pool: &PgPool, days: i64) -> ApiResult<PipelineSummary> {
    let since = Utc::now() - Duration::days(days);

    let rows = sqlx::query("SELECT stage, COUNT(*) AS count FROM applications GROUP BY stage")
        .fetch_all(pool)
        .await?;
    let mut stage_counts = HashMap::new();
    for row in &rows {
        let stage: String = row.get("stage");
        let count: i64 = row.get("count");
        stage_counts.insert(stage, count);
    }

    let initiated: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM applications WHERE created_at >= $1")
            .bind(since)
            .fetch_one(pool)
            .await?;
    let closed: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT application_id) FROM audit_events \
         WHERE event_type = 'stage_transition' \
           AND event_data->>'to_stage' = 'closed' \
           AND timestamp >= $1",
    )
    .bind(since)
    .fetch_one(pool)
    .await?;

    // Consecutive stage_transition events per application pair up into
    // turn-time samples.
    let rows = sqlx::query(
        "SELECT application_id, timestamp, \
                event_data->>'from_stage' AS from_stage, \
                event_data->>'to_stage' AS to_stage \
         FROM audit_events \
         WHERE event_type = 'stage_transition' \
           AND event_data->>'error' IS NULL \
           AND application_id IS NOT NULL \
           AND timestamp >= $1 \
         ORDER BY application_id, id",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut samples: HashMap<(String, String), (f64, i64)> = HashMap::new();
    let mut previous: Option<(i64, DateTime<Utc>, String)> = None;
    for row in &rows {
        let application_id: i64 = row.get("application_id");
        let timestamp: DateTime<Utc> = row.get("timestamp");
        let from_stage: Option<String> = row.get("from_stage");
        let to_stage: Option<String> = row.get("to_stage");
        let (Some(from_stage), Some(to_stage)) = (from_stage, to_stage) else {
            continue;
        };

        if let Some((prev_app, prev_ts, prev_to)) = &previous {
            if *prev_app == application_id && *prev_to == from_stage {
                let days = (timestamp - *prev_ts).num_seconds() as f64 / 86_400.0;
                let entry = samples
                    .entry((from_stage.clone(), to_stage.clone()))
                    .or_insert((0.0, 0));
                entry.0 += days;
                entry.1 += 1;
            }
        }
        previous = Some((application_id, timestamp, to_stage));
    }

    let mut turn_times: Vec<TurnTime> = samples
        .into_iter()
        .map(|((from_stage, to_stage), (total, count))| TurnTime {
            from_stage,
            to_stage,
            avg_days: (total / count as f64 * 10.0).round() / 10.0,
            sample_size: count,
        })
        .collect();
    turn_times.sort_by(|a, b| (a.from_stage.clone(), a.to_stage.clone()).cmp(&(b.from_stage.clone(), b.to_stage.clone())));

    Ok(PipelineSummary {
        time_range_days: days,
        computed_at: Utc::now(),
        stage_counts,
        pull_through_rate: rate_pct(closed, initiated),
        turn_times,
    })
}

/// Flattens per-decision reason lists and buckets rare reasons (count
/// below 3) into "Other". Sorted by count descending.
pub fn aggregate_reasons(reason_lists: &[Vec<String>]) -> Vec<ReasonCount> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for reasons in reason_lists {
        for reason in reasons {
            *counts.entry(reason.as_str()).or_insert(0) += 1;
        }
    }

    let mut top: Vec<ReasonCount> = Vec::new();
    let mut other = 0;
    for (reason, count) in counts {
        if count < 3 {
            other += count;
        } else {
            top.push(ReasonCount {
                reason: reason.to_string(),
                count,
            });
        }
    }
    top.sort_by(|a, b| b.count.cmp(&a.count).then(a.reason.cmp(&b.reason)));
    if other > 0 {
        top.push(ReasonCount {
            reason: "Other".to_string(),
            count: other,
        });
    }
    top
}

/// Denial rates over a window, with monthly trend, top reasons, and a
/// per-product breakdown unless a product filter narrows the query.
pub async fn denial_trends(
    pool: &PgPool,
    days: i64,
    product: Option<&str>,
) -> ApiResult<DenialTrends> {
    let since = Utc::now() - Duration::days(days);

    let product_clause = if product.is_some() {
        "AND a.loan_type = $2"
    } else {
        ""
    };
    let sql = format!(
        "SELECT d.decision_type, d.denial_reasons, a.loan_type, \
                to_char(d.created_at, 'YYYY-MM') AS period \
         FROM decisions d \
         INNER JOIN applications a ON d.application_id = a.id \
         WHERE d.created_at >= $1 {} \
         ORDER BY d.created_at",
        product_clause
    );
    let mut query = sqlx::query(&sql).bind(since);
    if let Some(product) = product {
        query = query.bind(product.to_string());
    }
    let rows = query.fetch_all(pool).await?;

    let mut total = 0i64;
    let mut denials = 0i64;
    let mut by_period: HashMap<String, (i64, i64)> = HashMap::new();
    let mut by_product_counts: HashMap<String, (i64, i64)> = HashMap::new();
    let mut reason_lists: Vec<Vec<String>> = Vec::new();

    for row in &rows {
        let decision_type: String = row.get("decision_type");
        let period: String = row.get("period");
        let loan_type: Option<String> = row.get("loan_type");
        let denied = decision_type == "denied";

        total += 1;
        let period_entry = by_period.entry(period).or_insert((0, 0));
        period_entry.0 += 1;
        if let Some(loan_type) = loan_type {
            let product_entry = by_product_counts.entry(loan_type).or_insert((0, 0));
            product_entry.0 += 1;
            if denied {
                product_entry.1 += 1;
            }
        }
        if denied {
            denials += 1;
            period_entry.1 += 1;
            let reasons: Option<serde_json::Value> = row.get("denial_reasons");
            let list = reasons
                .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
                .unwrap_or_default();
            reason_lists.push(list);
        }
    }

    let mut trend: Vec<TrendPoint> = by_period
        .into_iter()
        .map(|(period, (period_total, period_denials))| TrendPoint {
            period,
            total_decisions: period_total,
            denials: period_denials,
            denial_rate: rate_pct(period_denials, period_total),
        })
        .collect();
    trend.sort_by(|a, b| a.period.cmp(&b.period));

    let by_product = if product.is_some() {
        None
    } else {
        Some(
            by_product_counts
                .into_iter()
                .map(|(loan_type, (product_total, product_denials))| {
                    (loan_type, rate_pct(product_denials, product_total))
                })
                .collect(),
        )
    };

    Ok(DenialTrends {
        time_range_days: days,
        computed_at: Utc::now(),
        overall_denial_rate: rate_pct(denials, total),
        trend,
        top_reasons: aggregate_reasons(&reason_lists),
        by_product,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_decisions_is_zero_rate() {
        assert_eq!(rate_pct(0, 0), 0.0);
    }

    #[test]
    fn rates_round_to_one_decimal() {
        assert_eq!(rate_pct(8, 20), 40.0);
        assert_eq!(rate_pct(1, 6), 16.7);
        assert_eq!(rate_pct(2, 4), 50.0);
        assert_eq!(rate_pct(3, 15), 20.0);
    }

    #[test]
    fn rare_reasons_bucket_into_other() {
        let lists = vec![
            vec!["High DTI".to_string(), "Insufficient income".to_string()],
            vec!["High DTI".to_string()],
            vec!["High DTI".to_string()],
            vec!["Low credit score".to_string()],
            vec!["Insufficient income".to_string()],
        ];
        let reasons = aggregate_reasons(&lists);
        assert_eq!(reasons[0].reason, "High DTI");
        assert_eq!(reasons[0].count, 3);
        let other = reasons.iter().find(|r| r.reason == "Other").unwrap();
        // Two "Insufficient income" + one "Low credit score", all below 3.
        assert_eq!(other.count, 3);
        assert!(!reasons.iter().any(|r| r.reason == "Low credit score"));
    }

    #[test]
    fn no_other_bucket_when_everything_is_common() {
        let lists = vec![
            vec!["High DTI".to_string()],
            vec!["High DTI".to_string()],
            vec!["High DTI".to_string()],
        ];
        let reasons = aggregate_reasons(&lists);
        assert_eq!(reasons.len(), 1);
        assert_eq!(reasons[0].reason, "High DTI");
    }

    #[test]
    fn empty_input_yields_no_reasons() {
        assert!(aggregate_reasons(&[]).is_empty());
    }
}
