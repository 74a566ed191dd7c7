//! Rate, delta, share, ranking and formatting helpers shared by the
//! breakdown and insight steps.

use dropscope_types::evidence::Evidence;
use dropscope_types::workflow::{BaseMetric, RankBy, RankOrder};

/// `numerator / denominator`, `None` when the denominator is zero.
pub fn rate(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator != 0).then(|| numerator as f64 / denominator as f64)
}

/// `((current - baseline) / baseline) * 100`, `None` when the baseline is zero.
pub fn pct_change(current: f64, baseline: f64) -> Option<f64> {
    (baseline != 0.0).then(|| (current - baseline) / baseline * 100.0)
}

/// Percentage change between two optional rates.
pub fn rate_change(current: Option<f64>, baseline: Option<f64>) -> Option<f64> {
    pct_change(current?, baseline?)
}

/// `part / total`, zero when the total is zero.
pub fn share(part: u64, total: u64) -> f64 {
    rate(part, total).unwrap_or(0.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

fn weighted(delta: Option<f64>, weight: f64) -> f64 {
    delta.map_or(f64::NEG_INFINITY, |d| d.abs() * weight)
}

/// Delta-based score keyed by the entry's own base metric.
///
/// Missing deltas score negative infinity so they sort last.
pub fn delta_score(entry: &Evidence) -> f64 {
    let deltas = &entry.deltas;
    match entry.base_metric {
        BaseMetric::Orders => weighted(deltas.orders_delta_pct, entry.baseline_order_share),
        BaseMetric::Sessions => weighted(deltas.sessions_delta_pct, 1.0),
        BaseMetric::AtcRate => weighted(deltas.atc_rate_delta_pct, entry.baseline_session_share),
        BaseMetric::Cvr => weighted(deltas.cvr_delta_pct, entry.baseline_session_share),
    }
}

pub fn score(entry: &Evidence, rank_by: RankBy) -> f64 {
    match rank_by {
        RankBy::BaselineCvr => weighted(entry.baseline.cvr, entry.baseline_session_share),
        RankBy::BaselineSessions => entry.baseline_session_share,
        RankBy::BaselineOrders => entry.baseline_order_share,
        RankBy::Delta => delta_score(entry),
    }
}

/// Stable sort by `score`, descending unless `order` is ascending.
pub fn rank(entries: &mut [Evidence], rank_by: RankBy, order: RankOrder) {
    entries.sort_by(|a, b| {
        let (sa, sb) = (score(a, rank_by), score(b, rank_by));
        match order {
            RankOrder::Desc => sb.total_cmp(&sa),
            RankOrder::Asc => sa.total_cmp(&sb),
        }
    });
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// `"-12.50%"`, or `"unknown"` for a missing or NaN value.
pub fn format_pct(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{v:.2}%"),
        _ => "unknown".to_string(),
    }
}

/// A 0..1 rate rendered as a percentage (`0.0625` -> `"6.25%"`).
pub fn format_rate_pct(rate: Option<f64>) -> String {
    format_pct(rate.map(|r| r * 100.0))
}

/// One line per entry: rank, label, baseline rate, then the session and/or
/// order movement that the ranking is about. `"none"` for an empty list.
pub fn format_ranked_list(entries: &[Evidence], rank_by: RankBy, base_metric: BaseMetric) -> String {
    if entries.is_empty() {
        return "none".to_string();
    }

    let orders_only = rank_by == RankBy::BaselineOrders || base_metric == BaseMetric::Orders;
    let sessions_only = rank_by == RankBy::BaselineSessions || base_metric == BaseMetric::Sessions;

    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let baseline_rate = if base_metric == BaseMetric::AtcRate {
                format!("baseline ATC rate {}", format_rate_pct(entry.baseline.atc_rate))
            } else {
                format!("baseline CVR {}", format_rate_pct(entry.baseline.cvr))
            };
            let sessions = format!(
                "sessions {} -> {} ({})",
                entry.baseline.sessions,
                entry.current.sessions,
                format_pct(entry.deltas.sessions_delta_pct)
            );
            let orders = format!(
                "orders {} -> {} ({})",
                entry.baseline.orders,
                entry.current.orders,
                format_pct(entry.deltas.orders_delta_pct)
            );

            let mut parts = vec![format!("{}. {}", idx + 1, entry.label()), baseline_rate];
            if orders_only {
                parts.push(orders);
            } else if sessions_only {
                parts.push(sessions);
            } else {
                parts.push(sessions);
                parts.push(orders);
            }
            parts.join(" | ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use dropscope_types::evidence::{SegmentDeltas, SegmentFigures};

    fn entry(value: &str, cvr_delta: Option<f64>, baseline_share: f64) -> Evidence {
        Evidence {
            dimension: "utm_source".to_string(),
            value: value.to_string(),
            display_value: value.to_string(),
            depth: 0,
            current: SegmentFigures {
                orders: 50,
                sessions: 800,
                atc_sessions: 100,
                cvr: Some(0.0625),
                atc_rate: Some(0.125),
            },
            baseline: SegmentFigures {
                orders: 100,
                sessions: 1000,
                atc_sessions: 200,
                cvr: Some(0.1),
                atc_rate: Some(0.2),
            },
            deltas: SegmentDeltas {
                cvr_delta_pct: cvr_delta,
                atc_rate_delta_pct: Some(-37.5),
                atc_sessions_delta_pct: Some(-50.0),
                orders_delta_pct: Some(-50.0),
                sessions_delta_pct: Some(-20.0),
            },
            session_share: baseline_share,
            order_share: baseline_share,
            baseline_session_share: baseline_share,
            baseline_order_share: baseline_share,
            base_metric: BaseMetric::Cvr,
        }
    }

    #[test]
    fn test_rates_and_changes() {
        assert_eq!(rate(50, 800), Some(0.0625));
        assert_eq!(rate(5, 0), None);
        assert_eq!(pct_change(50.0, 100.0), Some(-50.0));
        assert_eq!(pct_change(5.0, 0.0), None);
        assert_eq!(rate_change(Some(0.0625), Some(0.1)).map(round2), Some(-37.5));
        assert_eq!(rate_change(None, Some(0.1)), None);
        assert_eq!(share(1, 0), 0.0);
    }

    #[test]
    fn test_delta_score_per_base_metric() {
        let mut e = entry("google", Some(-37.5), 0.5);
        assert_eq!(delta_score(&e), 18.75);

        e.base_metric = BaseMetric::Sessions;
        // Unweighted
        assert_eq!(delta_score(&e), 20.0);

        e.base_metric = BaseMetric::Orders;
        assert_eq!(delta_score(&e), 25.0);

        e.base_metric = BaseMetric::Cvr;
        e.deltas.cvr_delta_pct = None;
        assert_eq!(delta_score(&e), f64::NEG_INFINITY);
    }

    #[test]
    fn test_rank_by_overrides() {
        let e = entry("google", Some(-10.0), 0.4);
        assert!((score(&e, RankBy::BaselineCvr) - 0.04).abs() < 1e-12);
        assert_eq!(score(&e, RankBy::BaselineSessions), 0.4);
        assert_eq!(score(&e, RankBy::BaselineOrders), 0.4);
    }

    #[test]
    fn test_rank_orders_and_missing_last() {
        let mut list = vec![
            entry("missing", None, 0.9),
            entry("small", Some(-5.0), 0.5),
            entry("big", Some(-40.0), 0.5),
        ];
        rank(&mut list, RankBy::Delta, RankOrder::Desc);
        let order: Vec<_> = list.iter().map(|e| e.value.as_str()).collect();
        assert_eq!(order, vec!["big", "small", "missing"]);

        rank(&mut list, RankBy::Delta, RankOrder::Asc);
        assert_eq!(list[0].value, "missing");
        assert_eq!(list[2].value, "big");
    }

    #[test]
    fn test_format_pct() {
        assert_eq!(format_pct(Some(-37.5)), "-37.50%");
        assert_eq!(format_pct(None), "unknown");
        assert_eq!(format_pct(Some(f64::NAN)), "unknown");
        assert_eq!(format_rate_pct(Some(0.0625)), "6.25%");
    }

    #[test]
    fn test_ranked_list_format() {
        assert_eq!(format_ranked_list(&[], RankBy::Delta, BaseMetric::Cvr), "none");

        let list = vec![entry("google", Some(-37.5), 0.5), entry("meta", Some(-5.0), 0.2)];
        let text = format_ranked_list(&list, RankBy::Delta, BaseMetric::Cvr);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "1. google | baseline CVR 10.00% | sessions 1000 -> 800 (-20.00%) | orders 100 -> 50 (-50.00%)"
        );

        let sessions_only = format_ranked_list(&list, RankBy::BaselineSessions, BaseMetric::Cvr);
        assert!(!sessions_only.contains("orders"));

        let orders_only = format_ranked_list(&list, RankBy::Delta, BaseMetric::Orders);
        assert!(!orders_only.contains("sessions"));

        let atc = format_ranked_list(&list, RankBy::Delta, BaseMetric::AtcRate);
        assert!(atc.starts_with("1. google | baseline ATC rate 20.00%"));
    }
}
