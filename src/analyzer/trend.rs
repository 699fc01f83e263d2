use std::collections::HashMap;

use crate::config::MOVER_CANDIDATE_POOL;
use crate::types::{ProductSnapshot, TrendResult};

/// Composite trend score. Three bounded contributions, summed and rounded to
/// two decimals:
/// - rank movement: `rank_change / 2`, capped at 50 points (100% → max).
///   The raw value is used as-is — a negative rank change (rank falling)
///   subtracts from the total.
/// - review volume: `log10(reviews) * 10`, capped at 30 points. Rewards
///   order-of-magnitude volume with diminishing returns.
/// - rating: `(rating - 4.0) * 20` for ratings of 4.0 and up. A 4.5 earns
///   10 points, a perfect 5.0 earns 20. Below 4.0 contributes nothing.
///
/// Absent inputs contribute zero. Range is [0, 100] for non-negative inputs.
pub fn trend_score(
    rank_change_percent: Option<f64>,
    review_count: Option<u64>,
    rating: Option<f64>,
) -> f64 {
    let mut score = 0.0;

    let rank_change = rank_change_percent.unwrap_or(0.0);
    score += (rank_change / 2.0).min(50.0);

    let review_count = review_count.unwrap_or(0);
    if review_count > 0 {
        score += ((review_count as f64).log10() * 10.0).min(30.0);
    }

    let rating = rating.unwrap_or(0.0);
    if rating >= 4.0 {
        score += (rating - 4.0) * 20.0;
    }

    (score * 100.0).round() / 100.0
}

/// Score a single snapshot row.
pub fn score(snapshot: &ProductSnapshot) -> f64 {
    trend_score(
        snapshot.rank_change_percent,
        snapshot.review_count,
        snapshot.rating,
    )
}

/// Score every row and return the top `top_n` by descending score.
/// The sort is stable, so equal scores keep their input order.
pub fn rank_top(rows: &[ProductSnapshot], top_n: usize) -> Vec<TrendResult> {
    let mut results: Vec<TrendResult> = rows
        .iter()
        .map(|row| TrendResult::from_snapshot(row, score(row)))
        .collect();

    results.sort_by(|a, b| {
        b.trend_score
            .partial_cmp(&a.trend_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_n);
    results
}

/// Partition rows by exact category label, score and rank each partition,
/// and cap each at `per_category`. Categories appear in order of first
/// occurrence in the input.
pub fn top_by_category(
    rows: &[ProductSnapshot],
    per_category: usize,
) -> Vec<(String, Vec<TrendResult>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<ProductSnapshot>> = HashMap::new();

    for row in rows {
        if !groups.contains_key(&row.category) {
            order.push(row.category.clone());
        }
        groups.entry(row.category.clone()).or_default().push(row.clone());
    }

    order
        .into_iter()
        .map(|category| {
            let ranked = rank_top(&groups[&category], per_category);
            (category, ranked)
        })
        .collect()
}

/// Products whose rank moved at least `threshold_percent`, drawn from the
/// top `MOVER_CANDIDATE_POOL` ranked rows.
pub fn significant_movers(rows: &[ProductSnapshot], threshold_percent: f64) -> Vec<TrendResult> {
    rank_top(rows, MOVER_CANDIDATE_POOL)
        .into_iter()
        .filter(|t| t.rank_change_percent >= threshold_percent)
        .collect()
}
