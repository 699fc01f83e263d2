use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ProductSnapshot
// ---------------------------------------------------------------------------

/// One observed row from a movers & shakers snapshot file. Immutable once
/// deserialized; optional fields default to None when the collector could not
/// extract them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Opaque product key (Amazon-style ASIN in the reference data).
    pub asin: String,
    pub name: String,
    pub category: String,
    pub current_rank: u32,
    /// Percentage rank movement since the previous observation.
    #[serde(default)]
    pub rank_change_percent: Option<f64>,
    /// Currency-agnostic price.
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u64>,
    /// Average star rating, nominally in [0, 5].
    #[serde(default)]
    pub rating: Option<f64>,
    pub affiliate_url: String,
}

// ---------------------------------------------------------------------------
// TrendResult
// ---------------------------------------------------------------------------

/// A scored snapshot. Built fresh on every scoring request, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct TrendResult {
    pub asin: String,
    pub name: String,
    pub category: String,
    pub current_rank: u32,
    /// Absent rank movement is reported as 0.0 here — consumers sort and
    /// filter on this field and expect a plain number.
    pub rank_change_percent: f64,
    pub price: Option<f64>,
    pub review_count: Option<u64>,
    pub rating: Option<f64>,
    pub affiliate_url: String,
    pub trend_score: f64,
}

impl TrendResult {
    pub fn from_snapshot(snapshot: &ProductSnapshot, trend_score: f64) -> Self {
        Self {
            asin: snapshot.asin.clone(),
            name: snapshot.name.clone(),
            category: snapshot.category.clone(),
            current_rank: snapshot.current_rank,
            rank_change_percent: snapshot.rank_change_percent.unwrap_or(0.0),
            price: snapshot.price,
            review_count: snapshot.review_count,
            rating: snapshot.rating,
            affiliate_url: snapshot.affiliate_url.clone(),
            trend_score,
        }
    }
}
