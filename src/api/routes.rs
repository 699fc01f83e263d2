use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzer;
use crate::api::latency::LatencyStats;
use crate::config::{
    CATEGORY_TOP_N, DEFAULT_TOP_N, EXPORT_TOP_N, SIGNIFICANT_THRESHOLD_DEFAULT,
};
use crate::middleware::{self, RateLimiter, RateLimiterStats};
use crate::state::SnapshotStore;
use crate::types::TrendResult;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<SnapshotStore>,
    pub limiter: Arc<RateLimiter>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    // Layers run outside-in from the bottom of this chain: the rate limiter
    // gates everything, security headers wrap whatever passed it, and the
    // request log (with latency sampling) sits closest to the handlers.
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/trends", get(get_trends))
        .route("/trends/categories", get(get_category_trends))
        .route("/trends/significant", get(get_significant_movers))
        .route("/products/:asin", get(get_product))
        .route("/export/csv", get(export_csv))
        .route("/export/json", get(export_json))
        .route("/stats/ratelimit", get(get_rate_limit_stats))
        .route("/stats/latency", get(get_latency_stats))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_log,
        ))
        .layer(axum_middleware::from_fn(middleware::security_headers))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct TrendsQuery {
    pub limit: Option<usize>,
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct CategoryTrendsQuery {
    pub per_category: Option<usize>,
}

#[derive(Deserialize)]
pub struct SignificantQuery {
    pub threshold: Option<f64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub products: usize,
    pub snapshot_loaded_at: Option<String>,
    pub active_ips: usize,
    pub blocked_ips: usize,
}

#[derive(Serialize)]
pub struct TrendsResponse {
    pub date: String,
    pub count: usize,
    pub trends: Vec<TrendResult>,
}

#[derive(Serialize)]
pub struct CategoryGroup {
    pub category: String,
    pub items: Vec<TrendResult>,
}

#[derive(Serialize)]
pub struct CategoryTrendsResponse {
    pub categories: Vec<CategoryGroup>,
}

#[derive(Serialize)]
pub struct SignificantResponse {
    pub threshold: f64,
    pub count: usize,
    pub items: Vec<TrendResult>,
}

#[derive(Serialize)]
pub struct ProductResponse {
    #[serde(flatten)]
    pub trend: TrendResult,
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub exported_at: String,
    pub count: usize,
    pub data: Vec<TrendResult>,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub samples: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let stats = state.limiter.stats();
    let loaded_ns = state.store.loaded_at_ns();
    let snapshot_loaded_at = (loaded_ns > 0)
        .then(|| {
            DateTime::<Utc>::from_timestamp(
                (loaded_ns / 1_000_000_000) as i64,
                (loaded_ns % 1_000_000_000) as u32,
            )
        })
        .flatten()
        .map(|dt| dt.to_rfc3339());

    Json(HealthResponse {
        status: "ok".to_string(),
        products: state.store.product_count(),
        snapshot_loaded_at,
        active_ips: stats.active_ips,
        blocked_ips: stats.blocked_ips,
    })
}

async fn get_trends(
    State(state): State<ApiState>,
    Query(params): Query<TrendsQuery>,
) -> Json<TrendsResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_TOP_N);
    let rows = state.store.rows();
    let mut trends = analyzer::rank_top(&rows, limit);

    if let Some(category) = &params.category {
        trends.retain(|t| &t.category == category);
    }

    Json(TrendsResponse {
        date: Utc::now().format("%Y-%m-%d").to_string(),
        count: trends.len(),
        trends,
    })
}

async fn get_category_trends(
    State(state): State<ApiState>,
    Query(params): Query<CategoryTrendsQuery>,
) -> Json<CategoryTrendsResponse> {
    let per_category = params.per_category.unwrap_or(CATEGORY_TOP_N);
    let rows = state.store.rows();

    let categories = analyzer::top_by_category(&rows, per_category)
        .into_iter()
        .map(|(category, items)| CategoryGroup { category, items })
        .collect();

    Json(CategoryTrendsResponse { categories })
}

async fn get_significant_movers(
    State(state): State<ApiState>,
    Query(params): Query<SignificantQuery>,
) -> Json<SignificantResponse> {
    let threshold = params.threshold.unwrap_or(SIGNIFICANT_THRESHOLD_DEFAULT);
    let rows = state.store.rows();
    let items = analyzer::significant_movers(&rows, threshold);

    Json(SignificantResponse {
        threshold,
        count: items.len(),
        items,
    })
}

async fn get_product(
    State(state): State<ApiState>,
    Path(asin): Path<String>,
) -> Result<Json<ProductResponse>, StatusCode> {
    let snapshot = state.store.get(&asin).ok_or(StatusCode::NOT_FOUND)?;
    let trend = TrendResult::from_snapshot(&snapshot, analyzer::score(&snapshot));
    Ok(Json(ProductResponse { trend }))
}

async fn export_csv(State(state): State<ApiState>) -> impl IntoResponse {
    let rows = state.store.rows();
    let trends = analyzer::rank_top(&rows, EXPORT_TOP_N);
    let body = crate::reporter::csv_export(&trends);

    let headers = [
        (header::CONTENT_TYPE, "text/csv".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=trends_{}.csv",
                Utc::now().format("%Y%m%d")
            ),
        ),
    ];
    (headers, body)
}

async fn export_json(State(state): State<ApiState>) -> Json<ExportResponse> {
    let rows = state.store.rows();
    let data = analyzer::rank_top(&rows, EXPORT_TOP_N);

    Json(ExportResponse {
        exported_at: Utc::now().to_rfc3339(),
        count: data.len(),
        data,
    })
}

async fn get_rate_limit_stats(State(state): State<ApiState>) -> Json<RateLimiterStats> {
    Json(state.limiter.stats())
}

async fn get_latency_stats(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50_ms, p95_ms, p99_ms) = state.latency.percentiles_ms();
    Json(LatencyResponse {
        p50_ms,
        p95_ms,
        p99_ms,
        samples: state.latency.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::RateLimitConfig;
    use crate::types::ProductSnapshot;

    fn snapshot(asin: &str, category: &str, rank_change: f64) -> ProductSnapshot {
        ProductSnapshot {
            asin: asin.to_string(),
            name: format!("Product {asin}"),
            category: category.to_string(),
            current_rank: 1,
            rank_change_percent: Some(rank_change),
            price: Some(49.0),
            review_count: Some(1000),
            rating: Some(4.5),
            affiliate_url: format!("https://example.com/dp/{asin}?tag=t"),
        }
    }

    fn test_state() -> ApiState {
        let store = SnapshotStore::new();
        store.replace(vec![
            snapshot("B001", "electronics", 150.0),
            snapshot("B002", "games", 100.0),
            snapshot("B003", "electronics", 30.0),
        ]);
        ApiState {
            store,
            limiter: Arc::new(RateLimiter::new(RateLimitConfig::default())),
            latency: Arc::new(LatencyStats::new()),
        }
    }

    #[tokio::test]
    async fn trends_ranks_and_limits() {
        let state = test_state();
        let response = get_trends(
            State(state),
            Query(TrendsQuery {
                limit: Some(2),
                category: None,
            }),
        )
        .await
        .0;

        assert_eq!(response.count, 2);
        assert_eq!(response.trends[0].asin, "B001");
        assert_eq!(response.trends[1].asin, "B002");
    }

    #[tokio::test]
    async fn trends_category_filter_applies_after_ranking() {
        let state = test_state();
        let response = get_trends(
            State(state),
            Query(TrendsQuery {
                limit: None,
                category: Some("games".to_string()),
            }),
        )
        .await
        .0;

        assert_eq!(response.count, 1);
        assert!(response.trends.iter().all(|t| t.category == "games"));
    }

    #[tokio::test]
    async fn category_trends_group_in_first_occurrence_order() {
        let state = test_state();
        let response = get_category_trends(
            State(state),
            Query(CategoryTrendsQuery { per_category: None }),
        )
        .await
        .0;

        let names: Vec<&str> = response
            .categories
            .iter()
            .map(|g| g.category.as_str())
            .collect();
        assert_eq!(names, ["electronics", "games"]);
        assert_eq!(response.categories[0].items.len(), 2);
    }

    #[tokio::test]
    async fn significant_movers_respect_threshold() {
        let state = test_state();
        let response = get_significant_movers(
            State(state),
            Query(SignificantQuery {
                threshold: Some(100.0),
            }),
        )
        .await
        .0;

        assert_eq!(response.threshold, 100.0);
        assert_eq!(response.count, 2);
        assert!(response
            .items
            .iter()
            .all(|t| t.rank_change_percent >= 100.0));
    }

    #[tokio::test]
    async fn product_lookup_scores_the_row() {
        let state = test_state();
        let response = get_product(State(state.clone()), Path("B001".to_string()))
            .await
            .expect("known asin")
            .0;
        // 150% → capped 50, 1000 reviews → 30, 4.5 → 10.
        assert_eq!(response.trend.trend_score, 90.0);

        let missing = get_product(State(state), Path("B999".to_string())).await;
        assert!(matches!(missing, Err(StatusCode::NOT_FOUND)));
    }

    #[tokio::test]
    async fn export_json_uses_the_ranked_pool() {
        let state = test_state();
        let response = export_json(State(state)).await.0;
        assert_eq!(response.count, 3);
        assert_eq!(response.data[0].asin, "B001");
    }

    #[tokio::test]
    async fn empty_store_serves_empty_results() {
        let state = ApiState {
            store: SnapshotStore::new(),
            limiter: Arc::new(RateLimiter::new(RateLimitConfig::default())),
            latency: Arc::new(LatencyStats::new()),
        };

        let trends = get_trends(
            State(state.clone()),
            Query(TrendsQuery {
                limit: None,
                category: None,
            }),
        )
        .await
        .0;
        assert_eq!(trends.count, 0);

        let categories = get_category_trends(
            State(state),
            Query(CategoryTrendsQuery { per_category: None }),
        )
        .await
        .0;
        assert!(categories.categories.is_empty());
    }
}
