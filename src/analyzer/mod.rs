mod trend;

pub use trend::{rank_top, score, significant_movers, top_by_category, trend_score};
