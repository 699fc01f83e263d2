use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use crate::types::ProductSnapshot;

/// In-memory view of the most recent snapshot dataset.
///
/// The ordered row list is what the analyzer scores — input order is the
/// tie-break for equal scores, so it must survive storage. The asin index
/// exists for point lookups on the `/products/:asin` path.
pub struct SnapshotStore {
    /// Current dataset in file order. Swapped wholesale on reload; readers
    /// hold a cheap `Arc` clone and never block a swap.
    rows: RwLock<Arc<Vec<ProductSnapshot>>>,
    /// asin → snapshot.
    by_asin: DashMap<String, ProductSnapshot>,
    /// Nanosecond UTC epoch of the last successful replace (0 = never).
    loaded_at_ns: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rows: RwLock::new(Arc::new(Vec::new())),
            by_asin: DashMap::new(),
            loaded_at_ns: AtomicU64::new(0),
        })
    }

    /// Replace the dataset with a freshly loaded one.
    pub fn replace(&self, rows: Vec<ProductSnapshot>) {
        self.by_asin.clear();
        for row in &rows {
            self.by_asin.insert(row.asin.clone(), row.clone());
        }
        if let Ok(mut guard) = self.rows.write() {
            *guard = Arc::new(rows);
        }
        self.loaded_at_ns.store(now_ns(), Ordering::Relaxed);
    }

    /// Current dataset, in original file order.
    pub fn rows(&self) -> Arc<Vec<ProductSnapshot>> {
        self.rows
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_default()
    }

    pub fn get(&self, asin: &str) -> Option<ProductSnapshot> {
        self.by_asin.get(asin).map(|entry| entry.clone())
    }

    pub fn product_count(&self) -> usize {
        self.rows().len()
    }

    pub fn loaded_at_ns(&self) -> u64 {
        self.loaded_at_ns.load(Ordering::Relaxed)
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(asin: &str) -> ProductSnapshot {
        ProductSnapshot {
            asin: asin.to_string(),
            name: format!("Product {asin}"),
            category: "electronics".to_string(),
            current_rank: 1,
            rank_change_percent: Some(10.0),
            price: None,
            review_count: None,
            rating: None,
            affiliate_url: format!("https://example.com/dp/{asin}"),
        }
    }

    #[test]
    fn replace_swaps_rows_and_index() {
        let store = SnapshotStore::new();
        assert_eq!(store.product_count(), 0);
        assert_eq!(store.loaded_at_ns(), 0);

        store.replace(vec![snapshot("B001"), snapshot("B002")]);
        assert_eq!(store.product_count(), 2);
        assert!(store.get("B001").is_some());
        assert!(store.loaded_at_ns() > 0);

        store.replace(vec![snapshot("B003")]);
        assert_eq!(store.product_count(), 1);
        assert!(store.get("B001").is_none(), "old index entry survived");
        assert!(store.get("B003").is_some());
    }

    #[test]
    fn rows_keep_input_order() {
        let store = SnapshotStore::new();
        store.replace(vec![snapshot("B003"), snapshot("B001"), snapshot("B002")]);

        let asins: Vec<String> = store.rows().iter().map(|r| r.asin.clone()).collect();
        assert_eq!(asins, ["B003", "B001", "B002"]);
    }
}
