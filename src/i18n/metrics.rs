//! Catalog loading counters.
//!
//! Each `Translator` owns one `CatalogMetrics`; nothing here is global.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct CatalogMetrics {
    /// Selections served from an already cached catalog
    cache_hits: AtomicUsize,

    /// Selections that required a fetch
    cache_misses: AtomicUsize,

    /// Fetches issued to the catalog source
    fetches: AtomicUsize,

    /// Fetches that failed to produce a catalog
    fetch_failures: AtomicUsize,
}

impl CatalogMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> usize {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn fetch_failures(&self) -> usize {
        self.fetch_failures.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> MetricsReport {
        let hits = self.cache_hits();
        let misses = self.cache_misses();
        let total = hits + misses;
        let cache_hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        let fetches = self.fetches();
        let failures = self.fetch_failures();
        let fetch_success_rate = if fetches > 0 {
            (fetches.saturating_sub(failures) as f64 / fetches as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate,
            fetches,
            fetch_failures: failures,
            fetch_success_rate,
        }
    }
}

/// Point-in-time snapshot of `CatalogMetrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Percentage (0-100)
    pub cache_hit_rate: f64,
    pub fetches: usize,
    pub fetch_failures: usize,
    /// Percentage (0-100)
    pub fetch_success_rate: f64,
}
