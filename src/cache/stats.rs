//! Cache statistics
//!
//! Passive only: counters never influence caching decisions.

use serde::Serialize;

/// Counters of the global cache
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads served from a fresh entry
    pub hits: u64,
    /// Reads that found an expired or invalidated entry
    pub misses: u64,
    /// Full table builds (registration and rebuilds)
    pub builds: u64,
    /// Single-key updates from notifications
    pub incremental_updates: u64,
    /// Validated edits folded in by sessions
    pub folds: u64,
    pub invalidations: u64,
}

impl CacheStats {
    /// Fraction of reads served without a rebuild
    pub fn hit_ratio(&self) -> f64 {
        let reads = self.hits + self.misses;
        if reads == 0 {
            return 0.0;
        }
        self.hits as f64 / reads as f64
    }
}
