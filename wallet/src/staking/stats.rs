use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters of the staking loop.
#[derive(Debug, Default)]
pub struct StakingStats {
    /// Kernel hashes computed
    hashes: AtomicU64,
    /// Kernel searches started
    searches: AtomicU64,
    /// Kernels found
    found: AtomicU64,
    /// Coinstakes accepted by the sink
    accepted: AtomicU64,
    /// Coinstakes that lost a race
    orphaned: AtomicU64,
    rejected: AtomicU64,
    /// Claims discarded because the tip moved
    stale: AtomicU64,
    /// Cycles skipped after too many stale claims
    skipped_cycles: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingStatsSnapshot {
    pub hashes: u64,
    pub searches: u64,
    pub found: u64,
    pub accepted: u64,
    pub orphaned: u64,
    pub rejected: u64,
    pub stale: u64,
    pub skipped_cycles: u64,
}

impl StakingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hashes(&self, count: u64) {
        self.hashes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_search(&self) {
        self.searches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_found(&self) {
        self.found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_orphaned(&self) {
        self.orphaned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_cycle(&self) {
        self.skipped_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StakingStatsSnapshot {
        StakingStatsSnapshot {
            hashes: self.hashes.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            found: self.found.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            skipped_cycles: self.skipped_cycles.load(Ordering::Relaxed),
        }
    }
}
