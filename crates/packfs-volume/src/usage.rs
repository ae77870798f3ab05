//! Cached volume usage snapshots.
//!
//! Admission decisions must never block on disk I/O, so every volume carries
//! the last snapshot pushed by a background refresher. A volume whose usage
//! has never been refreshed reads as `None` and is treated as ineligible by
//! the admission filter rather than crashing the evaluation.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Point-in-time usage reading for a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Raw volume capacity in bytes.
    pub capacity: u64,
    /// Free bytes as of the last refresh.
    pub available: u64,
}

impl UsageSnapshot {
    /// Creates a snapshot from raw capacity and available readings.
    pub fn new(capacity: u64, available: u64) -> Self {
        Self {
            capacity,
            available,
        }
    }

    /// Bytes in use according to this snapshot.
    pub fn used(&self) -> u64 {
        self.capacity.saturating_sub(self.available)
    }

    /// Whether the readings are internally consistent.
    ///
    /// A refresher that races a mount change can briefly report more free
    /// space than capacity; such readings must not be trusted for admission.
    pub fn is_consistent(&self) -> bool {
        self.available <= self.capacity
    }
}

/// Holder for the most recent usage snapshot of one volume.
///
/// Reads are lock-protected but never touch the disk; refreshes are pushed
/// from outside the admission path.
#[derive(Debug, Default)]
pub struct CachedUsage {
    inner: RwLock<Option<UsageSnapshot>>,
}

impl CachedUsage {
    /// Creates an empty cache with no snapshot yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache seeded with an initial snapshot.
    pub fn with_snapshot(snapshot: UsageSnapshot) -> Self {
        Self {
            inner: RwLock::new(Some(snapshot)),
        }
    }

    /// Replaces the cached snapshot with a fresh reading.
    pub fn refresh(&self, snapshot: UsageSnapshot) {
        debug!(
            capacity = snapshot.capacity,
            available = snapshot.available,
            "refreshed usage snapshot"
        );
        *self.inner.write() = Some(snapshot);
    }

    /// Returns the last snapshot, or `None` if never refreshed.
    pub fn current(&self) -> Option<UsageSnapshot> {
        *self.inner.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_used() {
        let snapshot = UsageSnapshot::new(1000, 400);
        assert_eq!(snapshot.used(), 600);
    }

    #[test]
    fn test_snapshot_used_saturates() {
        let snapshot = UsageSnapshot::new(100, 400);
        assert_eq!(snapshot.used(), 0);
    }

    #[test]
    fn test_snapshot_consistency() {
        assert!(UsageSnapshot::new(1000, 1000).is_consistent());
        assert!(UsageSnapshot::new(1000, 0).is_consistent());
        assert!(!UsageSnapshot::new(1000, 1001).is_consistent());
    }

    #[test]
    fn test_cached_usage_starts_empty() {
        let cache = CachedUsage::new();
        assert_eq!(cache.current(), None);
    }

    #[test]
    fn test_cached_usage_with_snapshot() {
        let cache = CachedUsage::with_snapshot(UsageSnapshot::new(500, 200));
        assert_eq!(cache.current(), Some(UsageSnapshot::new(500, 200)));
    }

    #[test]
    fn test_cached_usage_refresh_replaces() {
        let cache = CachedUsage::new();
        cache.refresh(UsageSnapshot::new(500, 200));
        cache.refresh(UsageSnapshot::new(500, 100));
        assert_eq!(cache.current(), Some(UsageSnapshot::new(500, 100)));
    }

    #[test]
    fn test_snapshot_serde_roundtrip() {
        let snapshot = UsageSnapshot::new(1 << 40, 1 << 30);
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: UsageSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }
}
