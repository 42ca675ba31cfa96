//! Generator statistics accumulated across invocations.
//!
//! Every engine call reports how many samples it rendered out of how many it
//! could have rendered. [`FamilyStats`] sums these per family with relaxed
//! atomics, so partition workers and concurrent drivers can record into the
//! same instance without locking. Each field lives on its own cache line.
//!
//! # Examples
//!
//! ```rust
//! use variazioni::emission::EmissionStats;
//! use variazioni::stats::FamilyStats;
//!
//! let stats = FamilyStats::new("proc_net_dev");
//! stats.record(EmissionStats { actual: 3, total: 12 }, 240);
//! stats.record(EmissionStats { actual: 1, total: 12 }, 80);
//!
//! let snap = stats.snapshot();
//! assert_eq!(snap.invocations, 2);
//! assert_eq!(snap.actual, 4);
//! assert!((snap.suppression_ratio() - 20.0 / 24.0).abs() < 1e-9);
//! ```

use crate::emission::EmissionStats;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free per-family accumulator of [`EmissionStats`].
#[derive(Debug)]
pub struct FamilyStats {
    family: String,
    invocations: CachePadded<AtomicU64>,
    actual: CachePadded<AtomicU64>,
    total: CachePadded<AtomicU64>,
    bytes: CachePadded<AtomicU64>,
}

impl FamilyStats {
    /// Creates zeroed statistics for a family.
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            invocations: CachePadded::new(AtomicU64::new(0)),
            actual: CachePadded::new(AtomicU64::new(0)),
            total: CachePadded::new(AtomicU64::new(0)),
            bytes: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Family id.
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Records one invocation.
    #[inline]
    pub fn record(&self, stats: EmissionStats, bytes: usize) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        self.actual.fetch_add(stats.actual as u64, Ordering::Relaxed);
        self.total.fetch_add(stats.total as u64, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Reads the current totals.
    pub fn snapshot(&self) -> FamilyStatsSnapshot {
        FamilyStatsSnapshot {
            family: self.family.clone(),
            invocations: self.invocations.load(Ordering::Relaxed),
            actual: self.actual.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    /// Reads the current totals and resets them to zero.
    ///
    /// Each field is swapped independently: a concurrent `record` may land
    /// partly in this snapshot and partly in the next.
    pub fn snapshot_and_reset(&self) -> FamilyStatsSnapshot {
        FamilyStatsSnapshot {
            family: self.family.clone(),
            invocations: self.invocations.swap(0, Ordering::Relaxed),
            actual: self.actual.swap(0, Ordering::Relaxed),
            total: self.total.swap(0, Ordering::Relaxed),
            bytes: self.bytes.swap(0, Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`FamilyStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FamilyStatsSnapshot {
    /// Family id.
    pub family: String,
    /// Number of engine invocations.
    pub invocations: u64,
    /// Samples rendered.
    pub actual: u64,
    /// Samples that could have been rendered.
    pub total: u64,
    /// Bytes rendered.
    pub bytes: u64,
}

impl FamilyStatsSnapshot {
    /// Fraction of potential samples that were suppressed, in `[0, 1]`.
    pub fn suppression_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            1.0 - (self.actual.min(self.total) as f64 / self.total as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = FamilyStats::new("irq");
        stats.record(EmissionStats { actual: 2, total: 10 }, 100);
        let snap = stats.snapshot();
        assert_eq!(
            snap,
            FamilyStatsSnapshot {
                family: "irq".to_string(),
                invocations: 1,
                actual: 2,
                total: 10,
                bytes: 100,
            }
        );
        assert!((snap.suppression_ratio() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_and_reset() {
        let stats = FamilyStats::new("irq");
        stats.record(EmissionStats { actual: 1, total: 1 }, 10);
        assert_eq!(stats.snapshot_and_reset().invocations, 1);
        assert_eq!(stats.snapshot().invocations, 0);
        assert_eq!(stats.family(), "irq");
    }

    #[test]
    fn test_empty_ratio() {
        assert_eq!(FamilyStatsSnapshot::default().suppression_ratio(), 0.0);
    }

    #[test]
    fn test_concurrent_record() {
        let stats = FamilyStats::new("net_dev");
        crossbeam_utils::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|_| {
                    for _ in 0..1000 {
                        stats.record(EmissionStats { actual: 1, total: 2 }, 3);
                    }
                });
            }
        })
        .unwrap();

        let snap = stats.snapshot();
        assert_eq!(snap.invocations, 4000);
        assert_eq!(snap.actual, 4000);
        assert_eq!(snap.total, 8000);
        assert_eq!(snap.bytes, 12000);
    }
}
