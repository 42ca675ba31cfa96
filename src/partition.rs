//! Key-space partitioning of one family across worker threads.
//!
//! Large families (thousands of processes, many queueing disciplines) can be
//! split by entity key into disjoint partitions. Each partition owns its
//! [`SuppressionCache`] and is processed by a scoped worker thread; no cache
//! is ever shared between workers.
//!
//! Keys are assigned with a fixed 64-bit FxHash, so the assignment does not
//! change across builds and per-partition caches persisted with
//! `SuppressionCache::to_json` stay valid after an upgrade.
//!
//! Samples are concatenated in partition order, each partition keeping the
//! snapshot order of its own entities. The interval sample is rendered once,
//! after all partitions.

use crate::cache::SuppressionCache;
use crate::emission::{Cycle, Emission, Engine};
use crate::error::{EngineError, Result};
use crate::snapshot::CounterSnapshot;
use fxhash::FxHasher64;
use std::hash::{Hash, Hasher};
use tracing::warn;

/// Returns the partition of `key` among `partitions`.
#[inline]
pub fn partition_of<K: Hash>(key: &K, partitions: usize) -> usize {
    if partitions <= 1 {
        return 0;
    }
    let mut hasher = FxHasher64::default();
    key.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

/// Splits a snapshot into `partitions` disjoint snapshots sharing its unit
/// ordering.
pub fn split_snapshot<K: Hash + Eq + Clone>(
    snapshot: &CounterSnapshot<K>,
    partitions: usize,
) -> Vec<CounterSnapshot<K>> {
    let partitions = partitions.max(1);
    let mut parts: Vec<CounterSnapshot<K>> = (0..partitions)
        .map(|_| {
            let part = CounterSnapshot::with_capacity(snapshot.len() / partitions + 1);
            match snapshot.units() {
                Some(units) => part.with_units(units.iter().copied()),
                None => part,
            }
        })
        .collect();
    for (key, sample) in snapshot.iter() {
        parts[partition_of(key, partitions)].insert(key.clone(), sample.clone());
    }
    parts
}

/// An [`Engine`] running over a fixed number of key-space partitions.
#[derive(Debug, Clone)]
pub struct PartitionedEngine {
    engine: Engine,
    partitions: usize,
}

impl PartitionedEngine {
    /// Wraps `engine`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoPartitions`] if `partitions` is zero.
    pub fn new(engine: Engine, partitions: usize) -> Result<Self> {
        if partitions == 0 {
            return Err(EngineError::NoPartitions);
        }
        Ok(Self { engine, partitions })
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Number of partitions.
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// One empty cache per partition.
    pub fn new_caches<K: Hash + Eq + Clone>(&self) -> Vec<SuppressionCache<K>> {
        (0..self.partitions).map(|_| SuppressionCache::new()).collect()
    }

    /// Runs one cycle over all partitions.
    ///
    /// # Errors
    ///
    /// Fails if `caches` does not hold one cache per partition, on entity
    /// arity errors (no cache is touched), or if a worker panicked.
    pub fn generate<K>(
        &self,
        cycle: &Cycle<'_, K>,
        caches: &mut [SuppressionCache<K>],
    ) -> Result<Emission>
    where
        K: Hash + Eq + Clone + Send + Sync,
    {
        if caches.len() != self.partitions {
            return Err(EngineError::PartitionCaches {
                expected: self.partitions,
                got: caches.len(),
            });
        }
        if self.partitions == 1 {
            return self.engine.generate(cycle, &mut caches[0]);
        }

        self.engine.check_arity(cycle.current)?;
        if cycle.previous.is_some() && !cycle.has_valid_interval() {
            warn!(
                family = self.engine.schema().id(),
                interval_secs = cycle.interval_secs,
                "non-monotonic clock, skipping rates"
            );
        }

        let current = split_snapshot(cycle.current, self.partitions);
        let previous = cycle
            .previous
            .map(|p| split_snapshot(p, self.partitions));

        let engine = &self.engine;
        let parts = crossbeam_utils::thread::scope(|s| {
            let handles: Vec<_> = caches
                .iter_mut()
                .enumerate()
                .map(|(i, cache)| {
                    let part = Cycle {
                        current: &current[i],
                        previous: previous.as_ref().map(|p| &p[i]),
                        timestamp_ms: cycle.timestamp_ms,
                        interval_secs: cycle.interval_secs,
                        force_full: cycle.force_full,
                    };
                    s.spawn(move |_| engine.generate_counters(&part, cache))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join())
                .collect::<std::result::Result<Vec<_>, _>>()
        })
        .map_err(|_| EngineError::WorkerPanicked)?
        .map_err(|_| EngineError::WorkerPanicked)?;

        let mut emission = Emission::default();
        for part in parts {
            emission.append(part);
        }
        engine.push_interval(cycle, &mut emission);
        Ok(emission)
    }
}
