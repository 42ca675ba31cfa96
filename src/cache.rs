//! Suppression state carried from one cycle to the next.
//!
//! The engine is stateless; everything it needs to remember about an entity
//! between two invocations lives in a [`SuppressionState`], and the states of a
//! family live in a [`SuppressionCache`] owned by the caller and passed to
//! every call by `&mut`.
//!
//! With the `json` feature the cache can be persisted across restarts with
//! [`SuppressionCache::to_json`] and [`SuppressionCache::from_json`]. Entries
//! are stored as a list, so any serializable key works (tuples included).

use crate::delta::CounterWidth;
use std::collections::HashMap;
use std::hash::Hash;

/// Secondary identity of an entity: everything that, when changed under the
/// same key, makes it a different series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Identity {
    /// Entity label values.
    pub labels: Vec<String>,
    /// Descriptor label values.
    pub descriptor: Vec<String>,
    /// Raw values of the `Constant` counters, by index.
    pub constants: Vec<u64>,
}

/// What the engine remembers about one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SuppressionState {
    pub(crate) cycle_num: u32,
    pub(crate) zero_delta: Vec<bool>,
    pub(crate) widths: Vec<Option<CounterWidth>>,
    pub(crate) identity: Identity,
    pub(crate) descriptor: Option<String>,
    pub(crate) rank: u64,
}

impl SuppressionState {
    /// Fresh state at cycle 0: next pass is a full one.
    pub(crate) fn fresh(widths: Vec<Option<CounterWidth>>, identity: Identity, rank: u64) -> Self {
        Self {
            cycle_num: 0,
            zero_delta: vec![false; widths.len()],
            widths,
            identity,
            descriptor: None,
            rank,
        }
    }

    /// Position within the full-metrics period; 0 means full emission.
    pub fn cycle_num(&self) -> u32 {
        self.cycle_num
    }

    /// Per-index flag: the last rendered delta was zero.
    pub fn zero_delta(&self) -> &[bool] {
        &self.zero_delta
    }

    /// Wrap widths the state was built with.
    pub fn widths(&self) -> &[Option<CounterWidth>] {
        &self.widths
    }

    /// Cached secondary identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Last asserted descriptor series, if any.
    pub fn descriptor(&self) -> Option<&str> {
        self.descriptor.as_deref()
    }

    /// First-seen rank, used to order withdrawals.
    pub fn rank(&self) -> u64 {
        self.rank
    }

    /// Returns `true` if the vector lengths agree with `slots`.
    pub(crate) fn is_consistent(&self, slots: usize) -> bool {
        self.zero_delta.len() == slots && self.widths.len() == slots
    }

    /// Clears the zero-delta flags and adopts `widths` (positional
    /// discontinuity).
    pub(crate) fn reset_bitmap(&mut self, widths: Vec<Option<CounterWidth>>) {
        self.zero_delta = vec![false; widths.len()];
        self.widths = widths;
    }

    /// Advances the cycle counter modulo `period`.
    pub(crate) fn advance(&mut self, period: u32) {
        self.cycle_num = if period <= 1 {
            0
        } else {
            (self.cycle_num % period + 1) % period
        };
    }
}

/// Caller-owned map from entity key to [`SuppressionState`].
#[derive(Debug, Clone)]
pub struct SuppressionCache<K> {
    states: HashMap<K, SuppressionState>,
    next_rank: u64,
}

impl<K> Default for SuppressionCache<K> {
    fn default() -> Self {
        Self {
            states: HashMap::new(),
            next_rank: 0,
        }
    }
}

impl<K: Hash + Eq + Clone> SuppressionCache<K> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state of an entity.
    pub fn get(&self, key: &K) -> Option<&SuppressionState> {
        self.states.get(key)
    }

    /// Returns `true` if the entity has state.
    pub fn contains(&self, key: &K) -> bool {
        self.states.contains_key(key)
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` if no entity is tracked.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Iterates over all states in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &SuppressionState)> {
        self.states.iter()
    }

    /// Forgets everything. The next cycle treats every entity as new and no
    /// withdrawal is emitted for entities seen before.
    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub(crate) fn take(&mut self, key: &K) -> Option<SuppressionState> {
        self.states.remove(key)
    }

    pub(crate) fn put(&mut self, key: K, state: SuppressionState) {
        self.states.insert(key, state);
    }

    pub(crate) fn next_rank(&mut self) -> u64 {
        let rank = self.next_rank;
        self.next_rank += 1;
        rank
    }

    /// Keys of tracked entities for which `alive` returns false, in
    /// first-seen order.
    pub(crate) fn vanished(&self, alive: impl Fn(&K) -> bool) -> Vec<K> {
        let mut gone: Vec<(u64, &K)> = self
            .states
            .iter()
            .filter(|(k, _)| !alive(k))
            .map(|(k, s)| (s.rank, k))
            .collect();
        gone.sort_unstable_by_key(|(rank, _)| *rank);
        gone.into_iter().map(|(_, k)| k.clone()).collect()
    }
}

#[cfg(feature = "json")]
#[derive(serde::Serialize)]
struct PersistedRef<'a, K> {
    next_rank: u64,
    states: Vec<(&'a K, &'a SuppressionState)>,
}

#[cfg(feature = "json")]
#[derive(serde::Deserialize)]
struct Persisted<K> {
    next_rank: u64,
    states: Vec<(K, SuppressionState)>,
}

#[cfg(feature = "json")]
impl<K> SuppressionCache<K>
where
    K: Hash + Eq + Clone + serde::Serialize + serde::de::DeserializeOwned,
{
    /// Serializes the cache to a JSON string.
    pub fn to_json(&self) -> crate::Result<String> {
        let mut states: Vec<_> = self.states.iter().collect();
        states.sort_unstable_by_key(|(_, s)| s.rank);
        let persisted = PersistedRef {
            next_rank: self.next_rank,
            states,
        };
        Ok(serde_json::to_string(&persisted)?)
    }

    /// Restores a cache serialized with [`SuppressionCache::to_json`].
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let persisted: Persisted<K> = serde_json::from_str(json)?;
        Ok(Self {
            states: persisted.states.into_iter().collect(),
            next_rank: persisted.next_rank,
        })
    }
}
