//! Per-cycle observation of a metrics family.
//!
//! A [`CounterSnapshot`] holds, for every entity of a family, the raw counter
//! vector read at one instant along with the label values identifying the
//! entity. The driver keeps the snapshot of the previous cycle around and hands
//! both to the engine; snapshots are never mutated by the engine.
//!
//! Entities keep the order in which the driver inserted them, which is the
//! order in which their samples are rendered.
//!
//! # Examples
//!
//! ```rust
//! use variazioni::snapshot::{pair, CounterSnapshot, EntitySample};
//!
//! let mut prev = CounterSnapshot::new();
//! prev.insert("eth0", EntitySample::new(["eth0"], [100, 7]));
//!
//! let mut curr = CounterSnapshot::new();
//! curr.insert("eth0", EntitySample::new(["eth0"], [150, 7]));
//! curr.insert("eth1", EntitySample::new(["eth1"], [3, 0]));
//!
//! let paired: Vec<_> = pair(&curr, Some(&prev)).map(|(k, _, p)| (*k, p.is_some())).collect();
//! assert_eq!(paired, vec![("eth0", true), ("eth1", false)]);
//! ```

use std::collections::HashMap;
use std::hash::Hash;

/// Raw observation of one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntitySample {
    /// Entity label values, in schema order.
    pub labels: Vec<String>,
    /// Descriptor label values, in schema order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub descriptor: Vec<String>,
    /// Raw counter values, indexed like the schema counters (or units).
    pub values: Vec<u64>,
}

impl EntitySample {
    /// Creates a sample from entity label values and raw counters.
    pub fn new<L, S, V>(labels: L, values: V) -> Self
    where
        L: IntoIterator<Item = S>,
        S: Into<String>,
        V: IntoIterator<Item = u64>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            descriptor: Vec::new(),
            values: values.into_iter().collect(),
        }
    }

    /// Sets the descriptor label values.
    pub fn with_descriptor<D, S>(mut self, descriptor: D) -> Self
    where
        D: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor = descriptor.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the raw value at `index`, if present.
    #[inline]
    pub fn value(&self, index: usize) -> Option<u64> {
        self.values.get(index).copied()
    }
}

/// All entities of one family observed at one instant.
#[derive(Debug, Clone)]
pub struct CounterSnapshot<K> {
    entities: Vec<(K, EntitySample)>,
    index: HashMap<K, usize>,
    units: Option<Vec<u32>>,
}

impl<K> Default for CounterSnapshot<K> {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            index: HashMap::new(),
            units: None,
        }
    }
}

impl<K: Hash + Eq + Clone> CounterSnapshot<K> {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty snapshot with room for `capacity` entities.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entities: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            units: None,
        }
    }

    /// Sets the family-wide unit ordering (e.g. the CPU list) for positional
    /// layouts: value `i` of every entity belongs to unit `units[i]`.
    pub fn with_units(mut self, units: impl IntoIterator<Item = u32>) -> Self {
        self.units = Some(units.into_iter().collect());
        self
    }

    /// Inserts or replaces an entity. A replaced entity keeps its position.
    pub fn insert(&mut self, key: K, sample: EntitySample) {
        match self.index.get(&key) {
            Some(&pos) => self.entities[pos].1 = sample,
            None => {
                self.index.insert(key.clone(), self.entities.len());
                self.entities.push((key, sample));
            }
        }
    }

    /// Returns the sample of an entity.
    pub fn get(&self, key: &K) -> Option<&EntitySample> {
        self.index.get(key).map(|&pos| &self.entities[pos].1)
    }

    /// Returns `true` if the entity was observed.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity was observed.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterates entities in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &EntitySample)> {
        self.entities.iter().map(|(k, s)| (k, s))
    }

    /// The unit ordering, if one was set.
    pub fn units(&self) -> Option<&[u32]> {
        self.units.as_deref()
    }

    /// Unit id of value index `index`. Without a unit ordering, the index is
    /// the unit id.
    pub fn unit_at(&self, index: usize) -> Option<u32> {
        match &self.units {
            Some(units) => units.get(index).copied(),
            None => u32::try_from(index).ok(),
        }
    }
}

impl<K: Hash + Eq + Clone> FromIterator<(K, EntitySample)> for CounterSnapshot<K> {
    fn from_iter<I: IntoIterator<Item = (K, EntitySample)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (key, sample) in iter {
            snapshot.insert(key, sample);
        }
        snapshot
    }
}

/// Pairs every entity of `curr` with its sample in `prev`, in `curr` order.
///
/// The previous sample is `None` for entities absent from `prev` and for all
/// entities when there is no previous snapshot.
pub fn pair<'a, K: Hash + Eq + Clone + 'a>(
    curr: &'a CounterSnapshot<K>,
    prev: Option<&'a CounterSnapshot<K>>,
) -> impl Iterator<Item = (&'a K, &'a EntitySample, Option<&'a EntitySample>)> + 'a {
    curr.iter()
        .map(move |(key, sample)| (key, sample, prev.and_then(|p| p.get(key))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order() {
        let mut snap = CounterSnapshot::new();
        snap.insert("b", EntitySample::new(["b"], [1]));
        snap.insert("a", EntitySample::new(["a"], [2]));
        snap.insert("b", EntitySample::new(["b"], [3]));

        let keys: Vec<_> = snap.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get(&"b").and_then(|s| s.value(0)), Some(3));
    }

    #[test]
    fn test_pair_without_previous() {
        let snap: CounterSnapshot<u32> = [(1, EntitySample::new(["x"], [5]))]
            .into_iter()
            .collect();
        let pairs: Vec<_> = pair(&snap, None).collect();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].2.is_none());
    }

    #[test]
    fn test_pair_with_previous() {
        let prev: CounterSnapshot<u32> = [
            (1, EntitySample::new(["x"], [5])),
            (2, EntitySample::new(["y"], [6])),
        ]
        .into_iter()
        .collect();
        let curr: CounterSnapshot<u32> = [
            (3, EntitySample::new(["z"], [0])),
            (1, EntitySample::new(["x"], [9])),
        ]
        .into_iter()
        .collect();

        let pairs: Vec<_> = pair(&curr, Some(&prev))
            .map(|(k, c, p)| (*k, c.value(0), p.and_then(|p| p.value(0))))
            .collect();
        assert_eq!(pairs, vec![(3, Some(0), None), (1, Some(9), Some(5))]);
    }

    #[test]
    fn test_unit_at() {
        let snap: CounterSnapshot<u32> = CounterSnapshot::new();
        assert_eq!(snap.unit_at(3), Some(3));

        let snap: CounterSnapshot<u32> = CounterSnapshot::new().with_units([0, 2, 5]);
        assert_eq!(snap.unit_at(2), Some(5));
        assert_eq!(snap.unit_at(3), None);
        assert_eq!(snap.units(), Some(&[0, 2, 5][..]));
    }

    #[test]
    fn test_sample_descriptor() {
        let sample = EntitySample::new(["sda"], [1, 2]).with_descriptor(["8", "0"]);
        assert_eq!(sample.descriptor, vec!["8", "0"]);
        assert_eq!(sample.value(2), None);
    }
}
