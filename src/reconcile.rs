//! Cardinality reconciliation between two snapshots and the cached state.
//!
//! Entities are classified per cycle:
//!
//! | Class | Previous sample | Cached state | Treatment |
//! |-------|-----------------|--------------|-----------|
//! | [`Class::New`] | absent | any | fresh state, no deltas |
//! | [`Class::Continuing`] | present | consistent, same identity | suppression applies |
//! | [`Class::Stateless`] | present | absent | fresh state, deltas computed |
//! | [`Class::Corrupt`] | present | inconsistent | same as stateless |
//! | [`Class::Drifted`] | present | different identity | old descriptor withdrawn, fresh state |
//!
//! Entities tracked in the cache but absent from the current snapshot are
//! removed; see [`crate::cache::SuppressionCache`].
//!
//! Positional layouts additionally get an [`Alignment`] mapping each current
//! value index to the index of the same unit in the previous snapshot.

use crate::cache::{Identity, SuppressionState};
use crate::delta::CounterWidth;
use crate::schema::{CounterKind, FamilySchema, PositionalPolicy};
use crate::snapshot::{CounterSnapshot, EntitySample};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Why an entity is considered a different series under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftReason {
    /// Entity label values changed.
    Labels,
    /// Descriptor label values changed.
    Descriptor,
    /// A `Constant` field changed.
    Constants,
    /// The wrap width of a counter changed.
    Width,
}

impl fmt::Display for DriftReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriftReason::Labels => "labels",
            DriftReason::Descriptor => "descriptor",
            DriftReason::Constants => "constants",
            DriftReason::Width => "width",
        };
        f.write_str(s)
    }
}

/// Classification of an entity present in the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    /// Not in the previous snapshot.
    New,
    /// In both snapshots with valid, matching state.
    Continuing,
    /// In both snapshots, never seen by the cache.
    Stateless,
    /// In both snapshots, cached state has inconsistent lengths.
    Corrupt,
    /// In both snapshots, identity differs from the cached one.
    Drifted(DriftReason),
}

impl Class {
    /// Returns `true` if the entity starts over with a fresh state.
    pub fn is_fresh(&self) -> bool {
        !matches!(self, Class::Continuing)
    }
}

/// Extracts the secondary identity of a sample.
pub fn identity_of(schema: &FamilySchema, sample: &EntitySample) -> Identity {
    let constants = if schema.is_positional() {
        Vec::new()
    } else {
        schema
            .counters()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == CounterKind::Constant)
            .map(|(i, _)| sample.value(i).unwrap_or_default())
            .collect()
    };
    Identity {
        labels: sample.labels.clone(),
        descriptor: sample.descriptor.clone(),
        constants,
    }
}

/// Classifies one entity.
///
/// `widths` are the wrap widths the schema assigns to the entity's slots.
/// `ignore_lengths` skips the length check on the cached vectors, used when
/// a positional discontinuity rebuilds them anyway.
pub fn classify(
    previous: Option<&EntitySample>,
    state: Option<&SuppressionState>,
    identity: &Identity,
    widths: &[Option<CounterWidth>],
    ignore_lengths: bool,
) -> Class {
    if previous.is_none() {
        return Class::New;
    }
    let state = match state {
        Some(state) => state,
        None => return Class::Stateless,
    };
    if !ignore_lengths && !state.is_consistent(widths.len()) {
        return Class::Corrupt;
    }

    let cached = state.identity();
    if cached.labels != identity.labels {
        Class::Drifted(DriftReason::Labels)
    } else if cached.descriptor != identity.descriptor {
        Class::Drifted(DriftReason::Descriptor)
    } else if cached.constants != identity.constants {
        Class::Drifted(DriftReason::Constants)
    } else if !ignore_lengths && state.widths() != widths {
        Class::Drifted(DriftReason::Width)
    } else {
        Class::Continuing
    }
}

/// Mapping from current value indexes to previous ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alignment<'a> {
    /// Index `i` maps to index `i`.
    Identity,
    /// Unit ordering changed and deltas are not computed this cycle.
    Discontinuous,
    /// Unit ordering changed; indexes are mapped through unit ids.
    Realigned {
        /// Current unit ordering (`None`: index is the unit id).
        current: Option<&'a [u32]>,
        /// Unit id to previous index (`None`: unit id is the index).
        previous: Option<HashMap<u32, usize>>,
    },
}

impl<'a> Alignment<'a> {
    /// Computes the alignment of a family for this cycle.
    pub fn of<K: Hash + Eq + Clone>(
        schema: &FamilySchema,
        current: &'a CounterSnapshot<K>,
        previous: Option<&CounterSnapshot<K>>,
    ) -> Self {
        let previous = match previous {
            Some(previous) if schema.is_positional() => previous,
            _ => return Alignment::Identity,
        };
        if current.units() == previous.units() {
            return Alignment::Identity;
        }
        match schema.positional_policy() {
            PositionalPolicy::Discontinue => Alignment::Discontinuous,
            PositionalPolicy::Realign => Alignment::Realigned {
                current: current.units(),
                previous: previous.units().map(|units| {
                    units
                        .iter()
                        .enumerate()
                        .map(|(j, &unit)| (unit, j))
                        .collect()
                }),
            },
        }
    }

    /// Returns `true` unless the mapping is the identity.
    pub fn is_changed(&self) -> bool {
        !matches!(self, Alignment::Identity)
    }

    /// Index in the previous snapshot of the unit at current index `index`.
    pub fn previous_index(&self, index: usize) -> Option<usize> {
        match self {
            Alignment::Identity => Some(index),
            Alignment::Discontinuous => None,
            Alignment::Realigned { current, previous } => {
                let unit = match current {
                    Some(units) => *units.get(index)?,
                    None => u32::try_from(index).ok()?,
                };
                match previous {
                    Some(positions) => positions.get(&unit).copied(),
                    None => Some(unit as usize),
                }
            }
        }
    }
}
