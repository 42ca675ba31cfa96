//! The per-cycle emission engine.
//!
//! [`Engine::generate`] takes the current and previous snapshots of a family
//! and the caller's [`SuppressionCache`], decides which samples to render this
//! cycle and updates the cache in place.
//!
//! # Emission rules
//!
//! | Counter kind | Rendered when |
//! |--------------|---------------|
//! | `Delta`, `Rate` | delta != 0, full cycle, no prior state, or the previous delta was not zero |
//! | `Gauge` | value changed, full cycle, or no previous value |
//! | `Constant` | never |
//! | descriptor | full cycle, first appearance, or descriptor change |
//!
//! A full cycle happens every `full_metrics_period` invocations per entity, so
//! every series is refreshed at a bounded interval even when nothing changes.
//! New entities render no delta-kind sample; vanished entities render one
//! withdrawal (value 0) of their last descriptor and are forgotten. Their
//! counter series are listed in [`Emission::retired`].
//!
//! # Examples
//!
//! ```rust
//! use variazioni::cache::SuppressionCache;
//! use variazioni::delta::CounterWidth;
//! use variazioni::emission::{Cycle, Engine};
//! use variazioni::schema::{CounterKind, FamilySchema};
//! use variazioni::snapshot::{CounterSnapshot, EntitySample};
//!
//! let schema = FamilySchema::new("net_dev")
//!     .with_entity_label("dev")
//!     .with_counter("net_dev_rx_pkts_delta", CounterKind::delta(CounterWidth::W64));
//! let engine = Engine::new(schema).unwrap().with_instance("lsvmi").with_hostname("node1");
//! let mut cache = SuppressionCache::new();
//!
//! let mut prev = CounterSnapshot::new();
//! prev.insert("eth0", EntitySample::new(["eth0"], [100]));
//! let mut curr = CounterSnapshot::new();
//! curr.insert("eth0", EntitySample::new(["eth0"], [142]));
//!
//! let cycle = Cycle::new(&curr, 1_000).with_previous(&prev).with_interval(5.0);
//! let emission = engine.generate(&cycle, &mut cache).unwrap();
//! assert_eq!(
//!     emission.to_text(),
//!     "net_dev_rx_pkts_delta{instance=\"lsvmi\",hostname=\"node1\",dev=\"eth0\"} 42 1000\n"
//! );
//! ```

use crate::cache::{SuppressionCache, SuppressionState};
use crate::config::DEFAULT_INSTANCE;
use crate::delta::delta;
use crate::error::{EngineError, Result};
use crate::reconcile::{classify, identity_of, Alignment, Class, DriftReason};
use crate::render::{rate_value, Renderer, Sample, SampleKind, SampleValue, INTERVAL_PRECISION};
use crate::schema::{CounterKind, CounterSpec, DriftPolicy, FamilySchema};
use crate::snapshot::{pair, CounterSnapshot, EntitySample};
use std::collections::HashSet;
use std::hash::Hash;
use tracing::{debug, warn};

/// Default number of cycles between two full emissions.
pub const DEFAULT_FULL_METRICS_FACTOR: u32 = 15;

/// Inputs of one engine invocation.
#[derive(Debug)]
pub struct Cycle<'a, K> {
    /// The snapshot taken this cycle.
    pub current: &'a CounterSnapshot<K>,
    /// The snapshot taken the cycle before, if any.
    pub previous: Option<&'a CounterSnapshot<K>>,
    /// Timestamp shared by every sample of this invocation.
    pub timestamp_ms: u64,
    /// Seconds elapsed between the previous and the current snapshot.
    pub interval_secs: f64,
    /// Render every series regardless of suppression.
    pub force_full: bool,
}

impl<K> Clone for Cycle<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Cycle<'_, K> {}

impl<'a, K> Cycle<'a, K> {
    /// Creates a cycle without previous snapshot.
    pub fn new(current: &'a CounterSnapshot<K>, timestamp_ms: u64) -> Self {
        Self {
            current,
            previous: None,
            timestamp_ms,
            interval_secs: 0.0,
            force_full: false,
        }
    }

    /// Sets the previous snapshot.
    pub fn with_previous(mut self, previous: &'a CounterSnapshot<K>) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Sets the interval between the two snapshots.
    pub fn with_interval(mut self, interval_secs: f64) -> Self {
        self.interval_secs = interval_secs;
        self
    }

    /// Forces a full emission.
    pub fn with_force_full(mut self, force_full: bool) -> Self {
        self.force_full = force_full;
        self
    }

    /// Returns `true` if rates can be computed over this cycle's interval.
    pub fn has_valid_interval(&self) -> bool {
        self.interval_secs.is_finite() && self.interval_secs > 0.0
    }
}

/// Sample counts of one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmissionStats {
    /// Samples actually rendered.
    pub actual: usize,
    /// Samples that would have been rendered without suppression.
    pub total: usize,
}

/// The ordered samples produced by one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emission {
    samples: Vec<Sample>,
    retired: Vec<String>,
    stats: EmissionStats,
}

impl Emission {
    /// The rendered samples, in output order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Consumes the emission, returning its samples.
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    /// Rendered vs potential sample counts.
    pub fn stats(&self) -> EmissionStats {
        self.stats
    }

    /// Counter series that stopped existing this cycle: those of vanished
    /// entities, of entities whose labels changed, and of units gone from a
    /// positional family. Nothing is rendered for them; observers keeping
    /// per-series state should drop them.
    pub fn retired(&self) -> &[String] {
        &self.retired
    }

    /// Number of rendered samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if nothing was rendered.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Renders all samples as text, one line each.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    /// Appends all sample lines to `out`, returning the number of bytes
    /// written.
    pub fn render_into(&self, out: &mut String) -> usize {
        let start = out.len();
        for sample in &self.samples {
            sample.write_line(out);
        }
        out.len() - start
    }

    pub(crate) fn push(&mut self, sample: Sample) {
        self.stats.actual += 1;
        self.samples.push(sample);
    }

    pub(crate) fn retire(&mut self, series: String) {
        self.retired.push(series);
    }

    pub(crate) fn add_potential(&mut self, count: usize) {
        self.stats.total += count;
    }

    pub(crate) fn append(&mut self, other: Emission) {
        self.stats.actual += other.stats.actual;
        self.stats.total += other.stats.total;
        self.samples.extend(other.samples);
        self.retired.extend(other.retired);
    }
}

/// Emission engine for one metrics family.
///
/// The engine holds configuration only; it can be shared between threads and
/// invoked for any number of caches.
#[derive(Debug, Clone)]
pub struct Engine {
    schema: FamilySchema,
    full_metrics_period: u32,
    stagger_full_cycles: bool,
    renderer: Renderer,
}

impl Engine {
    /// Creates an engine after validating the schema.
    pub fn new(schema: FamilySchema) -> Result<Self> {
        schema.validate()?;
        debug!(
            family = schema.id(),
            counters = schema.counters().len(),
            positional = schema.is_positional(),
            "engine created"
        );
        Ok(Self {
            schema,
            full_metrics_period: DEFAULT_FULL_METRICS_FACTOR,
            stagger_full_cycles: false,
            renderer: Renderer::new(DEFAULT_INSTANCE, ""),
        })
    }

    /// Sets the `instance` label value.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.renderer = Renderer::new(instance, self.renderer.hostname());
        self
    }

    /// Sets the `hostname` label value.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.renderer = Renderer::new(self.renderer.instance(), hostname);
        self
    }

    /// Sets the number of cycles between two full emissions. 0 and 1 make
    /// every cycle a full one.
    pub fn with_full_metrics_period(mut self, period: u32) -> Self {
        self.full_metrics_period = period;
        self
    }

    /// Spreads the full cycles of new entities over the period.
    ///
    /// A new entity still renders fully on its first cycle; its next full
    /// cycle is offset by its first-seen rank, so entities appearing together
    /// do not all refresh on the same cycle afterwards.
    pub fn with_staggered_full_cycles(mut self, stagger: bool) -> Self {
        self.stagger_full_cycles = stagger;
        self
    }

    /// Returns `true` if full cycles of new entities are staggered.
    pub fn staggered_full_cycles(&self) -> bool {
        self.stagger_full_cycles
    }

    /// The family schema.
    pub fn schema(&self) -> &FamilySchema {
        &self.schema
    }

    /// The full-metrics period.
    pub fn full_metrics_period(&self) -> u32 {
        self.full_metrics_period
    }

    /// The series renderer.
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Runs one cycle, updating `cache` in place.
    ///
    /// # Errors
    ///
    /// Fails, leaving `cache` untouched, if an entity's label or descriptor
    /// values do not match the schema.
    pub fn generate<K: Hash + Eq + Clone>(
        &self,
        cycle: &Cycle<'_, K>,
        cache: &mut SuppressionCache<K>,
    ) -> Result<Emission> {
        self.check_arity(cycle.current)?;
        if cycle.previous.is_some() && !cycle.has_valid_interval() {
            warn!(
                family = self.schema.id(),
                interval_secs = cycle.interval_secs,
                "non-monotonic clock, skipping rates"
            );
        }
        let mut emission = self.generate_counters(cycle, cache);
        self.push_interval(cycle, &mut emission);
        Ok(emission)
    }

    /// Entity and withdrawal samples of one cycle, without the interval
    /// sample. Arity must have been checked.
    pub(crate) fn generate_counters<K: Hash + Eq + Clone>(
        &self,
        cycle: &Cycle<'_, K>,
        cache: &mut SuppressionCache<K>,
    ) -> Emission {
        let alignment = Alignment::of(&self.schema, cycle.current, cycle.previous);
        if alignment.is_changed() {
            debug!(
                family = self.schema.id(),
                policy = ?self.schema.positional_policy(),
                "unit ordering changed"
            );
        }

        let mut emission = Emission::default();
        for (key, sample, previous) in pair(cycle.current, cycle.previous) {
            self.entity(key, sample, previous, cycle, &alignment, cache, &mut emission);
        }

        for key in cache.vanished(|k| cycle.current.contains(k)) {
            let Some(state) = cache.take(&key) else {
                continue;
            };
            if let Some(previous) = cycle.previous {
                if let Some(sample) = previous.get(&key) {
                    let slots = self.schema.slots(sample.values.len());
                    self.retire_counters(sample, previous, 0..slots, &mut emission);
                }
            }
            if let Some(descriptor) = state.descriptor {
                emission.add_potential(1);
                emission.push(self.withdrawal(descriptor, cycle.timestamp_ms));
            }
        }
        emission
    }

    pub(crate) fn check_arity<K: Hash + Eq + Clone>(
        &self,
        snapshot: &CounterSnapshot<K>,
    ) -> Result<()> {
        let labels = self.schema.entity_labels().len();
        let descriptor = self.schema.descriptor().map_or(0, |d| d.labels.len());
        for (_, sample) in snapshot.iter() {
            if sample.labels.len() != labels {
                return Err(EngineError::LabelArity {
                    family: self.schema.id().to_string(),
                    expected: labels,
                    got: sample.labels.len(),
                });
            }
            if sample.descriptor.len() != descriptor {
                return Err(EngineError::DescriptorArity {
                    family: self.schema.id().to_string(),
                    expected: descriptor,
                    got: sample.descriptor.len(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn push_interval<K>(&self, cycle: &Cycle<'_, K>, emission: &mut Emission) {
        let Some(metric) = self.schema.interval_metric() else {
            return;
        };
        if cycle.previous.is_none() || !cycle.has_valid_interval() {
            return;
        }
        emission.add_potential(1);
        emission.push(Sample {
            series: self.renderer.series(metric, std::iter::empty()),
            value: SampleValue::Float {
                value: cycle.interval_secs,
                precision: INTERVAL_PRECISION,
            },
            timestamp_ms: cycle.timestamp_ms,
            kind: SampleKind::Interval,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn entity<K: Hash + Eq + Clone>(
        &self,
        key: &K,
        sample: &EntitySample,
        previous: Option<&EntitySample>,
        cycle: &Cycle<'_, K>,
        alignment: &Alignment<'_>,
        cache: &mut SuppressionCache<K>,
        emission: &mut Emission,
    ) {
        let schema = &self.schema;
        let slots = schema.slots(sample.values.len());
        let widths = schema.widths(slots);
        let identity = identity_of(schema, sample);
        let old = cache.take(key);
        let class = classify(
            previous,
            old.as_ref(),
            &identity,
            &widths,
            alignment.is_changed(),
        );

        let compute_deltas = match class {
            Class::Continuing | Class::Stateless => true,
            Class::New => false,
            Class::Corrupt => {
                warn!(family = schema.id(), "inconsistent suppression state, starting over");
                true
            }
            Class::Drifted(DriftReason::Width) => {
                warn!(family = schema.id(), "counter width changed, resetting deltas");
                false
            }
            Class::Drifted(reason) => {
                debug!(family = schema.id(), %reason, "identity drift");
                schema.drift_policy() == DriftPolicy::KeepDeltas
            }
        };

        if let (Some(prev_sample), Some(prev_snapshot)) = (previous, cycle.previous) {
            let prev_slots = schema.slots(prev_sample.values.len());
            if prev_sample.labels != sample.labels {
                self.retire_counters(prev_sample, prev_snapshot, 0..prev_slots, emission);
            } else if schema.is_positional() && alignment.is_changed() {
                let units: HashSet<u32> =
                    (0..slots).filter_map(|i| cycle.current.unit_at(i)).collect();
                let gone = (0..prev_slots).filter(|&j| {
                    prev_snapshot
                        .unit_at(j)
                        .is_some_and(|unit| !units.contains(&unit))
                });
                self.retire_counters(prev_sample, prev_snapshot, gone, emission);
            }
        }

        let old_descriptor = old.as_ref().and_then(|s| s.descriptor.clone());
        let mut state = match old {
            Some(state) if !class.is_fresh() => state,
            Some(state) => SuppressionState::fresh(widths, identity, state.rank),
            None => SuppressionState::fresh(widths, identity, cache.next_rank()),
        };
        if alignment.is_changed() && !class.is_fresh() {
            state.reset_bitmap(schema.widths(slots));
        }
        if cycle.force_full || matches!(alignment, Alignment::Discontinuous) {
            state.cycle_num = 0;
        }
        let full = state.cycle_num == 0;
        let interval_ok = cycle.has_valid_interval();

        emission.add_potential(schema.potential_samples(sample.values.len()));

        for i in 0..slots {
            let Some(spec) = schema.counter_at(i) else {
                continue;
            };
            let Some(value) = sample.value(i) else {
                debug!(family = schema.id(), index = i, "missing counter value");
                if let Some(bit) = state.zero_delta.get_mut(i) {
                    *bit = false;
                }
                continue;
            };
            let prev_value = previous.and_then(|p| p.value(alignment.previous_index(i)?));

            let rendered = match spec.kind {
                CounterKind::Constant => continue,
                CounterKind::Gauge => {
                    if !full && prev_value == Some(value) {
                        continue;
                    }
                    SampleValue::Unsigned(value)
                }
                CounterKind::Delta { width } | CounterKind::Rate { width, .. } => {
                    if !compute_deltas {
                        continue;
                    }
                    let Some(bit) = state.zero_delta.get_mut(i) else {
                        continue;
                    };
                    let Some(prev_value) = prev_value else {
                        *bit = false;
                        continue;
                    };
                    let d = delta(value, prev_value, width);
                    let rendered = match spec.kind {
                        CounterKind::Rate {
                            scale, precision, ..
                        } => {
                            if !interval_ok {
                                continue;
                            }
                            rate_value(d, scale, cycle.interval_secs, precision)
                        }
                        _ => SampleValue::Unsigned(d),
                    };
                    let zero = d == 0;
                    let render = !zero || full || !*bit;
                    *bit = zero;
                    if !render {
                        continue;
                    }
                    rendered
                }
            };

            emission.push(Sample {
                series: self.counter_series(spec, sample, cycle.current, i),
                value: rendered,
                timestamp_ms: cycle.timestamp_ms,
                kind: SampleKind::Counter,
            });
        }

        let descriptor = schema.descriptor().map(|d| {
            let labels = schema
                .entity_labels()
                .iter()
                .zip(&sample.labels)
                .chain(d.labels.iter().zip(&sample.descriptor))
                .map(|(name, value)| (name.as_str(), value.as_str()));
            self.renderer.series(&d.metric, labels)
        });
        let changed = old_descriptor != descriptor;
        if let Some(old) = old_descriptor.filter(|_| changed) {
            emission.add_potential(1);
            emission.push(self.withdrawal(old, cycle.timestamp_ms));
        }
        if let Some(series) = descriptor.as_ref().filter(|_| full || changed) {
            emission.push(Sample {
                series: series.clone(),
                value: SampleValue::Unsigned(1),
                timestamp_ms: cycle.timestamp_ms,
                kind: SampleKind::Descriptor,
            });
        }
        state.descriptor = descriptor;
        state.advance(self.full_metrics_period);
        if self.stagger_full_cycles && class == Class::New && self.full_metrics_period > 1 {
            let period = u64::from(self.full_metrics_period);
            state.cycle_num = ((state.rank + 1) % period) as u32;
        }
        cache.put(key.clone(), state);
    }

    fn counter_series<K: Hash + Eq + Clone>(
        &self,
        spec: &CounterSpec,
        sample: &EntitySample,
        current: &CounterSnapshot<K>,
        index: usize,
    ) -> String {
        let labels = self
            .schema
            .entity_labels()
            .iter()
            .zip(&sample.labels)
            .map(|(name, value)| (name.as_str(), value.as_str()));
        match self.schema.unit_label() {
            Some(unit_label) => {
                let unit = current
                    .unit_at(index)
                    .map_or_else(|| index.to_string(), |u| u.to_string());
                self.renderer
                    .series(&spec.metric, labels.chain([(unit_label, unit.as_str())]))
            }
            None => self.renderer.series(&spec.metric, labels),
        }
    }

    fn retire_counters<K: Hash + Eq + Clone>(
        &self,
        sample: &EntitySample,
        snapshot: &CounterSnapshot<K>,
        indexes: impl Iterator<Item = usize>,
        emission: &mut Emission,
    ) {
        for i in indexes {
            match self.schema.counter_at(i) {
                Some(spec) if spec.kind != CounterKind::Constant => {
                    emission.retire(self.counter_series(spec, sample, snapshot, i));
                }
                _ => {}
            }
        }
    }

    fn withdrawal(&self, series: String, timestamp_ms: u64) -> Sample {
        Sample {
            series,
            value: SampleValue::Unsigned(0),
            timestamp_ms,
            kind: SampleKind::Withdrawal,
        }
    }
}
