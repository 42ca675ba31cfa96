//! Declarative description of a metrics family.
//!
//! A [`FamilySchema`] tells the engine how to interpret the positional value
//! vector of every entity in a family: which metric each index maps to, how
//! the raw value turns into a sample ([`CounterKind`]), which labels identify
//! the entity, and which descriptor (info) metric asserts its presence.
//!
//! Counter kinds are resolved once, when the schema is built; the engine never
//! guesses the meaning of a value from its magnitude.
//!
//! # Layouts
//!
//! | Layout | Value vector | Example |
//! |--------|--------------|---------|
//! | Fixed | one declared counter per index | `/proc/net/dev` rx/tx fields |
//! | Positional | one counter per unit (CPU, queue), same kind for all | `/proc/interrupts` per-CPU counts |
//!
//! # Examples
//!
//! ```rust
//! use variazioni::delta::CounterWidth;
//! use variazioni::schema::{CounterKind, FamilySchema};
//!
//! let schema = FamilySchema::new("proc_net_dev")
//!     .with_entity_label("dev")
//!     .with_counter("proc_net_dev_rx_kbps", CounterKind::rate(CounterWidth::W64, 8. / 1000., 1))
//!     .with_counter("proc_net_dev_rx_pkts_delta", CounterKind::delta(CounterWidth::W64))
//!     .with_descriptor("proc_net_dev_present", Vec::<String>::new());
//!
//! assert!(schema.validate().is_ok());
//! ```

use crate::delta::CounterWidth;
use crate::error::{EngineError, Result};
use crate::render::{HOSTNAME_LABEL_NAME, INSTANCE_LABEL_NAME};
use std::collections::HashSet;

/// How a raw value at a given index becomes a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum CounterKind {
    /// Cumulative wrapping counter, exported as its change since the last
    /// observation.
    Delta {
        /// Wrap width of the raw counter.
        width: CounterWidth,
    },
    /// Cumulative wrapping counter, exported as `delta * scale / interval_secs`
    /// with a fixed number of decimals.
    Rate {
        /// Wrap width of the raw counter.
        width: CounterWidth,
        /// Multiplier applied to the per-second delta (e.g. `8/1000` for kbps).
        scale: f64,
        /// Number of decimals of the rendered value.
        precision: u8,
    },
    /// Non-wrapping instantaneous value, exported as is when it changes.
    Gauge,
    /// Descriptive field: never exported, but part of the entity identity.
    Constant,
}

impl CounterKind {
    /// Shorthand for [`CounterKind::Delta`].
    pub const fn delta(width: CounterWidth) -> Self {
        CounterKind::Delta { width }
    }

    /// Shorthand for [`CounterKind::Rate`].
    pub const fn rate(width: CounterWidth, scale: f64, precision: u8) -> Self {
        CounterKind::Rate {
            width,
            scale,
            precision,
        }
    }

    /// Returns the wrap width for delta-kind counters, `None` otherwise.
    pub fn width(&self) -> Option<CounterWidth> {
        match self {
            CounterKind::Delta { width } | CounterKind::Rate { width, .. } => Some(*width),
            CounterKind::Gauge | CounterKind::Constant => None,
        }
    }

    /// Returns `true` for counters exported as a difference between
    /// observations.
    pub fn is_delta_kind(&self) -> bool {
        self.width().is_some()
    }
}

/// A metric bound to one index of the value vector.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CounterSpec {
    /// Exported metric name. Unused for [`CounterKind::Constant`].
    pub metric: String,
    /// How the raw value is exported.
    pub kind: CounterKind,
}

/// The info pseudo-metric asserting an entity's presence and attributes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DescriptorSpec {
    /// Exported metric name, e.g. `proc_interrupts_info`.
    pub metric: String,
    /// Descriptor label names, after the entity labels.
    pub labels: Vec<String>,
}

/// What happens to the deltas of an entity whose identity drifted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DriftPolicy {
    /// The drifted entity starts over: no delta is computed this cycle.
    #[default]
    ResetDeltas,
    /// Only the descriptor is replaced; deltas continue against the previous
    /// sample (a renamed device is still the same device).
    KeepDeltas,
}

/// What happens to positional counters when the unit ordering changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PositionalPolicy {
    /// Every index is discontinuous for one cycle: no deltas, full emission.
    #[default]
    Discontinue,
    /// Current indexes are mapped to previous ones through the unit lists;
    /// units absent from the previous ordering get no delta.
    Realign,
}

/// Declarative description of one metrics family.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FamilySchema {
    id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    entity_labels: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    counters: Vec<CounterSpec>,
    #[cfg_attr(feature = "serde", serde(default))]
    unit_label: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    descriptor: Option<DescriptorSpec>,
    #[cfg_attr(feature = "serde", serde(default))]
    interval_metric: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    drift_policy: DriftPolicy,
    #[cfg_attr(feature = "serde", serde(default))]
    positional_policy: PositionalPolicy,
}

impl FamilySchema {
    /// Creates an empty fixed-layout schema.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_labels: Vec::new(),
            counters: Vec::new(),
            unit_label: None,
            descriptor: None,
            interval_metric: None,
            drift_policy: DriftPolicy::default(),
            positional_policy: PositionalPolicy::default(),
        }
    }

    /// Creates a positional schema: every value of an entity is one unit
    /// (labelled `unit_label`) of the same metric.
    pub fn positional(
        id: impl Into<String>,
        metric: impl Into<String>,
        kind: CounterKind,
        unit_label: impl Into<String>,
    ) -> Self {
        Self::new(id)
            .with_counter(metric, kind)
            .with_unit_label(unit_label)
    }

    /// Appends an entity label name. Order of calls is the label order.
    pub fn with_entity_label(mut self, name: impl Into<String>) -> Self {
        self.entity_labels.push(name.into());
        self
    }

    /// Appends a counter; its index is the number of counters declared before.
    pub fn with_counter(mut self, metric: impl Into<String>, kind: CounterKind) -> Self {
        self.counters.push(CounterSpec {
            metric: metric.into(),
            kind,
        });
        self
    }

    /// Makes the layout positional, labelling each value with its unit id.
    pub fn with_unit_label(mut self, name: impl Into<String>) -> Self {
        self.unit_label = Some(name.into());
        self
    }

    /// Declares the descriptor (info) metric.
    pub fn with_descriptor<I, S>(mut self, metric: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor = Some(DescriptorSpec {
            metric: metric.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Declares the metric carrying the actual interval behind the deltas.
    pub fn with_interval_metric(mut self, metric: impl Into<String>) -> Self {
        self.interval_metric = Some(metric.into());
        self
    }

    /// Sets the drift policy.
    pub fn with_drift_policy(mut self, policy: DriftPolicy) -> Self {
        self.drift_policy = policy;
        self
    }

    /// Sets the positional policy.
    pub fn with_positional_policy(mut self, policy: PositionalPolicy) -> Self {
        self.positional_policy = policy;
        self
    }

    /// Family id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Entity label names, in rendering order.
    pub fn entity_labels(&self) -> &[String] {
        &self.entity_labels
    }

    /// Declared counters.
    pub fn counters(&self) -> &[CounterSpec] {
        &self.counters
    }

    /// Unit label name for positional layouts.
    pub fn unit_label(&self) -> Option<&str> {
        self.unit_label.as_deref()
    }

    /// Returns `true` for positional layouts.
    pub fn is_positional(&self) -> bool {
        self.unit_label.is_some()
    }

    /// The descriptor metric, if any.
    pub fn descriptor(&self) -> Option<&DescriptorSpec> {
        self.descriptor.as_ref()
    }

    /// The interval metric name, if any.
    pub fn interval_metric(&self) -> Option<&str> {
        self.interval_metric.as_deref()
    }

    /// The drift policy.
    pub fn drift_policy(&self) -> DriftPolicy {
        self.drift_policy
    }

    /// The positional policy.
    pub fn positional_policy(&self) -> PositionalPolicy {
        self.positional_policy
    }

    /// Returns the counter governing value index `index`.
    pub fn counter_at(&self, index: usize) -> Option<&CounterSpec> {
        if self.is_positional() {
            self.counters.first()
        } else {
            self.counters.get(index)
        }
    }

    /// Number of counter slots for an entity holding `values` raw values.
    pub fn slots(&self, values: usize) -> usize {
        if self.is_positional() {
            values
        } else {
            self.counters.len()
        }
    }

    /// Expected wrap width per slot, used to detect width changes against
    /// cached state.
    pub(crate) fn widths(&self, slots: usize) -> Vec<Option<crate::delta::CounterWidth>> {
        (0..slots)
            .map(|i| self.counter_at(i).and_then(|c| c.kind.width()))
            .collect()
    }

    /// Number of samples an entity can produce in one cycle, descriptor
    /// included.
    pub(crate) fn potential_samples(&self, values: usize) -> usize {
        let counters = (0..self.slots(values))
            .filter(|&i| {
                self.counter_at(i)
                    .map(|c| c.kind != CounterKind::Constant)
                    .unwrap_or(false)
            })
            .count();
        counters + usize::from(self.descriptor.is_some())
    }

    /// Checks the schema for structural mistakes.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| EngineError::InvalidSchema {
            family: self.id.clone(),
            reason,
        };

        if self.id.is_empty() {
            return Err(invalid("empty family id".to_string()));
        }
        if self.counters.is_empty() && self.descriptor.is_none() {
            return Err(invalid("no counters and no descriptor".to_string()));
        }
        if self.is_positional() {
            if self.counters.len() != 1 {
                return Err(invalid(format!(
                    "positional layout needs exactly one counter, got {}",
                    self.counters.len()
                )));
            }
            if self.counters[0].kind == CounterKind::Constant {
                return Err(invalid("positional counter cannot be constant".to_string()));
            }
        }

        for counter in &self.counters {
            if counter.kind != CounterKind::Constant && counter.metric.is_empty() {
                return Err(invalid("empty metric name".to_string()));
            }
            if let CounterKind::Rate {
                scale, precision, ..
            } = counter.kind
            {
                if !scale.is_finite() {
                    return Err(invalid(format!("non-finite scale for `{}`", counter.metric)));
                }
                if precision > 9 {
                    return Err(invalid(format!(
                        "precision {} too large for `{}`",
                        precision, counter.metric
                    )));
                }
            }
        }

        let mut seen: HashSet<&str> = [INSTANCE_LABEL_NAME, HOSTNAME_LABEL_NAME]
            .into_iter()
            .collect();
        // Descriptor and unit labels live on different series, but sharing a
        // name with an entity label would still be ambiguous.
        let extra = self
            .descriptor
            .iter()
            .flat_map(|d| d.labels.iter())
            .chain(self.unit_label.iter());
        for label in self.entity_labels.iter().chain(extra) {
            if label.is_empty() {
                return Err(invalid("empty label name".to_string()));
            }
            if !seen.insert(label.as_str()) {
                return Err(invalid(format!("duplicate label `{}`", label)));
            }
        }

        if let Some(descriptor) = &self.descriptor {
            if descriptor.metric.is_empty() {
                return Err(invalid("empty descriptor metric name".to_string()));
            }
        }
        if let Some(interval) = &self.interval_metric {
            if interval.is_empty() {
                return Err(invalid("empty interval metric name".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net_dev() -> FamilySchema {
        FamilySchema::new("net_dev")
            .with_entity_label("dev")
            .with_counter("rx_kbps", CounterKind::rate(CounterWidth::W64, 0.008, 1))
            .with_counter("rx_pkts_delta", CounterKind::delta(CounterWidth::W64))
            .with_counter("qlen", CounterKind::Gauge)
            .with_counter("", CounterKind::Constant)
            .with_descriptor("net_dev_present", Vec::<String>::new())
    }

    #[test]
    fn test_valid_fixed_schema() {
        let schema = net_dev();
        assert!(schema.validate().is_ok());
        assert!(!schema.is_positional());
        assert_eq!(schema.slots(10), 4);
        assert_eq!(schema.potential_samples(4), 4);
    }

    #[test]
    fn test_counter_kind_width() {
        assert_eq!(
            CounterKind::delta(CounterWidth::W32).width(),
            Some(CounterWidth::W32)
        );
        assert!(CounterKind::rate(CounterWidth::W64, 1.0, 2).is_delta_kind());
        assert!(!CounterKind::Gauge.is_delta_kind());
        assert_eq!(CounterKind::Constant.width(), None);
    }

    #[test]
    fn test_positional_schema() {
        let schema = FamilySchema::positional(
            "irq",
            "proc_interrupts_delta",
            CounterKind::delta(CounterWidth::W64),
            "cpu",
        )
        .with_entity_label("irq");
        assert!(schema.validate().is_ok());
        assert!(schema.is_positional());
        assert_eq!(schema.slots(8), 8);
        assert_eq!(schema.counter_at(5).map(|c| c.metric.as_str()), Some("proc_interrupts_delta"));
        assert_eq!(schema.widths(2), vec![Some(CounterWidth::W64); 2]);
    }

    #[test]
    fn test_rejects_empty_family() {
        let err = FamilySchema::new("empty").validate().unwrap_err();
        assert!(err.to_string().contains("no counters"));
    }

    #[test]
    fn test_rejects_reserved_label() {
        let schema = net_dev().with_entity_label("instance");
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_descriptor_label() {
        let schema = FamilySchema::new("disk")
            .with_entity_label("name")
            .with_descriptor("disk_info", ["name"]);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_rejects_positional_with_two_counters() {
        let schema = FamilySchema::positional("irq", "a", CounterKind::Gauge, "cpu")
            .with_counter("b", CounterKind::Gauge);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_rejects_large_precision() {
        let schema = FamilySchema::new("x")
            .with_counter("r", CounterKind::rate(CounterWidth::W32, 1.0, 12));
        assert!(schema.validate().is_err());
    }
}
