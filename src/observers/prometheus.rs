//! Prometheus bridge mirroring emissions into a `prometheus` registry.
//!
//! The engine pushes samples; a Prometheus server pulls them. The
//! [`PrometheusBridge`] reconciles the two: every sample of an [`Emission`]
//! sets the value of a labelled gauge in a [`Registry`](prometheus::Registry).
//! A descriptor withdrawal removes its label set, and the counter series
//! listed in [`Emission::retired`] are removed as well, so a vanished entity
//! stops being exposed as a whole. Suppressed samples keep their last value, which is exactly what a
//! scraper should see for a counter that did not change.
//!
//! # Feature Flag
//!
//! This module requires the `prometheus` feature:
//!
//! ```toml
//! [dependencies]
//! variazioni = { version = "0.1", features = ["prometheus"] }
//! ```
//!
//! # Examples
//!
//! ```rust
//! use variazioni::cache::SuppressionCache;
//! use variazioni::emission::{Cycle, Engine};
//! use variazioni::observers::prometheus::PrometheusBridge;
//! use variazioni::schema::{CounterKind, FamilySchema};
//! use variazioni::snapshot::{CounterSnapshot, EntitySample};
//!
//! let schema = FamilySchema::new("pool")
//!     .with_entity_label("name")
//!     .with_counter("pool_free", CounterKind::Gauge);
//! let engine = Engine::new(schema).unwrap().with_instance("lsvmi").with_hostname("node1");
//! let mut snap = CounterSnapshot::new();
//! snap.insert("buf", EntitySample::new(["buf"], [17]));
//! let emission = engine.generate(&Cycle::new(&snap, 0), &mut SuppressionCache::new()).unwrap();
//!
//! let mut bridge = PrometheusBridge::new().with_help("pool_free", "Free buffers");
//! bridge.observe(&emission).unwrap();
//! let text = bridge.render().unwrap();
//! assert!(text.contains("# HELP pool_free Free buffers"));
//! assert!(text.contains(r#"pool_free{hostname="node1",instance="lsvmi",name="buf"} 17"#));
//! ```

use super::{ObserverError, PrometheusError, Result};
use crate::emission::Emission;
use crate::render::{series_labels, series_name, Sample, SampleKind};
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use tracing::debug;

struct MirroredGauge {
    gauge: GaugeVec,
    label_names: Vec<String>,
}

/// Mirrors emitted samples into gauge vectors of a Prometheus registry.
pub struct PrometheusBridge {
    registry: Registry,
    namespace: Option<String>,
    help: HashMap<String, String>,
    gauges: HashMap<String, MirroredGauge>,
}

impl Default for PrometheusBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PrometheusBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusBridge")
            .field("namespace", &self.namespace)
            .field("metrics", &self.gauges.len())
            .finish()
    }
}

impl PrometheusBridge {
    /// Creates a bridge with a fresh registry.
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    /// Creates a bridge over an existing registry.
    ///
    /// Useful to expose the mirrored samples next to other metrics of the
    /// process.
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            namespace: None,
            help: HashMap::new(),
            gauges: HashMap::new(),
        }
    }

    /// Returns a reference to the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Sets the namespace (prefix) for all metrics.
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Sets the help text of a metric (by its emitted name).
    pub fn with_help(mut self, name: &str, help: &str) -> Self {
        self.help.insert(name.to_string(), help.to_string());
        self
    }

    /// Number of distinct metrics mirrored so far.
    pub fn metrics(&self) -> usize {
        self.gauges.len()
    }

    /// Sanitizes a metric name to be Prometheus-compatible.
    ///
    /// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
    fn sanitize_name(name: &str) -> String {
        let mut result: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == ':' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if result.is_empty() {
            result.push_str("unnamed");
        }
        if result.starts_with(|c: char| c.is_ascii_digit()) {
            result.insert(0, '_');
        }
        result
    }

    fn build_full_name(&self, name: &str) -> String {
        let sanitized = Self::sanitize_name(name);
        match &self.namespace {
            Some(ns) => format!("{}_{}", ns, sanitized),
            None => sanitized,
        }
    }

    /// Applies every sample of `emission` to the registry, after dropping
    /// its retired series.
    ///
    /// # Errors
    ///
    /// Fails if a gauge cannot be created or registered, or if a metric shows
    /// up with a label schema different from the one it was first seen with.
    pub fn observe(&mut self, emission: &Emission) -> Result<()> {
        for series in emission.retired() {
            self.remove(series_name(series), &series_labels(series));
        }
        for sample in emission.samples() {
            self.apply(sample)?;
        }
        Ok(())
    }

    fn apply(&mut self, sample: &Sample) -> Result<()> {
        let raw_name = sample.name();
        let labels = sample.labels();
        let names: Vec<String> = labels.iter().map(|(k, _)| k.clone()).collect();
        let values: Vec<&str> = labels.iter().map(|(_, v)| v.as_str()).collect();

        if sample.kind == SampleKind::Withdrawal {
            self.remove(raw_name, &labels);
            return Ok(());
        }

        if !self.gauges.contains_key(raw_name) {
            let full_name = self.build_full_name(raw_name);
            let help = self
                .help
                .get(raw_name)
                .cloned()
                .unwrap_or_else(|| format!("{} metric", raw_name));
            let label_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
            let gauge = GaugeVec::new(Opts::new(full_name, help), &label_refs)?;
            self.registry.register(Box::new(gauge.clone()))?;
            self.gauges.insert(
                raw_name.to_string(),
                MirroredGauge {
                    gauge,
                    label_names: names.clone(),
                },
            );
        }

        let mirrored = self
            .gauges
            .get(raw_name)
            .ok_or_else(|| ObserverError::Metric(format!("`{}` not registered", raw_name)))?;
        if mirrored.label_names != names {
            return Err(ObserverError::Metric(format!(
                "`{}` seen with labels {:?}, expected {:?}",
                raw_name, names, mirrored.label_names
            )));
        }
        mirrored
            .gauge
            .with_label_values(&values)
            .set(sample.value.as_f64());
        Ok(())
    }

    fn remove(&self, name: &str, labels: &[(String, String)]) {
        let Some(mirrored) = self.gauges.get(name) else {
            return;
        };
        let values: Vec<&str> = labels.iter().map(|(_, v)| v.as_str()).collect();
        // A series removed before ever being mirrored is not an error.
        if mirrored.gauge.remove_label_values(&values).is_err() {
            debug!(metric = name, "removed series was not mirrored");
        }
    }

    /// Encodes the registry to the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| PrometheusError::EncodeError(e.to_string()))?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Encodes the registry to bytes (useful for HTTP responses).
    pub fn render_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.render()?.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SuppressionCache;
    use crate::delta::CounterWidth;
    use crate::emission::{Cycle, Engine};
    use crate::render::SampleValue;
    use crate::schema::{CounterKind, FamilySchema};
    use crate::snapshot::{CounterSnapshot, EntitySample};

    fn engine() -> Engine {
        let schema = FamilySchema::new("net")
            .with_entity_label("dev")
            .with_counter("net_rx_delta", CounterKind::delta(CounterWidth::W64))
            .with_descriptor("net_info", ["driver"]);
        Engine::new(schema).unwrap().with_instance("i").with_hostname("h")
    }

    fn snap(devs: &[(&'static str, u64)]) -> CounterSnapshot<&'static str> {
        devs.iter()
            .map(|&(dev, v)| (dev, EntitySample::new([dev], [v]).with_descriptor(["virtio"])))
            .collect()
    }

    #[test]
    fn test_render_empty() {
        let bridge = PrometheusBridge::new();
        assert_eq!(bridge.render().unwrap(), "");
    }

    #[test]
    fn test_mirror_and_withdraw() {
        let engine = engine();
        let mut cache = SuppressionCache::new();
        let mut bridge = PrometheusBridge::new();

        let a = snap(&[("eth0", 10), ("eth1", 5)]);
        let b = snap(&[("eth0", 14)]);
        bridge
            .observe(&engine.generate(&Cycle::new(&a, 0), &mut cache).unwrap())
            .unwrap();
        let text = bridge.render().unwrap();
        assert!(text.contains(r#"net_info{dev="eth1",driver="virtio",hostname="h",instance="i"} 1"#));

        let cycle = Cycle::new(&b, 1).with_previous(&a).with_interval(1.0);
        bridge
            .observe(&engine.generate(&cycle, &mut cache).unwrap())
            .unwrap();
        let text = bridge.render().unwrap();
        assert!(text.contains(r#"net_rx_delta{dev="eth0",hostname="h",instance="i"} 4"#));
        assert!(text.contains(r#"net_info{dev="eth0",driver="virtio",hostname="h",instance="i"} 1"#));
        assert!(!text.contains(r#"dev="eth1""#));
        assert!(text.contains("# TYPE net_rx_delta gauge"));
        assert_eq!(bridge.metrics(), 2);
    }

    #[test]
    fn test_vanished_entity_counters_removed() {
        let engine = engine();
        let mut cache = SuppressionCache::new();
        let mut bridge = PrometheusBridge::new();

        let t0 = snap(&[("eth0", 10), ("eth1", 5)]);
        let t1 = snap(&[("eth0", 10), ("eth1", 9)]);
        let t2 = snap(&[("eth0", 10)]);
        bridge
            .observe(&engine.generate(&Cycle::new(&t0, 0), &mut cache).unwrap())
            .unwrap();
        let cycle = Cycle::new(&t1, 1).with_previous(&t0).with_interval(1.0);
        bridge
            .observe(&engine.generate(&cycle, &mut cache).unwrap())
            .unwrap();
        let text = bridge.render().unwrap();
        assert!(text.contains(r#"net_rx_delta{dev="eth1",hostname="h",instance="i"} 4"#));

        let cycle = Cycle::new(&t2, 2).with_previous(&t1).with_interval(1.0);
        let emission = engine.generate(&cycle, &mut cache).unwrap();
        assert_eq!(
            emission.retired(),
            &[r#"net_rx_delta{instance="i",hostname="h",dev="eth1"}"#.to_string()]
        );
        bridge.observe(&emission).unwrap();
        let text = bridge.render().unwrap();
        assert!(!text.contains(r#"dev="eth1""#));
        assert!(text.contains(r#"net_rx_delta{dev="eth0",hostname="h",instance="i"} 0"#));
    }

    #[test]
    fn test_renamed_entity_counters_removed() {
        let schema = FamilySchema::new("net")
            .with_entity_label("dev")
            .with_counter("net_rx_delta", CounterKind::delta(CounterWidth::W64))
            .with_drift_policy(crate::schema::DriftPolicy::KeepDeltas);
        let engine = Engine::new(schema).unwrap().with_instance("i").with_hostname("h");
        let mut cache = SuppressionCache::new();
        let mut bridge = PrometheusBridge::new();

        let t0: CounterSnapshot<u32> = [(2, EntitySample::new(["eth0"], [1]))].into_iter().collect();
        let t1: CounterSnapshot<u32> = [(2, EntitySample::new(["eth0"], [3]))].into_iter().collect();
        let t2: CounterSnapshot<u32> = [(2, EntitySample::new(["ens3"], [6]))].into_iter().collect();
        bridge
            .observe(&engine.generate(&Cycle::new(&t0, 0), &mut cache).unwrap())
            .unwrap();
        for (t, (curr, prev)) in [(&t1, &t0), (&t2, &t1)].into_iter().enumerate() {
            let cycle = Cycle::new(curr, t as u64 + 1).with_previous(prev).with_interval(1.0);
            bridge
                .observe(&engine.generate(&cycle, &mut cache).unwrap())
                .unwrap();
        }
        let text = bridge.render().unwrap();
        assert!(!text.contains(r#"dev="eth0""#));
        assert!(text.contains(r#"net_rx_delta{dev="ens3",hostname="h",instance="i"} 3"#));
    }

    #[test]
    fn test_withdraw_unknown_series() {
        let mut emission = Emission::default();
        emission.push(Sample {
            series: r#"gone{instance="i"}"#.to_string(),
            value: SampleValue::Unsigned(0),
            timestamp_ms: 0,
            kind: SampleKind::Withdrawal,
        });
        let mut bridge = PrometheusBridge::new();
        assert!(bridge.observe(&emission).is_ok());
        assert_eq!(bridge.metrics(), 0);
    }

    #[test]
    fn test_label_schema_mismatch() {
        let mut emission = Emission::default();
        for series in [r#"m{a="1"}"#, r#"m{b="1"}"#] {
            emission.push(Sample {
                series: series.to_string(),
                value: SampleValue::Unsigned(1),
                timestamp_ms: 0,
                kind: SampleKind::Counter,
            });
        }
        let mut bridge = PrometheusBridge::new();
        let err = bridge.observe(&emission).unwrap_err();
        assert!(matches!(err, ObserverError::Metric(_)));
    }

    #[test]
    fn test_namespace_and_float_values() {
        let mut emission = Emission::default();
        emission.push(Sample {
            series: r#"rate-kbps{instance="i"}"#.to_string(),
            value: SampleValue::Float {
                value: 2.5,
                precision: 1,
            },
            timestamp_ms: 0,
            kind: SampleKind::Counter,
        });
        let mut bridge = PrometheusBridge::new().with_namespace("lsvmi");
        bridge.observe(&emission).unwrap();
        let text = bridge.render().unwrap();
        assert!(text.contains(r#"lsvmi_rate_kbps{instance="i"} 2.5"#));
        assert!(!bridge.render_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(PrometheusBridge::sanitize_name("a.b-c"), "a_b_c");
        assert_eq!(PrometheusBridge::sanitize_name("9lives"), "_9lives");
        assert_eq!(PrometheusBridge::sanitize_name(""), "unnamed");
    }

    #[test]
    fn test_with_custom_registry() {
        let registry = Registry::new();
        let bridge = PrometheusBridge::with_registry(registry.clone());
        assert_eq!(bridge.registry().gather().len(), registry.gather().len());
    }
}
