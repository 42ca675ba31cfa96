//! JSON observer for emissions and generator statistics.
//!
//! [`JsonObserver`] serializes the samples of an [`Emission`] (and optionally
//! its counts) or a set of [`FamilyStatsSnapshot`]s using serde.
//!
//! # Feature Flag
//!
//! This module requires the `json` feature:
//!
//! ```toml
//! [dependencies]
//! variazioni = { version = "0.1", features = ["json"] }
//! ```
//!
//! # Examples
//!
//! ```rust
//! use variazioni::cache::SuppressionCache;
//! use variazioni::emission::{Cycle, Engine};
//! use variazioni::observers::json::JsonObserver;
//! use variazioni::schema::{CounterKind, FamilySchema};
//! use variazioni::snapshot::{CounterSnapshot, EntitySample};
//!
//! let schema = FamilySchema::new("pool")
//!     .with_entity_label("name")
//!     .with_counter("pool_size", CounterKind::Gauge);
//! let engine = Engine::new(schema).unwrap();
//! let mut snap = CounterSnapshot::new();
//! snap.insert("buf", EntitySample::new(["buf"], [64]));
//!
//! let emission = engine.generate(&Cycle::new(&snap, 1000), &mut SuppressionCache::new()).unwrap();
//! let json = JsonObserver::new().to_json(&emission).unwrap();
//! assert!(json.contains("pool_size"));
//! ```

use super::Result;
use crate::emission::{Emission, EmissionStats};
use crate::render::Sample;
use crate::stats::FamilyStatsSnapshot;
use serde::Serialize;

/// An emission wrapped with its counts.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmissionReport<'a> {
    /// Rendered vs potential counts.
    pub stats: EmissionStats,
    /// The rendered samples.
    pub samples: &'a [Sample],
}

/// Configuration for the JSON observer.
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    /// Whether to pretty-print the JSON output.
    pub pretty: bool,
    /// Whether to wrap samples in an [`EmissionReport`] carrying the counts.
    pub wrap_in_report: bool,
}

/// An observer that serializes emissions to JSON.
#[derive(Debug, Clone, Default)]
pub struct JsonObserver {
    config: JsonConfig,
}

impl JsonObserver {
    /// Creates a new JSON observer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new JSON observer with the specified configuration.
    pub fn with_config(config: JsonConfig) -> Self {
        Self { config }
    }

    /// Enables or disables pretty-printing.
    pub fn pretty(mut self, enabled: bool) -> Self {
        self.config.pretty = enabled;
        self
    }

    /// Enables or disables wrapping the output in an [`EmissionReport`].
    pub fn wrap_in_report(mut self, enabled: bool) -> Self {
        self.config.wrap_in_report = enabled;
        self
    }

    /// Serializes an emission to a JSON string.
    pub fn to_json(&self, emission: &Emission) -> Result<String> {
        if self.config.wrap_in_report {
            self.encode(&EmissionReport {
                stats: emission.stats(),
                samples: emission.samples(),
            })
        } else {
            self.encode(emission.samples())
        }
    }

    /// Serializes generator statistics to a JSON string.
    pub fn stats_to_json(&self, stats: &[FamilyStatsSnapshot]) -> Result<String> {
        self.encode(stats)
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let json = if self.config.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SuppressionCache;
    use crate::delta::CounterWidth;
    use crate::emission::{Cycle, Engine};
    use crate::render::{SampleKind, SampleValue};
    use crate::schema::{CounterKind, FamilySchema};
    use crate::snapshot::{CounterSnapshot, EntitySample};

    fn emission() -> Emission {
        let schema = FamilySchema::new("net")
            .with_entity_label("dev")
            .with_counter("net_rx_delta", CounterKind::delta(CounterWidth::W64))
            .with_descriptor("net_info", Vec::<String>::new());
        let engine = Engine::new(schema).unwrap().with_instance("i").with_hostname("h");
        let mut snap = CounterSnapshot::new();
        snap.insert("eth0", EntitySample::new(["eth0"], [1]));
        engine
            .generate(&Cycle::new(&snap, 1000), &mut SuppressionCache::new())
            .unwrap()
    }

    #[test]
    fn test_to_json_empty() {
        let json = JsonObserver::new().to_json(&Emission::default()).unwrap();
        assert_eq!(json, "[]");
    }

    #[test]
    fn test_to_json_samples() {
        let json = JsonObserver::new().to_json(&emission()).unwrap();
        assert!(json.contains(r#""kind":"descriptor""#));
        assert!(json.contains(r#""timestamp_ms":1000"#));
        assert!(json.contains(r#""value":1"#));
    }

    #[test]
    fn test_to_json_report() {
        let json = JsonObserver::new()
            .wrap_in_report(true)
            .to_json(&emission())
            .unwrap();
        assert!(json.contains(r#""stats":{"actual":1,"total":2}"#));
    }

    #[test]
    fn test_to_json_pretty() {
        let json = JsonObserver::new().pretty(true).to_json(&emission()).unwrap();
        assert!(json.contains('\n'));
    }

    #[test]
    fn test_sample_roundtrip() {
        let sample = Sample {
            series: "m{instance=\"i\"}".to_string(),
            value: SampleValue::Float {
                value: 1.5,
                precision: 1,
            },
            timestamp_ms: 7,
            kind: SampleKind::Counter,
        };
        let json = serde_json::to_string(&sample).unwrap();
        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn test_stats_to_json() {
        let stats = vec![FamilyStatsSnapshot {
            family: "net".to_string(),
            invocations: 2,
            actual: 3,
            total: 4,
            bytes: 5,
        }];
        let json = JsonObserver::new().stats_to_json(&stats).unwrap();
        assert_eq!(
            json,
            r#"[{"family":"net","invocations":2,"actual":3,"total":4,"bytes":5}]"#
        );
    }
}
