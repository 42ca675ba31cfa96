//! Engine configuration.
//!
//! [`EngineConfig`] carries the settings shared by every family of an
//! exporter: the `instance` and `hostname` label values, the full-metrics
//! period (optionally staggered) and the number of key-space partitions. With the `json` feature it
//! can be loaded from a JSON document; missing fields take their defaults.
//!
//! ```rust
//! use variazioni::config::EngineConfig;
//!
//! let config = EngineConfig::default()
//!     .with_instance("lsvmi")
//!     .with_hostname("node1")
//!     .with_full_metrics_factor(10);
//! assert_eq!(config.partitions, 1);
//! ```

use crate::emission::{Engine, DEFAULT_FULL_METRICS_FACTOR};
use crate::error::Result;
use crate::partition::PartitionedEngine;
use crate::schema::FamilySchema;

/// Default `instance` label value.
pub const DEFAULT_INSTANCE: &str = "lsvmi";

/// Settings shared by the engines of an exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Value of the `instance` label.
    pub instance: String,
    /// Value of the `hostname` label.
    pub hostname: String,
    /// Number of cycles between two full emissions.
    pub full_metrics_factor: u32,
    /// Offset the full cycles of new entities by their first-seen rank.
    pub stagger_full_cycles: bool,
    /// Number of key-space partitions for partitioned engines.
    pub partitions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instance: DEFAULT_INSTANCE.to_string(),
            hostname: String::new(),
            full_metrics_factor: DEFAULT_FULL_METRICS_FACTOR,
            stagger_full_cycles: false,
            partitions: 1,
        }
    }
}

impl EngineConfig {
    /// Sets the `instance` label value.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    /// Sets the `hostname` label value.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Sets the full-metrics period.
    pub fn with_full_metrics_factor(mut self, factor: u32) -> Self {
        self.full_metrics_factor = factor;
        self
    }

    /// Enables staggered full cycles.
    pub fn with_stagger_full_cycles(mut self, stagger: bool) -> Self {
        self.stagger_full_cycles = stagger;
        self
    }

    /// Sets the number of partitions.
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    /// Parses a configuration from JSON.
    #[cfg(feature = "json")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds an engine for `schema` with these settings.
    pub fn engine(&self, schema: FamilySchema) -> Result<Engine> {
        Ok(Engine::new(schema)?
            .with_instance(self.instance.as_str())
            .with_hostname(self.hostname.as_str())
            .with_full_metrics_period(self.full_metrics_factor)
            .with_staggered_full_cycles(self.stagger_full_cycles))
    }

    /// Builds a partitioned engine for `schema` with these settings.
    pub fn partitioned_engine(&self, schema: FamilySchema) -> Result<PartitionedEngine> {
        PartitionedEngine::new(self.engine(schema)?, self.partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::CounterWidth;
    use crate::error::EngineError;
    use crate::schema::CounterKind;

    fn schema() -> FamilySchema {
        FamilySchema::new("irq")
            .with_entity_label("irq")
            .with_counter("irq_delta", CounterKind::delta(CounterWidth::W64))
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.instance, "lsvmi");
        assert_eq!(config.full_metrics_factor, 15);
        assert_eq!(config.partitions, 1);
        assert!(!config.stagger_full_cycles);
    }

    #[test]
    fn test_engine_from_config() {
        let engine = EngineConfig::default()
            .with_hostname("node1")
            .with_full_metrics_factor(4)
            .with_stagger_full_cycles(true)
            .engine(schema())
            .unwrap();
        assert_eq!(engine.full_metrics_period(), 4);
        assert!(engine.staggered_full_cycles());
        assert_eq!(engine.renderer().hostname(), "node1");
        assert_eq!(engine.renderer().instance(), "lsvmi");
    }

    #[test]
    fn test_partitioned_engine_from_config() {
        let engine = EngineConfig::default()
            .with_partitions(3)
            .partitioned_engine(schema())
            .unwrap();
        assert_eq!(engine.partitions(), 3);

        let err = EngineConfig::default()
            .with_partitions(0)
            .partitioned_engine(schema())
            .unwrap_err();
        assert!(matches!(err, EngineError::NoPartitions));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_from_json_str() {
        let config =
            EngineConfig::from_json_str(r#"{"hostname": "node7", "partitions": 2, "stagger_full_cycles": true}"#)
                .unwrap();
        assert_eq!(config.hostname, "node7");
        assert!(config.stagger_full_cycles);
        assert_eq!(config.partitions, 2);
        assert_eq!(config.full_metrics_factor, 15);

        assert!(EngineConfig::from_json_str("{").is_err());
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_schema_from_json() {
        let schema: FamilySchema = serde_json::from_str(
            r#"{
                "id": "proc_net_dev",
                "entity_labels": ["dev"],
                "counters": [
                    {"metric": "rx_kbps", "kind": {"kind": "rate", "width": "w64", "scale": 0.008, "precision": 1}},
                    {"metric": "rx_pkts_delta", "kind": {"kind": "delta", "width": "w32"}},
                    {"metric": "", "kind": {"kind": "constant"}}
                ],
                "drift_policy": "keep_deltas"
            }"#,
        )
        .unwrap();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.counters().len(), 3);
        assert_eq!(schema.counters()[1].kind, CounterKind::delta(CounterWidth::W32));
        assert_eq!(schema.drift_policy(), crate::schema::DriftPolicy::KeepDeltas);
    }
}
