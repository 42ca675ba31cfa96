//! Error type for engine construction and invocation.
//!
//! Only structural faults surface as errors: an invalid family schema, an
//! entity sample whose shape contradicts the schema, or a failed partition
//! worker. Data conditions scoped to one entity (missing previous values,
//! width changes, corrupted suppression state, a non-monotonic clock) are
//! recovered inside the engine and never abort a cycle.

use thiserror::Error;

/// Unified error type for the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The family schema failed validation.
    #[error("invalid schema for family `{family}`: {reason}")]
    InvalidSchema {
        /// The family id.
        family: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An entity sample carries a number of label values different from
    /// the number of entity labels declared by the schema.
    #[error("family `{family}`: expected {expected} entity label values, got {got}")]
    LabelArity {
        /// The family id.
        family: String,
        /// Declared entity labels.
        expected: usize,
        /// Supplied label values.
        got: usize,
    },

    /// An entity sample carries a number of descriptor values different from
    /// the number of descriptor labels declared by the schema.
    #[error("family `{family}`: expected {expected} descriptor values, got {got}")]
    DescriptorArity {
        /// The family id.
        family: String,
        /// Declared descriptor labels.
        expected: usize,
        /// Supplied descriptor values.
        got: usize,
    },

    /// A partitioned engine was configured without partitions.
    #[error("partition count must be at least 1")]
    NoPartitions,

    /// The number of suppression caches does not match the partition count.
    #[error("expected {expected} partition caches, got {got}")]
    PartitionCaches {
        /// Configured partitions.
        expected: usize,
        /// Supplied caches.
        got: usize,
    },

    /// A partition worker panicked.
    #[error("partition worker panicked")]
    WorkerPanicked,

    /// Error (de)serializing configuration or suppression state.
    #[cfg(feature = "json")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::InvalidSchema {
            family: "net_dev".to_string(),
            reason: "no counters".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid schema for family `net_dev`: no counters"
        );

        let err = EngineError::LabelArity {
            family: "irq".to_string(),
            expected: 2,
            got: 1,
        };
        assert_eq!(
            err.to_string(),
            "family `irq`: expected 2 entity label values, got 1"
        );
    }
}
