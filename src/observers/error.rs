//! Unified error type for all observers.
//!
//! Every observer reports failures through [`ObserverError`], so a driver can
//! switch between JSON, table and Prometheus output without changing its error
//! handling.

use thiserror::Error;

/// Unified error type for all observer operations.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// Error from the JSON observer.
    #[cfg(feature = "json")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from the Prometheus bridge.
    #[cfg(feature = "prometheus")]
    #[error("prometheus error: {0}")]
    Prometheus(#[from] PrometheusError),

    /// Error encoding to UTF-8.
    #[error("utf8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A sample that cannot be mirrored, e.g. a metric seen with two label
    /// schemas.
    #[error("metric error: {0}")]
    Metric(String),
}

/// Result type for observer operations.
pub type Result<T> = std::result::Result<T, ObserverError>;

/// Error type specific to the Prometheus bridge.
#[cfg(feature = "prometheus")]
#[derive(Debug, Error)]
pub enum PrometheusError {
    /// Error creating or registering a gauge vector.
    #[error("metric error: {0}")]
    MetricError(String),

    /// Error encoding the registry to text format.
    #[error("encode error: {0}")]
    EncodeError(String),
}

#[cfg(feature = "prometheus")]
impl From<prometheus::Error> for PrometheusError {
    fn from(err: prometheus::Error) -> Self {
        PrometheusError::MetricError(err.to_string())
    }
}

#[cfg(feature = "prometheus")]
impl From<prometheus::Error> for ObserverError {
    fn from(err: prometheus::Error) -> Self {
        ObserverError::Prometheus(PrometheusError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_error_display() {
        let err = ObserverError::Metric("label mismatch".to_string());
        assert_eq!(err.to_string(), "metric error: label mismatch");
    }

    #[cfg(feature = "prometheus")]
    #[test]
    fn test_from_prometheus_error() {
        let err: ObserverError = prometheus::Error::Msg("boom".to_string()).into();
        assert!(err.to_string().contains("boom"));
    }
}
