//! Connector-level error type.

use thiserror::Error;

/// Errors returned by a connector's `execute` method.
///
/// The engine uses the variant to decide how the failure is accounted:
/// - `InvalidConfig` is a configuration error: terminal, never counted
///   against the dependency's circuit breaker.
/// - `Cancelled` is not the dependency's fault and is not counted either.
/// - everything else is a dependency error and is counted by the breaker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// The action configuration is missing a field or has the wrong shape.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The external service rejected or failed the request.
    #[error("request failed: {0}")]
    Request(String),

    /// The external service did not answer in time.
    #[error("request timed out")]
    Timeout,

    /// The execution was cancelled before the connector finished.
    #[error("cancelled")]
    Cancelled,
}

impl ConnectorError {
    /// Whether this failure says something about the health of the
    /// external dependency.
    pub fn is_dependency_failure(&self) -> bool {
        !matches!(self, Self::InvalidConfig(_) | Self::Cancelled)
    }
}
