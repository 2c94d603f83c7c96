/// Domain-specific error types for the analytics engine.
/// Every failure is local to the request that raised it:
/// - bad parameters are rejected before any computation starts
/// - missing market data is propagated as-is, never retried here
/// - degenerate numerics (T or sigma at epsilon) are NOT errors, see models::black_scholes
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(e: tokio::task::JoinError) -> Self {
        EngineError::Internal(format!("worker task failed: {e}"))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Reject NaN/inf before they poison a whole grid.
#[inline]
pub fn ensure_finite(name: &str, value: f64) -> EngineResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::InvalidInput(format!("{name} must be finite, got {value}")))
    }
}

/// Reject zero, negative and non-finite values.
#[inline]
pub fn ensure_positive(name: &str, value: f64) -> EngineResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(EngineError::InvalidInput(format!("{name} must be > 0, got {value}")))
    }
}
