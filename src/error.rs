//! Error taxonomy for the risk scoring engine.
//!
//! Validation and not-found errors are caller-caused; `Unavailable` covers
//! transient infrastructure (KV reachability, model I/O) and is not retried
//! here. A degraded model is *not* an error — the scorer falls back to the
//! deterministic amount-bucket score instead.

use thiserror::Error;

/// Errors surfaced by the scoring and feedback entry points.
#[derive(Error, Debug)]
pub enum RiskError {
    /// Missing or malformed request fields. No state has been mutated.
    #[error("invalid transaction fields: {}", fields.join(", "))]
    Validation { fields: Vec<String> },

    /// Feedback referenced a transaction the sink does not know.
    #[error("transaction not found: {0}")]
    NotFound(String),

    /// KV store or model persistence failed on a required operation.
    /// Callers may retry; the engine does not.
    #[error("backing store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),

    /// The caller-supplied deadline expired before scoring finished.
    /// Window writes already submitted are left to expire by TTL.
    #[error("scoring deadline exceeded")]
    DeadlineExceeded,
}

impl RiskError {
    /// Validation error over a list of offending field names.
    pub fn validation<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RiskError::Validation {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

pub type RiskResult<T> = Result<T, RiskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_fields() {
        let err = RiskError::validation(["amount", "currency"]);
        assert_eq!(err.to_string(), "invalid transaction fields: amount, currency");
    }

    #[test]
    fn not_found_carries_id() {
        let err = RiskError::NotFound("tx_42".to_string());
        assert!(err.to_string().contains("tx_42"));
    }
}
