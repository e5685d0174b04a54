//! Broker transport error types.
//!
//! An empty read is not an error at this layer; it surfaces as an empty
//! message list so callers can distinguish "nothing to do" from
//! infrastructure failure.

/// Errors produced by [`StreamBroker`](crate::StreamBroker) operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The broker is unreachable or refused the operation; retryable.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// Payload could not be serialized or deserialized.
    #[error("broker payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("broker state lock poisoned")]
    LockPoisoned,
}

impl BrokerError {
    /// Returns `true` when retrying the same operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_retryable() {
        assert!(BrokerError::Unavailable("connection refused".into()).is_retryable());
    }

    #[test]
    fn serialization_is_not_retryable() {
        let err: BrokerError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(!err.is_retryable());
    }
}
