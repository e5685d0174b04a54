//! Per-item error model shared across pipeline stages.
//!
//! [`OnboardingError`] is the closed taxonomy every stage converts its
//! failures into before they reach a caller. The kind discriminator is
//! matched exhaustively; there is no duck typing on message content.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error classification, matched exhaustively by callers.
#[derive(Debug, Clone, Copy, Error, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Schema or cross-reference failure; caller-fixable.
    #[error("validation")]
    Validation,
    /// Idempotency conflict: the entity or link already exists.
    #[error("already_exists")]
    AlreadyExists,
    /// Dangling reference to an entity that was never onboarded.
    #[error("not_found")]
    NotFound,
    /// Remote authoritative service unreachable or erroring.
    #[error("remote")]
    Remote,
    /// Local persistence failed after the remote write succeeded.
    #[error("storage")]
    Storage,
    /// Defensive fallback for unmodeled failures.
    #[error("internal")]
    Internal,
}

/// Opaque error code following SCREAMING_SNAKE_CASE convention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ErrorCode(pub String);

impl ErrorCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ErrorCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ErrorCode {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Typed per-item onboarding failure.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[error("[{kind}] {code}: {message}")]
pub struct OnboardingError {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
    /// Whether resubmitting the same item unchanged could succeed.
    pub retryable: bool,
    pub details: Option<serde_json::Value>,
}

impl OnboardingError {
    /// Validation failure (not retryable; caller must fix the item).
    pub fn validation(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            code: code.into(),
            message: message.into(),
            retryable: false,
            details: None,
        }
    }

    /// The entity or link already exists (not retryable).
    pub fn already_exists(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::AlreadyExists,
            code: code.into(),
            message: message.into(),
            retryable: false,
            details: None,
        }
    }

    /// A referenced entity does not exist (retryable once the parent is onboarded).
    pub fn not_found(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            code: code.into(),
            message: message.into(),
            retryable: true,
            details: None,
        }
    }

    /// Remote service failure (retryable).
    pub fn remote(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Remote,
            code: code.into(),
            message: message.into(),
            retryable: true,
            details: None,
        }
    }

    /// Local persistence failed after the remote write was confirmed.
    ///
    /// The remote side holds the entity; the caller must not resubmit the
    /// create, only reconcile the local mapping.
    pub fn storage(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Storage,
            code: code.into(),
            message: message.into(),
            retryable: false,
            details: None,
        }
    }

    /// Unmodeled failure (not retryable).
    pub fn internal(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            code: code.into(),
            message: message.into(),
            retryable: false,
            details: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
