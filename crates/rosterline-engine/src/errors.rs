//! Pipeline error model.

use rosterline_types::error::OnboardingError;

/// Categorized pipeline error.
///
/// `Onboarding` wraps a typed per-item error that can be attributed to a
/// specific request and converted into a Response. `Infrastructure` wraps
/// opaque host-side failures (store setup, serialization, task join) that
/// the `compose` executor converts into internal-error Responses for all
/// surviving items rather than propagating.
#[derive(Debug)]
pub enum PipelineError {
    /// Typed per-item onboarding error.
    Onboarding(OnboardingError),
    /// Infrastructure error (store, task join, serialization, etc.)
    Infrastructure(anyhow::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onboarding(e) => write!(f, "{e}"),
            Self::Infrastructure(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}

impl From<OnboardingError> for PipelineError {
    fn from(e: OnboardingError) -> Self {
        Self::Onboarding(e)
    }
}

impl From<rosterline_state::StoreError> for PipelineError {
    fn from(e: rosterline_state::StoreError) -> Self {
        Self::Infrastructure(anyhow::Error::new(e))
    }
}

impl PipelineError {
    /// Returns the typed onboarding error if this is an `Onboarding` variant.
    #[must_use]
    pub fn as_onboarding_error(&self) -> Option<&OnboardingError> {
        match self {
            Self::Onboarding(e) => Some(e),
            Self::Infrastructure(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosterline_types::error::ErrorKind;

    #[test]
    fn onboarding_error_is_extractable() {
        let err = PipelineError::Onboarding(OnboardingError::remote("REMOTE_DOWN", "unreachable"));
        let inner = err.as_onboarding_error().unwrap();
        assert_eq!(inner.kind, ErrorKind::Remote);
    }

    #[test]
    fn infrastructure_has_no_onboarding_error() {
        let err: PipelineError = anyhow::anyhow!("store open failed").into();
        assert!(err.as_onboarding_error().is_none());
        assert!(err.to_string().contains("store open failed"));
    }

    #[test]
    fn store_error_converts_to_infrastructure() {
        let err: PipelineError = rosterline_state::StoreError::LockPoisoned.into();
        assert!(matches!(err, PipelineError::Infrastructure(_)));
    }
}
