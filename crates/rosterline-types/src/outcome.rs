//! The two-list result container threaded through every pipeline stage.

use crate::response::Response;

/// Stage output: survivors in `valid`, settled verdicts in `invalid`.
///
/// An item leaving a stage appears in exactly one of the two lists; the
/// pipeline never drops an item silently. `invalid` accumulates
/// monotonically stage to stage: once a Response exists for an item it
/// is never reprocessed within the same run.
#[derive(Debug)]
pub struct StageOutcome<T> {
    pub valid: Vec<T>,
    pub invalid: Vec<Response>,
}

impl<T> Default for StageOutcome<T> {
    fn default() -> Self {
        Self {
            valid: Vec::new(),
            invalid: Vec::new(),
        }
    }
}

impl<T> StageOutcome<T> {
    /// Empty outcome.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome where every input survived.
    #[must_use]
    pub fn all_valid(valid: Vec<T>) -> Self {
        Self {
            valid,
            invalid: Vec::new(),
        }
    }

    /// Outcome where every input settled with a verdict.
    #[must_use]
    pub fn all_invalid(invalid: Vec<Response>) -> Self {
        Self {
            valid: Vec::new(),
            invalid,
        }
    }

    /// Record a survivor.
    pub fn push_valid(&mut self, item: T) {
        self.valid.push(item);
    }

    /// Record a settled verdict.
    pub fn push_invalid(&mut self, response: Response) {
        self.invalid.push(response);
    }

    /// Total number of items accounted for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.valid.is_empty() && self.invalid.is_empty()
    }

    /// Map survivors to a new stage type, carrying verdicts forward.
    #[must_use]
    pub fn map_valid<U>(self, f: impl FnMut(T) -> U) -> StageOutcome<U> {
        StageOutcome {
            valid: self.valid.into_iter().map(f).collect(),
            invalid: self.invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationId;
    use crate::error::OnboardingError;
    use crate::op::EntityKind;

    fn failed(seq: u32) -> Response {
        Response::failure(
            CorrelationId::new("r", seq),
            EntityKind::User,
            "u-ext",
            &OnboardingError::validation("NAME_EMPTY", "empty"),
        )
    }

    #[test]
    fn every_item_lands_in_exactly_one_list() {
        let mut out = StageOutcome::new();
        out.push_valid("a");
        out.push_valid("b");
        out.push_invalid(failed(0));
        assert_eq!(out.valid.len(), 2);
        assert_eq!(out.invalid.len(), 1);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn map_valid_preserves_invalid() {
        let mut out = StageOutcome::all_valid(vec![1, 2, 3]);
        out.push_invalid(failed(1));
        let mapped = out.map_valid(|n| n * 10);
        assert_eq!(mapped.valid, vec![10, 20, 30]);
        assert_eq!(mapped.invalid.len(), 1);
    }

    #[test]
    fn all_invalid_has_no_survivors() {
        let out: StageOutcome<()> = StageOutcome::all_invalid(vec![failed(0), failed(1)]);
        assert!(out.valid.is_empty());
        assert_eq!(out.len(), 2);
        assert!(!out.is_empty());
    }
}
