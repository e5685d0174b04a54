//! Shared data model for the rosterline onboarding pipeline.

pub mod correlation;
pub mod envelope;
pub mod error;
pub mod op;
pub mod outcome;
pub mod request;
pub mod response;
