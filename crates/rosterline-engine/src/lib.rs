//! Batch orchestration pipeline: scheduler, four-stage entity pipeline,
//! bulk-write chunker, remote gateway boundary, and broker-driven
//! consumption.

pub mod cache;
pub mod chunker;
pub mod config;
pub mod consume;
pub mod errors;
pub mod handlers;
pub mod orchestrator;
pub mod pipeline;
pub mod remote;
pub mod scheduler;

pub use config::EngineConfig;
pub use consume::{BatchConsumer, PollOutcome};
pub use errors::PipelineError;
pub use orchestrator::{BatchOutcome, Orchestrator};
