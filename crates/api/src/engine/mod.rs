//! Job orchestration: the artifact cache, the per-job step runner, the
//! batch scheduler, and the service facade tying them together.

pub mod cache;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod scheduler;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use service::{EngineSettings, GenerationService};
