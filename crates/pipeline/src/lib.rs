//! Pipeline adapters: the boundary between job orchestration and the
//! opaque generation pipelines that actually produce videos.

pub mod adapter;
pub mod command;
pub mod error;
pub mod registry;

pub use adapter::{Artifact, PipelineAdapter, PipelineRequest};
pub use command::CommandPipeline;
pub use error::PipelineError;
pub use registry::PipelineRegistry;
