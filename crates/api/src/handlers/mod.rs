//! Request handlers.
//!
//! Each submodule provides async handler functions for one resource.
//! Handlers delegate to [`GenerationService`](crate::engine::GenerationService)
//! and map errors via [`AppError`](crate::error::AppError).

pub mod batches;
pub mod jobs;
pub mod metrics;
pub mod users;
