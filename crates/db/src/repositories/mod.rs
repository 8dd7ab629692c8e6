//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async operations that
//! accept `&DbPool` as the first argument.

pub mod batch_repo;
pub mod cache_entry_repo;
pub mod history_repo;
pub mod job_status_repo;

pub use batch_repo::BatchRepo;
pub use cache_entry_repo::CacheEntryRepo;
pub use history_repo::HistoryRepo;
pub use job_status_repo::JobStatusRepo;
