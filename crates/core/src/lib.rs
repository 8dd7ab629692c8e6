//! Domain types and invariants for the vimax generation backend.
//!
//! Everything in this crate is synchronous and storage-agnostic: the job
//! status record and its step machine, generation requests and their cache
//! fingerprint, batch records, and per-user history entries. Persistence
//! lives in `vimax-db`; orchestration lives in `vimax-api`.

pub mod batch;
pub mod error;
pub mod fingerprint;
pub mod generation;
pub mod hashing;
pub mod history;
pub mod job_events;
pub mod job_status;
pub mod types;
