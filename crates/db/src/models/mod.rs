//! Row structs for the persisted tables.
//!
//! Domain records are stored as JSON documents; each row struct lifts out
//! only the columns the repositories filter or aggregate on.

pub mod batch;
pub mod cache_entry;
pub mod history;
pub mod job_status;
