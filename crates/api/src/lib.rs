//! vimax API server library.
//!
//! Exposes the building blocks (config, state, engine, WebSocket delivery,
//! routes) so integration tests and the binary entrypoint share them.

pub mod background;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
