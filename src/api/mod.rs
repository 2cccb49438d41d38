//! REST API server module.
//!
//! Provides HTTP endpoints for triggering sync tiers and managing the
//! channel roster, API keys, stream records, and the usage log.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::ApiServer;
