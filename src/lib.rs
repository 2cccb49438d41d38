//! streamsync library crate.
//!
//! Keeps a roster of YouTube channels and their live broadcasts in sync
//! through a quota-aware pool of API keys.

pub mod api;
pub mod avatar;
pub mod cache;
pub mod database;
pub mod error;
pub mod keypool;
pub mod scheduler;
pub mod sync;
pub mod youtube;

pub use error::{Error, Result};
