//! Database models for streamsync.
//!
//! These models map directly to the database schema.

pub mod api_key;
pub mod channel;
pub mod live_stream;
pub mod usage_log;

pub use api_key::*;
pub use channel::*;
pub use live_stream::*;
pub use usage_log::*;
