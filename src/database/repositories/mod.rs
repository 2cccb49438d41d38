//! Repository layer for database access.
//!
//! This module implements the Repository Pattern to abstract all database
//! interactions. `*TxOps` types hold the transactional variants used by the
//! credential pool and the sync executor.

pub mod api_key;
pub mod api_key_tx;
pub mod channel;
pub mod live_stream;
pub mod live_stream_tx;
pub mod usage_log;

pub use api_key::*;
pub use api_key_tx::*;
pub use channel::*;
pub use live_stream::*;
pub use live_stream_tx::*;
pub use usage_log::*;
