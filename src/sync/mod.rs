//! Multi-tier stream synchronization.

pub mod executor;
pub mod lifecycle;
pub mod tier;

pub use executor::{ChannelSyncError, SyncExecutor, SyncOptions, SyncOutcome};
pub use tier::{ChannelScope, SyncConfig, SyncTier, TierPlan, WindowSpec};
