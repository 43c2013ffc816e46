// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod collector;
pub mod config;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod ledger;
pub mod merge;
pub mod metrics;
pub mod pipeline;
pub mod session;
pub mod similarity;
pub mod sources;
pub mod store;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::{ChannelConfig, SyncConfig};
pub use crate::driver::{RunLease, SyncDriver, SyncReport};
pub use crate::error::SyncError;
pub use crate::similarity::similarity;
