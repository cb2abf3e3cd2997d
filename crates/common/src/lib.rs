//! Common utilities shared by the Sentinel ACME crates.
//!
//! - [`ids`] - typed identifiers for stored resources and sync invocations
//! - [`observability`] - tracing subscriber setup

pub mod ids;
pub mod observability;

pub use ids::{ParseResourceKeyError, ResourceKey, ResourceUid, SyncId};
pub use observability::{init_tracing, LogFormat, LoggingConfig};
