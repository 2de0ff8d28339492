//! Harmonia Analytics Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod analytics;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use analytics::{AnalyticsStore, QueryEngine, RefreshQueue, SqliteAnalyticsStore};
pub use server::{run_server, RequestsLoggingLevel};
