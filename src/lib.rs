pub mod api;
pub mod config;
pub mod core;
pub mod installer;
pub mod node;
pub mod repositories;

// Re-exports
pub use crate::api::{create_router, AppState};
pub use crate::core::{HostService, VmService};
pub use crate::node::{ConnectionPool, RetryPolicy};
