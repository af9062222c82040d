//! StackGuard HTTP service: library interface.
//!
//! Exposes the router, handlers, configuration loading, and shutdown
//! coordination so integration tests can build the service in-process.

pub mod api;
pub mod config;
pub mod shutdown;

pub use api::{build_router, health_handler, predict_handler, AppState};
pub use shutdown::{serve_until_shutdown, shutdown_signal, ShutdownCoordinator};
