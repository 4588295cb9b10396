//! Server core functionality
//!
//! HTTP routing, per-request handling and the server lifecycle.

pub mod core;
pub mod routes;
pub mod state;

pub use core::StorageServer;
pub use routes::build_router;
pub use state::AppState;
