pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod folders;
pub mod server;

pub use config::ServerConfig;
pub use error::StorageError;
pub use server::StorageServer;
