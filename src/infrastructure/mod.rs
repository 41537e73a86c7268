//! Infrastructure layer - Framework implementations
//!
//! This layer contains:
//! - Database connection and schema (db)
//! - HTTP server setup and the maintenance sweeper (server)
//! - Configuration loading (config)
//! - Collaborator implementations (repositories, notifier)
//! - Catalog fixtures (seed)
//! - Application state (state)

pub mod config;
pub mod db;
pub mod notifier;
pub mod repositories;
pub mod seed;
pub mod server;
pub mod state;

pub use notifier::TracingNotifier;
pub use repositories::*;
pub use state::AppState;
