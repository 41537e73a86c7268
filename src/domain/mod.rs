//! Domain layer - Pure business abstractions
//!
//! This layer contains NO framework dependencies (no SeaORM entities, no Axum).
//! Only collaborator traits, the per-call context and domain error types.

pub mod context;
pub mod errors;
pub mod locale;
pub mod ports;

pub use context::OpContext;
pub use errors::{ErrorKind, Field, Issue, IssueCode, Issues, LendingError};
pub use locale::Locale;
pub use ports::*;
