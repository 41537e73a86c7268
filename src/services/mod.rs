//! Services Layer
//!
//! Lending logic with no HTTP in it. Every function takes a
//! `ConnectionTrait` so it runs inside whatever transaction the engine opened;
//! the HTTP handlers only ever talk to [`LendingEngine`].

pub mod activity_service;
pub mod engine;
pub mod instance_claims;
pub mod inventory_ledger;
pub mod policy;
pub mod projections;
pub mod record_service;
pub mod request_service;
pub mod reservation_queue;
pub mod return_service;

pub use engine::{LendingEngine, SweepReport};
pub use policy::LendingPolicy;
