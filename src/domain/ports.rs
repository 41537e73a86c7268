//! Collaborator trait definitions
//!
//! These traits define the contract with services that live outside the
//! lending core. Implementations live in the infrastructure layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::LendingError;

/// Sent once a loan has been committed.
#[derive(Debug, Clone, Serialize)]
pub struct LoanConfirmation {
    pub record_id: i32,
    pub card_id: i32,
    pub instance_ids: Vec<i32>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Sent when a freed copy has been put aside for a waiting patron.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationNotice {
    pub reservation_id: i32,
    pub card_id: i32,
    pub item_id: i32,
    pub instance_id: i32,
    pub pickup_until: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Delivery is best effort: the engine has already committed when it calls these.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn loan_confirmed(&self, confirmation: &LoanConfirmation);

    async fn reservation_assigned(&self, notice: &ReservationNotice);
}

/// How a caller identifies a patron.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatronKey {
    Email(String),
    CardId(i32),
}

/// Resolves a patron identity to the card the engine works with.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Returns `None` when no card matches.
    async fn resolve_card(&self, key: &PatronKey) -> Result<Option<i32>, LendingError>;
}
