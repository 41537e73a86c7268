//! Closed status sets for every lifecycle entity.
//!
//! Each status enum is persisted as text and owns its transition function;
//! callers never assign a status directly, they apply an event and get either
//! the next status or a [`TransitionError`].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} cannot {event} from {from}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: &'static str,
    pub event: &'static str,
}

fn refuse<T>(entity: &'static str, from: &'static str, event: &'static str) -> Result<T, TransitionError> {
    Err(TransitionError {
        entity,
        from,
        event,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    #[sea_orm(string_value = "in_shelf")]
    InShelf,
    #[sea_orm(string_value = "out_of_shelf")]
    OutOfShelf,
    #[sea_orm(string_value = "borrowed")]
    Borrowed,
    #[sea_orm(string_value = "reserved")]
    Reserved,
    #[sea_orm(string_value = "lost")]
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceEvent {
    /// Put back on the shelf after a return.
    Shelve,
    Checkout,
    Return,
    MarkLost,
    /// Set aside for an assigned reservation.
    Hold,
    ReleaseHold,
}

impl InstanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::InShelf => "in_shelf",
            InstanceStatus::OutOfShelf => "out_of_shelf",
            InstanceStatus::Borrowed => "borrowed",
            InstanceStatus::Reserved => "reserved",
            InstanceStatus::Lost => "lost",
        }
    }

    pub fn apply(self, event: InstanceEvent) -> Result<Self, TransitionError> {
        use InstanceEvent as E;
        use InstanceStatus as S;
        match (self, event) {
            (S::OutOfShelf, E::Shelve) => Ok(S::InShelf),
            (S::InShelf | S::Reserved, E::Checkout) => Ok(S::Borrowed),
            (S::Borrowed, E::Return) => Ok(S::OutOfShelf),
            (S::Borrowed, E::MarkLost) => Ok(S::Lost),
            (S::InShelf | S::OutOfShelf, E::Hold) => Ok(S::Reserved),
            (S::Reserved, E::ReleaseHold) => Ok(S::InShelf),
            (S::InShelf | S::OutOfShelf | S::Borrowed | S::Reserved | S::Lost, _) => {
                refuse("instance", self.as_str(), event.as_str())
            }
        }
    }
}

impl InstanceEvent {
    fn as_str(self) -> &'static str {
        match self {
            InstanceEvent::Shelve => "shelve",
            InstanceEvent::Checkout => "check out",
            InstanceEvent::Return => "return",
            InstanceEvent::MarkLost => "mark lost",
            InstanceEvent::Hold => "hold",
            InstanceEvent::ReleaseHold => "release hold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "borrowed")]
    Borrowed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "expired")]
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEvent {
    /// Any change to the lines while the request is still open.
    Amend,
    Fulfil,
    Cancel,
    Expire,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Created => "created",
            RequestStatus::Borrowed => "borrowed",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Expired => "expired",
        }
    }

    pub fn apply(self, event: RequestEvent) -> Result<Self, TransitionError> {
        match (self, event) {
            (RequestStatus::Created, RequestEvent::Amend) => Ok(RequestStatus::Created),
            (RequestStatus::Created, RequestEvent::Fulfil) => Ok(RequestStatus::Borrowed),
            (RequestStatus::Created, RequestEvent::Cancel) => Ok(RequestStatus::Cancelled),
            (RequestStatus::Created, RequestEvent::Expire) => Ok(RequestStatus::Expired),
            (RequestStatus::Borrowed | RequestStatus::Cancelled | RequestStatus::Expired, _) => {
                refuse("request", self.as_str(), "change")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "assigned")]
    Assigned,
    #[sea_orm(string_value = "collected")]
    Collected,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationEvent {
    Assign,
    Collect,
    Expire,
    Cancel,
}

impl ReservationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Assigned => "assigned",
            ReservationStatus::Collected => "collected",
            ReservationStatus::Expired => "expired",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Assigned)
    }

    pub fn apply(self, event: ReservationEvent) -> Result<Self, TransitionError> {
        use ReservationEvent as E;
        use ReservationStatus as S;
        match (self, event) {
            (S::Pending, E::Assign) => Ok(S::Assigned),
            (S::Assigned, E::Collect) => Ok(S::Collected),
            (S::Pending | S::Assigned, E::Expire) => Ok(S::Expired),
            (S::Pending | S::Assigned, E::Cancel) => Ok(S::Cancelled),
            (S::Pending | S::Assigned | S::Collected | S::Expired | S::Cancelled, _) => {
                refuse("reservation", self.as_str(), "change")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum DetailStatus {
    #[sea_orm(string_value = "borrowing")]
    Borrowing,
    #[sea_orm(string_value = "overdue")]
    Overdue,
    #[sea_orm(string_value = "returned")]
    Returned,
    #[sea_orm(string_value = "lost")]
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailEvent {
    Extend,
    MarkOverdue,
    Return,
    Lose,
}

impl DetailStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DetailStatus::Borrowing => "borrowing",
            DetailStatus::Overdue => "overdue",
            DetailStatus::Returned => "returned",
            DetailStatus::Lost => "lost",
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, DetailStatus::Borrowing | DetailStatus::Overdue)
    }

    pub fn apply(self, event: DetailEvent) -> Result<Self, TransitionError> {
        use DetailEvent as E;
        use DetailStatus as S;
        match (self, event) {
            (S::Borrowing, E::Extend) => Ok(S::Borrowing),
            (S::Borrowing, E::MarkOverdue) => Ok(S::Overdue),
            (S::Borrowing | S::Overdue, E::Return) => Ok(S::Returned),
            (S::Borrowing | S::Overdue, E::Lose) => Ok(S::Lost),
            (S::Borrowing | S::Overdue | S::Returned | S::Lost, _) => {
                refuse("loan line", self.as_str(), "change")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum FineStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "waived")]
    Waived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "suspended")]
    Suspended,
    #[sea_orm(string_value = "expired")]
    Expired,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum BorrowType {
    #[default]
    #[sea_orm(string_value = "take_home")]
    TakeHome,
    #[sea_orm(string_value = "in_library")]
    InLibrary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    #[sea_orm(string_value = "request")]
    Request,
    #[sea_orm(string_value = "walk_in")]
    WalkIn,
    #[sea_orm(string_value = "self_service")]
    SelfService,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    #[sea_orm(string_value = "overdue")]
    Overdue,
    #[sea_orm(string_value = "lost")]
    Lost,
    #[sea_orm(string_value = "damaged")]
    Damaged,
}

/// How a fine policy turns its `amount_cents` into a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ChargeKind {
    #[sea_orm(string_value = "fixed")]
    Fixed,
    #[sea_orm(string_value = "daily_rate")]
    DailyRate,
    /// `amount_cents` is a percentage of the item's estimated price.
    #[sea_orm(string_value = "price_ratio")]
    PriceRatio,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_cannot_be_checked_out_twice() {
        let borrowed = InstanceStatus::InShelf
            .apply(InstanceEvent::Checkout)
            .unwrap();
        assert_eq!(borrowed, InstanceStatus::Borrowed);
        assert!(borrowed.apply(InstanceEvent::Checkout).is_err());
    }

    #[test]
    fn returned_instance_goes_out_of_shelf_then_can_be_held() {
        let back = InstanceStatus::Borrowed.apply(InstanceEvent::Return).unwrap();
        assert_eq!(back, InstanceStatus::OutOfShelf);
        assert_eq!(
            back.apply(InstanceEvent::Hold).unwrap(),
            InstanceStatus::Reserved
        );
    }

    #[test]
    fn terminal_requests_reject_every_event() {
        for status in [
            RequestStatus::Borrowed,
            RequestStatus::Cancelled,
            RequestStatus::Expired,
        ] {
            for event in [
                RequestEvent::Amend,
                RequestEvent::Fulfil,
                RequestEvent::Cancel,
                RequestEvent::Expire,
            ] {
                assert!(status.apply(event).is_err());
            }
        }
    }

    #[test]
    fn reservation_lifecycle() {
        let assigned = ReservationStatus::Pending
            .apply(ReservationEvent::Assign)
            .unwrap();
        assert_eq!(
            assigned.apply(ReservationEvent::Collect).unwrap(),
            ReservationStatus::Collected
        );
        assert!(ReservationStatus::Pending
            .apply(ReservationEvent::Collect)
            .is_err());
        assert!(ReservationStatus::Collected
            .apply(ReservationEvent::Expire)
            .is_err());
    }

    #[test]
    fn overdue_lines_cannot_be_extended() {
        assert!(DetailStatus::Overdue.apply(DetailEvent::Extend).is_err());
        assert_eq!(
            DetailStatus::Overdue.apply(DetailEvent::Return).unwrap(),
            DetailStatus::Returned
        );
    }
}
