//! Policy Engine - stateless lending rules
//!
//! Nothing here touches storage; callers load what the rule needs and pass it in.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::env;

use crate::domain::IssueCode;
use crate::models::status::{BorrowType, ChargeKind, ConditionType, DetailStatus};
use crate::models::{fine_policy, record_detail};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingPolicy {
    /// Ceiling on borrowed + requested + queued lines per card.
    pub max_concurrent: i64,
    pub max_extension: i32,
    pub extension_days: i64,
    /// Extensions open this many days before the due date.
    pub allow_extend_window_days: i64,
    pub request_expiration_days: i64,
    pub reservation_pickup_days: i64,
    pub reservation_expiry_days: i64,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            max_extension: 2,
            extension_days: 14,
            allow_extend_window_days: 3,
            request_expiration_days: 3,
            reservation_pickup_days: 3,
            reservation_expiry_days: 5,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

impl LendingPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent: env_or("POLICY_MAX_CONCURRENT", defaults.max_concurrent),
            max_extension: env_or("POLICY_MAX_EXTENSION", defaults.max_extension),
            extension_days: env_or("POLICY_EXTENSION_DAYS", defaults.extension_days),
            allow_extend_window_days: env_or(
                "POLICY_ALLOW_EXTEND_WINDOW_DAYS",
                defaults.allow_extend_window_days,
            ),
            request_expiration_days: env_or(
                "POLICY_REQUEST_EXPIRATION_DAYS",
                defaults.request_expiration_days,
            ),
            reservation_pickup_days: env_or(
                "POLICY_RESERVATION_PICKUP_DAYS",
                defaults.reservation_pickup_days,
            ),
            reservation_expiry_days: env_or(
                "POLICY_RESERVATION_EXPIRY_DAYS",
                defaults.reservation_expiry_days,
            ),
        }
    }

    /// How many more physical lines the card may take on.
    pub fn borrow_ceiling(&self, usage: &CardUsage) -> i64 {
        (self.max_concurrent - usage.total()).max(0)
    }

    pub fn request_expiration(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(self.request_expiration_days)
    }

    pub fn reservation_window(&self, now: DateTime<Utc>) -> ReservationWindow {
        ReservationWindow {
            pickup_from: now,
            pickup_until: now + Duration::days(self.reservation_pickup_days),
            expires_at: now + Duration::days(self.reservation_expiry_days),
        }
    }

    /// `None` for in-library loans, which are closed before the library does.
    pub fn due_date(
        &self,
        borrow_type: BorrowType,
        now: DateTime<Utc>,
        longest_period_days: i32,
    ) -> Option<DateTime<Utc>> {
        match borrow_type {
            BorrowType::TakeHome => Some(now + Duration::days(i64::from(longest_period_days))),
            BorrowType::InLibrary => None,
        }
    }

    /// Checks one loan line against the extension rules, in the order they are reported.
    pub fn check_extension(
        &self,
        detail: &record_detail::Model,
        someone_waiting: bool,
        now: DateTime<Utc>,
    ) -> Result<ExtensionPlan, IssueCode> {
        if detail.status != DetailStatus::Borrowing {
            return Err(IssueCode::DetailNotBorrowing);
        }
        if detail.extension_count >= self.max_extension {
            return Err(IssueCode::ExtensionLimitReached);
        }
        let due = detail.due_date.ok_or(IssueCode::NoDueDate)?;
        if now < due - Duration::days(self.allow_extend_window_days) {
            return Err(IssueCode::ExtensionTooEarly);
        }
        if someone_waiting && detail.reservation_extension_used {
            return Err(IssueCode::ExtensionBlockedByReservation);
        }
        Ok(ExtensionPlan {
            previous_due_date: due,
            new_due_date: due + Duration::days(self.extension_days),
            consumes_reservation_extension: someone_waiting,
        })
    }
}

/// Lines a card already holds, as counted against the borrow ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CardUsage {
    pub borrowed: i64,
    pub requested: i64,
    pub queued: i64,
}

impl CardUsage {
    pub fn total(&self) -> i64 {
        self.borrowed + self.requested + self.queued
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationWindow {
    pub pickup_from: DateTime<Utc>,
    pub pickup_until: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionPlan {
    pub previous_due_date: DateTime<Utc>,
    pub new_due_date: DateTime<Utc>,
    pub consumes_reservation_extension: bool,
}

/// Whole days past the due date, zero when not late or when there is no due date.
pub fn days_overdue(due_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    due_date
        .map(|due| (now.date_naive() - due.date_naive()).num_days().max(0))
        .unwrap_or(0)
}

/// Amount charged by `policy`.
///
/// Lost-item charges always need a positive estimated price, whatever the
/// charge kind, since the price is what is being replaced.
pub fn fine_amount(
    policy: &fine_policy::Model,
    estimated_price_cents: Option<i64>,
    days_overdue: i64,
) -> Result<i64, IssueCode> {
    let price = estimated_price_cents.filter(|p| *p > 0);
    if policy.condition_type == ConditionType::Lost && price.is_none() {
        return Err(IssueCode::MissingEstimatedPrice);
    }
    match policy.charge {
        ChargeKind::Fixed => Ok(policy.amount_cents),
        ChargeKind::DailyRate => Ok(policy.amount_cents * days_overdue.max(1)),
        ChargeKind::PriceRatio => {
            let price = price.ok_or(IssueCode::MissingEstimatedPrice)?;
            Ok(price * policy.amount_cents / 100)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn detail(due: DateTime<Utc>, extension_count: i32) -> record_detail::Model {
        record_detail::Model {
            id: 1,
            record_id: 1,
            card_id: 1,
            instance_id: 1,
            item_id: 1,
            status: DetailStatus::Borrowing,
            due_date: Some(due),
            return_date: None,
            condition_before: "good".to_string(),
            condition_after: None,
            extension_count,
            reservation_extension_used: false,
            version: 0,
        }
    }

    fn policy(condition_type: ConditionType, charge: ChargeKind, amount_cents: i64) -> fine_policy::Model {
        fine_policy::Model {
            id: 1,
            name: "test".to_string(),
            condition_type,
            charge,
            amount_cents,
        }
    }

    #[test]
    fn ceiling_never_goes_negative() {
        let policy = LendingPolicy::default();
        let usage = CardUsage {
            borrowed: 4,
            requested: 2,
            queued: 1,
        };
        assert_eq!(policy.borrow_ceiling(&usage), 0);
        assert_eq!(policy.borrow_ceiling(&CardUsage::default()), 5);
    }

    #[test]
    fn extension_window_and_cap() {
        let policy = LendingPolicy::default();
        let due = Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap();

        let early = due - Duration::days(10);
        assert_eq!(
            policy.check_extension(&detail(due, 0), false, early),
            Err(IssueCode::ExtensionTooEarly)
        );

        let inside = due - Duration::days(1);
        let plan = policy.check_extension(&detail(due, 0), false, inside).unwrap();
        assert_eq!(plan.new_due_date, due + Duration::days(14));

        assert_eq!(
            policy.check_extension(&detail(due, 2), false, inside),
            Err(IssueCode::ExtensionLimitReached)
        );
    }

    #[test]
    fn waiting_patron_allows_one_extension_only() {
        let policy = LendingPolicy::default();
        let due = Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap();
        let mut line = detail(due, 0);
        let plan = policy.check_extension(&line, true, due).unwrap();
        assert!(plan.consumes_reservation_extension);

        line.reservation_extension_used = true;
        line.extension_count = 1;
        assert_eq!(
            policy.check_extension(&line, true, due),
            Err(IssueCode::ExtensionBlockedByReservation)
        );
    }

    #[test]
    fn fine_amounts_by_charge_kind() {
        let daily = policy(ConditionType::Overdue, ChargeKind::DailyRate, 50);
        assert_eq!(fine_amount(&daily, None, 4), Ok(200));
        assert_eq!(fine_amount(&daily, None, 0), Ok(50));

        let lost = policy(ConditionType::Lost, ChargeKind::PriceRatio, 100);
        assert_eq!(fine_amount(&lost, Some(2_500), 0), Ok(2_500));
        assert_eq!(
            fine_amount(&lost, Some(0), 0),
            Err(IssueCode::MissingEstimatedPrice)
        );

        let lost_fixed = policy(ConditionType::Lost, ChargeKind::Fixed, 1_000);
        assert_eq!(
            fine_amount(&lost_fixed, None, 0),
            Err(IssueCode::MissingEstimatedPrice)
        );
    }

    #[test]
    fn in_library_loans_have_no_due_date() {
        let policy = LendingPolicy::default();
        let now = Utc::now();
        assert!(policy.due_date(BorrowType::InLibrary, now, 21).is_none());
        assert_eq!(
            policy.due_date(BorrowType::TakeHome, now, 21),
            Some(now + Duration::days(21))
        );
    }
}
