//! Notifier that writes lending events to the log.

use async_trait::async_trait;

use crate::domain::{LoanConfirmation, Notifier, ReservationNotice};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn loan_confirmed(&self, confirmation: &LoanConfirmation) {
        tracing::info!(
            record_id = confirmation.record_id,
            card_id = confirmation.card_id,
            copies = confirmation.instance_ids.len(),
            due_date = ?confirmation.due_date,
            "loan confirmation sent"
        );
    }

    async fn reservation_assigned(&self, notice: &ReservationNotice) {
        tracing::info!(
            reservation_id = notice.reservation_id,
            card_id = notice.card_id,
            instance_id = notice.instance_id,
            pickup_until = %notice.pickup_until,
            "reservation pickup notice sent"
        );
    }
}
