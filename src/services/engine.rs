//! Lending engine - the single entry point for every lending operation
//!
//! Each public method runs in one database transaction: validation and
//! mutation either all land or none do. Dropping the transaction on an error
//! path rolls it back. Notifications go out only after a successful commit.

use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::sync::Arc;

use crate::domain::{
    IdentityResolver, LendingError, LoanConfirmation, Notifier, OpContext, PatronKey,
    ReservationNotice,
};
use crate::models::{inventory, record_detail};
use crate::models::status::RecordOrigin;
use crate::services::activity_service::{self, ActiveLoan, ActivitySummary, PendingRequest};
use crate::services::inventory_ledger;
use crate::services::policy::LendingPolicy;
use crate::services::record_service::{self, CheckoutInput, RecordSummary};
use crate::services::request_service::{
    self, LineRemoval, NewRequest, RequestClosure, RequestLineRef, RequestSummary,
};
use crate::services::reservation_queue;
use crate::services::return_service::{self, ReturnInput, ReturnOutcome};

/// What one maintenance pass changed.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SweepReport {
    pub expired_requests: Vec<i32>,
    pub expired_reservations: Vec<i32>,
    pub overdue_details: Vec<i32>,
    pub assigned: Vec<ReservationNotice>,
}

#[derive(Clone)]
pub struct LendingEngine {
    db: DatabaseConnection,
    policy: LendingPolicy,
    notifier: Arc<dyn Notifier>,
    identity: Arc<dyn IdentityResolver>,
}

impl LendingEngine {
    pub fn new(
        db: DatabaseConnection,
        policy: LendingPolicy,
        notifier: Arc<dyn Notifier>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            db,
            policy,
            notifier,
            identity,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn policy(&self) -> &LendingPolicy {
        &self.policy
    }

    pub async fn resolve_card(&self, key: &PatronKey) -> Result<Option<i32>, LendingError> {
        self.identity.resolve_card(key).await
    }

    #[tracing::instrument(skip(self, ctx, input), fields(card_id = input.card_id))]
    pub async fn create_request(
        &self,
        ctx: &OpContext,
        input: NewRequest,
    ) -> Result<RequestSummary, LendingError> {
        let txn = self.db.begin().await?;
        let summary = request_service::create_request(&txn, &self.policy, ctx, input).await;
        let summary = settle(ctx, txn, summary).await?;
        self.announce(&summary.assigned).await;
        Ok(summary)
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn cancel_request(
        &self,
        ctx: &OpContext,
        request_id: i32,
    ) -> Result<RequestClosure, LendingError> {
        let txn = self.db.begin().await?;
        let closure = request_service::cancel_request(&txn, &self.policy, ctx, request_id).await;
        let closure = settle(ctx, txn, closure).await?;
        self.announce(&closure.assigned).await;
        Ok(closure)
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn add_item_to_request(
        &self,
        ctx: &OpContext,
        request_id: i32,
        item_id: i32,
    ) -> Result<RequestSummary, LendingError> {
        let txn = self.db.begin().await?;
        let summary = request_service::add_item(&txn, &self.policy, ctx, request_id, item_id).await;
        let summary = settle(ctx, txn, summary).await?;
        self.announce(&summary.assigned).await;
        Ok(summary)
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn add_resource_to_request(
        &self,
        ctx: &OpContext,
        request_id: i32,
        resource_id: i32,
    ) -> Result<RequestSummary, LendingError> {
        let txn = self.db.begin().await?;
        let summary = request_service::add_resource(&txn, ctx, request_id, resource_id).await;
        settle(ctx, txn, summary).await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn cancel_request_line(
        &self,
        ctx: &OpContext,
        request_id: i32,
        line: RequestLineRef,
    ) -> Result<LineRemoval, LendingError> {
        let txn = self.db.begin().await?;
        let removal = request_service::cancel_line(&txn, &self.policy, ctx, request_id, line).await;
        let removal = settle(ctx, txn, removal).await?;
        self.announce(&removal.assigned).await;
        Ok(removal)
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn process_request_to_record(
        &self,
        ctx: &OpContext,
        request_id: i32,
        instance_ids: Vec<i32>,
    ) -> Result<RecordSummary, LendingError> {
        let txn = self.db.begin().await?;
        let summary = record_service::process_request_to_record(
            &txn,
            &self.policy,
            ctx,
            request_id,
            &instance_ids,
        )
        .await;
        let summary = settle(ctx, txn, summary).await?;
        self.confirm(summary.confirmation()).await;
        Ok(summary)
    }

    #[tracing::instrument(skip(self, ctx, input), fields(card_id = input.card_id))]
    pub async fn walk_in_checkout(
        &self,
        ctx: &OpContext,
        input: CheckoutInput,
    ) -> Result<RecordSummary, LendingError> {
        self.checkout(ctx, input, RecordOrigin::WalkIn).await
    }

    #[tracing::instrument(skip(self, ctx, input), fields(card_id = input.card_id))]
    pub async fn self_checkout(
        &self,
        ctx: &OpContext,
        input: CheckoutInput,
    ) -> Result<RecordSummary, LendingError> {
        self.checkout(ctx, input, RecordOrigin::SelfService).await
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn extend_due_date(
        &self,
        ctx: &OpContext,
        record_id: i32,
        detail_ids: Vec<i32>,
    ) -> Result<Vec<record_detail::Model>, LendingError> {
        let txn = self.db.begin().await?;
        let details =
            record_service::extend_due_date(&txn, &self.policy, ctx, record_id, &detail_ids).await;
        settle(ctx, txn, details).await
    }

    #[tracing::instrument(skip(self, ctx, input))]
    pub async fn process_return(
        &self,
        ctx: &OpContext,
        record_id: i32,
        input: ReturnInput,
    ) -> Result<ReturnOutcome, LendingError> {
        let txn = self.db.begin().await?;
        let outcome = return_service::process_return(&txn, &self.policy, ctx, record_id, input).await;
        let outcome = settle(ctx, txn, outcome).await?;
        self.announce(&outcome.assigned).await;
        Ok(outcome)
    }

    #[tracing::instrument(skip(self, ctx))]
    pub async fn shelve_instance(
        &self,
        ctx: &OpContext,
        instance_id: i32,
    ) -> Result<Option<ReservationNotice>, LendingError> {
        let txn = self.db.begin().await?;
        let notice =
            reservation_queue::shelve_instance(&txn, instance_id, &self.policy, ctx).await;
        let notice = settle(ctx, txn, notice).await?;
        self.announce(notice.as_slice()).await;
        Ok(notice)
    }

    /// Expire stale reservations, then stale requests, then flag overdue lines.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn sweep(&self, ctx: &OpContext) -> Result<SweepReport, LendingError> {
        let txn = self.db.begin().await?;
        let swept = async {
            let reservations = reservation_queue::sweep_expired(&txn, &self.policy, ctx).await?;
            let requests = request_service::expire_requests(&txn, &self.policy, ctx).await?;
            let overdue_details = record_service::sweep_overdue(&txn, ctx).await?;
            Ok::<_, LendingError>((reservations, requests, overdue_details))
        }
        .await;
        let (reservations, requests, overdue_details) = settle(ctx, txn, swept).await?;

        let mut assigned = requests.assigned;
        assigned.extend(reservations.assigned);
        self.announce(&assigned).await;
        Ok(SweepReport {
            expired_requests: requests.expired,
            expired_reservations: reservations.expired,
            overdue_details,
            assigned,
        })
    }

    /// Fails with the conflicting claim when the card already holds, wants or
    /// waits for the item.
    pub async fn check_allow_to_reserve(
        &self,
        ctx: &OpContext,
        card_id: i32,
        item_id: i32,
    ) -> Result<(), LendingError> {
        reservation_queue::check_allow_to_reserve(&self.db, card_id, item_id, ctx).await
    }

    pub async fn get_request(&self, request_id: i32) -> Result<RequestSummary, LendingError> {
        request_service::load_summary(&self.db, request_id).await
    }

    pub async fn get_record(&self, record_id: i32) -> Result<RecordSummary, LendingError> {
        record_service::load_record(&self.db, record_id).await
    }

    pub async fn get_active_loans(&self, card_id: i32) -> Result<Vec<ActiveLoan>, LendingError> {
        Ok(activity_service::get_active_loans(&self.db, card_id).await?)
    }

    pub async fn get_pending_requests(
        &self,
        card_id: i32,
    ) -> Result<Vec<PendingRequest>, LendingError> {
        Ok(activity_service::get_pending_requests(&self.db, card_id).await?)
    }

    pub async fn calculate_activity_summary(
        &self,
        card_id: i32,
    ) -> Result<ActivitySummary, LendingError> {
        Ok(activity_service::calculate_activity_summary(&self.db, card_id).await?)
    }

    pub async fn inventory(&self, item_id: i32) -> Result<inventory::Model, LendingError> {
        inventory_ledger::snapshot(&self.db, item_id)
            .await
            .map_err(|e| e.localize(Default::default()))
    }

    async fn checkout(
        &self,
        ctx: &OpContext,
        input: CheckoutInput,
        origin: RecordOrigin,
    ) -> Result<RecordSummary, LendingError> {
        let txn = self.db.begin().await?;
        let summary = record_service::checkout(&txn, &self.policy, ctx, input, origin).await;
        let summary = settle(ctx, txn, summary).await?;
        self.confirm(summary.confirmation()).await;
        Ok(summary)
    }

    async fn confirm(&self, confirmation: LoanConfirmation) {
        self.notifier.loan_confirmed(&confirmation).await;
    }

    async fn announce(&self, notices: &[ReservationNotice]) {
        for notice in notices {
            self.notifier.reservation_assigned(notice).await;
        }
    }
}

/// Commits a finished unit of work; on failure the transaction is dropped and
/// rolls back. Errors come back rendered in the caller's locale.
async fn settle<T>(
    ctx: &OpContext,
    txn: DatabaseTransaction,
    outcome: Result<T, LendingError>,
) -> Result<T, LendingError> {
    let value = outcome.map_err(|e| e.localized(ctx.locale))?;
    txn.commit()
        .await
        .map_err(|e| LendingError::from(e).localized(ctx.locale))?;
    Ok(value)
}
