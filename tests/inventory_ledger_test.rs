mod common;

use circulation::domain::{ErrorKind, IssueCode, Locale};
use circulation::services::inventory_ledger::{self as ledger, HoldKind, LedgerError};

#[tokio::test]
async fn test_units_move_between_buckets_without_breaking_the_total() {
    let h = common::setup().await;
    let item = h.item("Solaris", 2).await;

    ledger::reserve(&h.db, item.id(), HoldKind::Requested).await.unwrap();
    ledger::reserve(&h.db, item.id(), HoldKind::Reserved).await.unwrap();
    let counters = h.counters(item.id()).await;
    assert_eq!(counters.available, 0);
    assert_eq!(counters.requested, 1);
    assert_eq!(counters.reserved, 1);

    ledger::commit(&h.db, item.id(), HoldKind::Requested).await.unwrap();
    ledger::release(&h.db, item.id(), HoldKind::Reserved).await.unwrap();
    let counters = h.counters(item.id()).await;
    assert_eq!(counters.borrowed, 1);
    assert_eq!(counters.available, 1);

    ledger::mark_lost(&h.db, item.id()).await.unwrap();
    let counters = h.counters(item.id()).await;
    assert_eq!(counters.lost, 1);
    assert_eq!(counters.borrowed, 0);
    assert_eq!(counters.total, 2);
}

#[tokio::test]
async fn test_empty_bucket_is_a_capacity_conflict() {
    let h = common::setup().await;
    let item = h.item("Roadside Picnic", 1).await;

    ledger::reserve(&h.db, item.id(), HoldKind::Requested).await.unwrap();
    let err = ledger::reserve(&h.db, item.id(), HoldKind::Requested)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Capacity { .. }));

    let err = err.localize(Locale::En);
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.has_code(IssueCode::CapacityExhausted));

    // Nothing moved on the failed call.
    let counters = h.counters(item.id()).await;
    assert_eq!(counters.available, 0);
    assert_eq!(counters.requested, 1);
}

#[tokio::test]
async fn test_unknown_item_is_reported_as_missing() {
    let h = common::setup().await;

    let err = ledger::return_unit(&h.db, 4242).await.unwrap_err();
    assert!(matches!(err, LedgerError::Missing(4242)));
    assert_eq!(err.localize(Locale::En).kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_waitlist_counter_never_goes_negative() {
    let h = common::setup().await;
    let item = h.item("Hyperion", 1).await;

    ledger::enqueue(&h.db, item.id()).await.unwrap();
    ledger::dequeue(&h.db, item.id()).await.unwrap();
    assert!(ledger::dequeue(&h.db, item.id()).await.is_err());
    assert_eq!(h.counters(item.id()).await.queued, 0);
}
