mod common;

use chrono::{DateTime, Duration, Utc};
use circulation::domain::{ErrorKind, IssueCode};
use circulation::models::status::{BorrowType, DetailStatus, RecordOrigin, RequestStatus};
use circulation::seed;
use circulation::services::record_service::CheckoutInput;

fn walk_in(card_id: i32, instance_ids: Vec<i32>, borrow_type: BorrowType) -> CheckoutInput {
    CheckoutInput {
        card_id,
        instance_ids,
        borrow_type,
    }
}

fn assert_near(actual: Option<DateTime<Utc>>, expected: DateTime<Utc>) {
    let actual = actual.expect("due date");
    assert!((actual - expected).num_seconds().abs() < 1, "{} != {}", actual, expected);
}

#[tokio::test]
async fn test_same_copy_checked_out_twice_at_once_goes_to_one_patron() {
    let h = common::setup().await;
    let (a, b) = (h.card("ada").await, h.card("ben").await);
    let item = h.item("A Wizard of Earthsea", 1).await;
    let copy = item.instance_ids()[0];

    let ctx = common::ctx();
    let (first, second) = tokio::join!(
        h.engine
            .walk_in_checkout(&ctx, walk_in(a, vec![copy], BorrowType::TakeHome)),
        h.engine
            .walk_in_checkout(&ctx, walk_in(b, vec![copy], BorrowType::TakeHome)),
    );

    let (won, lost) = match (first, second) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        (first, second) => panic!("expected exactly one winner: {:?} / {:?}", first, second),
    };
    assert_eq!(won.details.len(), 1);
    assert_eq!(lost.kind(), ErrorKind::Conflict);
    assert!(lost.has_code(IssueCode::InstanceAlreadyBorrowed));

    let counters = h.counters(item.id()).await;
    assert_eq!(counters.borrowed, 1);
    assert_eq!(counters.available, 0);
}

#[tokio::test]
async fn test_fulfilling_a_request_opens_one_line_per_copy() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let first = h.item("The Left Hand of Darkness", 2).await;
    let second = h.item("The Tombs of Atuan", 1).await;

    let request = h.request(card, vec![first.id(), second.id()]).await;
    let ctx = common::ctx();
    let record = h
        .engine
        .process_request_to_record(
            &ctx,
            request.request.id,
            vec![first.instance_ids()[1], second.instance_ids()[0]],
        )
        .await
        .unwrap();

    assert_eq!(record.record.origin, RecordOrigin::Request);
    assert_eq!(record.record.request_id, Some(request.request.id));
    assert_eq!(record.details.len(), 2);
    for detail in &record.details {
        assert_eq!(detail.status, DetailStatus::Borrowing);
        assert_near(detail.due_date, ctx.now + Duration::days(14));
        assert_eq!(detail.condition_before, "good");
    }

    let loans = h.notifier.loans();
    assert_eq!(loans.len(), 1);
    assert_eq!(loans[0].record_id, record.record.id);
    assert_near(loans[0].due_date, ctx.now + Duration::days(14));

    let counters = h.counters(first.id()).await;
    assert_eq!((counters.available, counters.requested, counters.borrowed), (1, 0, 1));

    let summary = h.engine.get_request(request.request.id).await.unwrap();
    assert_eq!(summary.request.status, RequestStatus::Borrowed);

    let err = h
        .engine
        .process_request_to_record(&ctx, request.request.id, vec![first.instance_ids()[0]])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}

#[tokio::test]
async fn test_fulfilment_checks_every_copy() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let wanted = h.item("Rocannon's World", 1).await;
    let other = h.item("Planet of Exile", 1).await;
    let unrecorded = h.item("City of Illusions", 0).await;
    let bare_copy = seed::add_copy(&h.db, unrecorded.id(), None).await.unwrap();

    let request = h.request(card, vec![wanted.id(), unrecorded.id()]).await;
    let request_id = request.request.id;

    let err = h
        .engine
        .process_request_to_record(&common::ctx(), request_id, wanted.instance_ids())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.has_code(IssueCode::TooFewInstances));

    let err = h
        .engine
        .process_request_to_record(
            &common::ctx(),
            request_id,
            vec![other.instance_ids()[0], bare_copy.id],
        )
        .await
        .unwrap_err();
    assert_eq!(err.issues().len(), 2);
    assert_eq!(err.issues()[0].code, IssueCode::ItemNotInRequest);
    assert_eq!(err.issues()[1].code, IssueCode::MissingConditionHistory);

    // Nothing moved.
    assert_eq!(h.counters(wanted.id()).await.requested, 1);
    let summary = h.engine.get_request(request_id).await.unwrap();
    assert_eq!(summary.request.status, RequestStatus::Created);
}

#[tokio::test]
async fn test_extensions_are_capped() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let item = h.item("The Farthest Shore", 1).await;

    let record = h.lend(card, item.instance_ids()).await;
    let record_id = record.record.id;
    let detail = record.details[0].clone();
    let due = detail.due_date.unwrap();

    let err = h
        .engine
        .extend_due_date(&common::ctx(), record_id, vec![detail.id])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.has_code(IssueCode::ExtensionTooEarly));

    let extended = h
        .engine
        .extend_due_date(&common::ctx_in(13), record_id, vec![detail.id])
        .await
        .unwrap();
    assert_eq!(extended[0].due_date, Some(due + Duration::days(14)));
    assert_eq!(extended[0].extension_count, 1);

    h.engine
        .extend_due_date(&common::ctx_in(26), record_id, vec![detail.id])
        .await
        .unwrap();

    let err = h
        .engine
        .extend_due_date(&common::ctx_in(40), record_id, vec![detail.id])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert!(err.has_code(IssueCode::ExtensionLimitReached));

    let record = h.engine.get_record(record_id).await.unwrap();
    assert_eq!(record.details[0].due_date, Some(due + Duration::days(28)));
}

#[tokio::test]
async fn test_waiting_patron_allows_a_single_extension() {
    let h = common::setup().await;
    let (a, b) = (h.card("ada").await, h.card("ben").await);
    let item = h.item("Malafrena", 1).await;

    let record = h.lend(a, item.instance_ids()).await;
    let detail_id = record.details[0].id;
    h.request(b, vec![item.id()]).await;

    let extended = h
        .engine
        .extend_due_date(&common::ctx_in(13), record.record.id, vec![detail_id])
        .await
        .unwrap();
    assert!(extended[0].reservation_extension_used);

    let err = h
        .engine
        .extend_due_date(&common::ctx_in(26), record.record.id, vec![detail_id])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.has_code(IssueCode::ExtensionBlockedByReservation));
}

#[tokio::test]
async fn test_in_library_loans() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let item = h.item("Orsinian Tales", 2).await;

    let err = h
        .engine
        .self_checkout(
            &common::ctx(),
            walk_in(card, vec![item.instance_ids()[0]], BorrowType::InLibrary),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.has_code(IssueCode::SelfServiceInLibrary));

    let record = h
        .engine
        .walk_in_checkout(
            &common::ctx(),
            walk_in(card, vec![item.instance_ids()[0]], BorrowType::InLibrary),
        )
        .await
        .unwrap();
    assert_eq!(record.details[0].due_date, None);
    assert_eq!(h.notifier.loans()[0].due_date, None);

    let err = h
        .engine
        .extend_due_date(&common::ctx(), record.record.id, vec![record.details[0].id])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert!(err.has_code(IssueCode::NoDueDate));
}

#[tokio::test]
async fn test_self_checkout_respects_other_patrons_requests() {
    let h = common::setup().await;
    let (a, b) = (h.card("ada").await, h.card("ben").await);
    let item = h.item("Searoad", 1).await;

    h.request(a, vec![item.id()]).await;

    let err = h
        .engine
        .self_checkout(
            &common::ctx(),
            walk_in(b, item.instance_ids(), BorrowType::TakeHome),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.has_code(IssueCode::InstanceRequestedByOther));

    let counters = h.counters(item.id()).await;
    assert_eq!(counters.requested, 1);
    assert_eq!(counters.borrowed, 0);
}

#[tokio::test]
async fn test_sweep_flags_late_lines_once() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let item = h.item("Always Coming Home", 1).await;
    let record = h.lend(card, item.instance_ids()).await;
    let detail_id = record.details[0].id;

    let report = h.engine.sweep(&common::ctx_in(10)).await.unwrap();
    assert!(report.overdue_details.is_empty());

    let report = h.engine.sweep(&common::ctx_in(15)).await.unwrap();
    assert_eq!(report.overdue_details, vec![detail_id]);
    let record = h.engine.get_record(record.record.id).await.unwrap();
    assert_eq!(record.details[0].status, DetailStatus::Overdue);

    let report = h.engine.sweep(&common::ctx_in(16)).await.unwrap();
    assert!(report.overdue_details.is_empty());
}
