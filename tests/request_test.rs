mod common;

use circulation::domain::{ErrorKind, Field, IssueCode, LendingError};
use circulation::models::card;
use circulation::models::status::{CardStatus, RequestStatus, ReservationStatus};
use circulation::seed;
use circulation::services::request_service::{NewRequest, RequestLineRef};
use sea_orm::{ActiveModelTrait, Set};

fn request_for(card_id: i32, item_ids: Vec<i32>) -> NewRequest {
    NewRequest {
        card_id,
        item_ids,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_request_holds_one_unit_per_line() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let item = h.item("Kindred", 2).await;

    let summary = h
        .engine
        .create_request(&common::ctx(), request_for(card, vec![item.id()]))
        .await
        .unwrap();

    assert_eq!(summary.request.status, RequestStatus::Created);
    assert_eq!(summary.lines.len(), 1);
    assert!(summary.reservations.is_empty());

    let counters = h.counters(item.id()).await;
    assert_eq!(counters.available, 1);
    assert_eq!(counters.requested, 1);
}

#[tokio::test]
async fn test_unavailable_item_joins_the_waitlist() {
    let h = common::setup().await;
    let first = h.card("ada").await;
    let second = h.card("grace").await;
    let item = h.item("Parable of the Sower", 1).await;

    h.lend(first, item.instance_ids()).await;

    let summary = h
        .engine
        .create_request(&common::ctx(), request_for(second, vec![item.id()]))
        .await
        .unwrap();

    assert!(summary.lines.is_empty());
    assert_eq!(summary.reservations.len(), 1);
    assert_eq!(summary.reservations[0].status, ReservationStatus::Pending);

    let counters = h.counters(item.id()).await;
    assert_eq!(counters.available, 0);
    assert_eq!(counters.borrowed, 1);
    assert_eq!(counters.queued, 1);
}

#[tokio::test]
async fn test_cancel_twice_is_a_state_error_and_leaves_counters_alone() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let item = h.item("Lilith's Brood", 1).await;

    let summary = h
        .engine
        .create_request(&common::ctx(), request_for(card, vec![item.id()]))
        .await
        .unwrap();
    let request_id = summary.request.id;

    let closure = h.engine.cancel_request(&common::ctx(), request_id).await.unwrap();
    assert_eq!(closure.request.status, RequestStatus::Cancelled);
    let after_first = h.counters(item.id()).await;
    assert_eq!(after_first.available, 1);
    assert_eq!(after_first.requested, 0);

    let err = h
        .engine
        .cancel_request(&common::ctx(), request_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert!(err.has_code(IssueCode::RequestNotMutable));
    assert_eq!(h.counters(item.id()).await, after_first);
}

#[tokio::test]
async fn test_every_bad_line_is_reported_and_nothing_is_written() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let item = h.item("Dawn", 1).await;

    let err = h
        .engine
        .create_request(
            &common::ctx(),
            request_for(card, vec![item.id(), item.id(), 9999]),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    let issues = err.issues();
    assert_eq!(issues.len(), 2);
    assert_eq!((issues[0].field, issues[0].line), (Some(Field::Items), Some(1)));
    assert_eq!(issues[0].code, IssueCode::DuplicateItem);
    assert_eq!(issues[1].code, IssueCode::ItemNotFound);
    assert!(issues[1].message.starts_with("items[2]"));

    assert_eq!(h.counters(item.id()).await.available, 1);
    assert!(h.engine.get_pending_requests(card).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_conflict_outranks_validation_when_both_occur() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let item = h.item("Wild Seed", 2).await;

    h.engine
        .create_request(&common::ctx(), request_for(card, vec![item.id()]))
        .await
        .unwrap();

    let err = h
        .engine
        .create_request(&common::ctx(), request_for(card, vec![item.id(), 9999]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.has_code(IssueCode::AlreadyRequested));
    assert!(err.has_code(IssueCode::ItemNotFound));
}

#[tokio::test]
async fn test_borrow_ceiling_rejects_the_line_that_crosses_it() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let mut ids = Vec::new();
    for n in 0..6 {
        ids.push(h.item(&format!("Volume {}", n), 1).await.id());
    }

    let err = h
        .engine
        .create_request(&common::ctx(), request_for(card, ids))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.issues().len(), 1);
    assert_eq!(err.issues()[0].code, IssueCode::BorrowLimitExceeded);
    assert_eq!(err.issues()[0].line, Some(5));
}

#[tokio::test]
async fn test_missing_and_blocked_cards() {
    let h = common::setup().await;
    let item = h.item("Fledgling", 1).await;

    let err = h
        .engine
        .create_request(&common::ctx(), request_for(777, vec![item.id()]))
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::NotFound { entity: "card", id: 777 }));

    let card_id = h.card("ada").await;
    card::ActiveModel {
        id: Set(card_id),
        status: Set(CardStatus::Suspended),
        ..Default::default()
    }
    .update(&h.db)
    .await
    .unwrap();

    let err = h
        .engine
        .create_request(&common::ctx(), request_for(card_id, vec![item.id()]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.has_code(IssueCode::CardInactive));
}

#[tokio::test]
async fn test_removing_the_last_line_deletes_the_request() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let first = h.item("Mind of My Mind", 1).await;
    let second = h.item("Clay's Ark", 1).await;

    let summary = h
        .engine
        .create_request(&common::ctx(), request_for(card, vec![first.id(), second.id()]))
        .await
        .unwrap();
    let request_id = summary.request.id;

    let removal = h
        .engine
        .cancel_request_line(&common::ctx(), request_id, RequestLineRef::Item(summary.lines[0].id))
        .await
        .unwrap();
    assert!(!removal.request_deleted);
    assert_eq!(h.counters(first.id()).await.requested, 0);

    let removal = h
        .engine
        .cancel_request_line(&common::ctx(), request_id, RequestLineRef::Item(summary.lines[1].id))
        .await
        .unwrap();
    assert!(removal.request_deleted);
    assert_eq!(h.counters(second.id()).await.available, 1);

    let err = h.engine.get_request(request_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_add_item_to_open_request_and_refuse_closed_one() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let first = h.item("Survivor", 1).await;
    let second = h.item("Patternmaster", 1).await;

    let summary = h
        .engine
        .create_request(&common::ctx(), request_for(card, vec![first.id()]))
        .await
        .unwrap();
    let request_id = summary.request.id;

    let summary = h
        .engine
        .add_item_to_request(&common::ctx(), request_id, second.id())
        .await
        .unwrap();
    assert_eq!(summary.lines.len(), 2);
    assert_eq!(summary.request.version, 1);

    let err = h
        .engine
        .add_item_to_request(&common::ctx(), request_id, second.id())
        .await
        .unwrap_err();
    assert!(err.has_code(IssueCode::AlreadyRequested));

    h.engine.cancel_request(&common::ctx(), request_id).await.unwrap();
    let err = h
        .engine
        .add_item_to_request(&common::ctx(), request_id, second.id())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}

#[tokio::test]
async fn test_digital_resource_is_claimed_once_per_card() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let resource = seed::create_resource(&h.db, "Journal archive").await.unwrap();

    let input = NewRequest {
        card_id: card,
        resource_ids: vec![resource.id],
        ..Default::default()
    };
    let summary = h.engine.create_request(&common::ctx(), input.clone()).await.unwrap();
    assert_eq!(summary.resources.len(), 1);

    let err = h.engine.create_request(&common::ctx(), input).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.has_code(IssueCode::ResourceAlreadyActive));
}

#[tokio::test]
async fn test_sweep_expires_stale_requests() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let item = h.item("Imago", 1).await;

    let summary = h
        .engine
        .create_request(&common::ctx(), request_for(card, vec![item.id()]))
        .await
        .unwrap();

    let report = h.engine.sweep(&common::ctx_in(1)).await.unwrap();
    assert!(report.expired_requests.is_empty());

    let report = h.engine.sweep(&common::ctx_in(4)).await.unwrap();
    assert_eq!(report.expired_requests, vec![summary.request.id]);

    let request = h.engine.get_request(summary.request.id).await.unwrap();
    assert_eq!(request.request.status, RequestStatus::Expired);
    assert_eq!(h.counters(item.id()).await.available, 1);
}

#[tokio::test]
async fn test_waitlisted_request_still_expires_on_time() {
    let h = common::setup().await;
    let (a, b) = (h.card("ada").await, h.card("ben").await);
    let free = h.item("Dawn", 1).await;
    let out = h.item("Adulthood Rites", 1).await;
    h.lend(a, out.instance_ids()).await;

    let summary = h.request(b, vec![free.id(), out.id()]).await;
    assert_eq!(summary.lines.len(), 1);
    assert_eq!(summary.reservations.len(), 1);

    let report = h.engine.sweep(&common::ctx_in(4)).await.unwrap();
    assert_eq!(report.expired_requests, vec![summary.request.id]);

    let request = h.engine.get_request(summary.request.id).await.unwrap();
    assert_eq!(request.request.status, RequestStatus::Expired);
    assert_eq!(request.reservations[0].status, ReservationStatus::Expired);

    let counters = h.counters(free.id()).await;
    assert_eq!((counters.available, counters.requested), (1, 0));
    assert_eq!(h.counters(out.id()).await.queued, 0);
}

#[tokio::test]
async fn test_resource_lines_keep_input_order() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let first = seed::create_resource(&h.db, "Map collection").await.unwrap();
    let second = seed::create_resource(&h.db, "Newspaper archive").await.unwrap();
    let third = seed::create_resource(&h.db, "Score library").await.unwrap();

    let summary = h
        .engine
        .create_request(
            &common::ctx(),
            NewRequest {
                card_id: card,
                resource_ids: vec![third.id, first.id, second.id],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let ordered: Vec<i32> = summary.resources.iter().map(|r| r.resource_id).collect();
    assert_eq!(ordered, vec![third.id, first.id, second.id]);
}
