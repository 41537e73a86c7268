mod common;

use circulation::domain::{ErrorKind, IssueCode, LendingError};
use circulation::models::status::{ChargeKind, ConditionType, DetailStatus, FineStatus, InstanceStatus};
use circulation::seed;
use circulation::services::return_service::{FineClaim, LostLine, ReturnInput, ReturnedLine};

fn returned_with_fine(detail_id: i32, policy_id: i32) -> ReturnedLine {
    ReturnedLine {
        fines: vec![FineClaim { policy_id }],
        ..common::returned(detail_id)
    }
}

#[tokio::test]
async fn test_late_return_needs_and_gets_an_overdue_fine() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let item = h.item("Frankenstein", 1).await;
    let late_fee = seed::create_fine_policy(&h.db, "Late fee", ConditionType::Overdue, ChargeKind::DailyRate, 25)
        .await
        .unwrap();

    let record = h.lend(card, item.instance_ids()).await;
    let detail_id = record.details[0].id;
    let ctx = common::ctx_in(20);

    let err = h
        .engine
        .process_return(
            &ctx,
            record.record.id,
            ReturnInput {
                returned: vec![common::returned(detail_id)],
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.has_code(IssueCode::OverdueFineRequired));

    let outcome = h
        .engine
        .process_return(
            &ctx,
            record.record.id,
            ReturnInput {
                returned: vec![returned_with_fine(detail_id, late_fee.id)],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.returned, vec![detail_id]);
    assert_eq!(outcome.fines.len(), 1);
    assert_eq!(outcome.fines[0].amount_cents, 150);
    assert_eq!(outcome.fines[0].status, FineStatus::Pending);
    assert_eq!(outcome.fines[0].card_id, card);

    let record = h.engine.get_record(record.record.id).await.unwrap();
    assert_eq!(record.details[0].status, DetailStatus::Returned);
    assert_eq!(record.details[0].condition_after.as_deref(), Some("good"));
    let counters = h.counters(item.id()).await;
    assert_eq!(counters.borrowed, 0);
    assert_eq!(counters.available, 1);
}

#[tokio::test]
async fn test_lost_copy_is_charged_from_its_price() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let item = h.priced_item("Dracula", Some(2400), 1).await;
    let replacement = seed::create_fine_policy(&h.db, "Replacement", ConditionType::Lost, ChargeKind::PriceRatio, 100)
        .await
        .unwrap();

    let record = h.lend(card, item.instance_ids()).await;
    let detail_id = record.details[0].id;

    let err = h
        .engine
        .process_return(
            &common::ctx(),
            record.record.id,
            ReturnInput {
                lost: vec![LostLine {
                    detail_id,
                    fines: Vec::new(),
                }],
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.has_code(IssueCode::LostFineRequired));

    let outcome = h
        .engine
        .process_return(
            &common::ctx(),
            record.record.id,
            ReturnInput {
                lost: vec![LostLine {
                    detail_id,
                    fines: vec![FineClaim {
                        policy_id: replacement.id,
                    }],
                }],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.lost, vec![detail_id]);
    assert_eq!(outcome.fines[0].amount_cents, 2400);
    assert_eq!(outcome.fines[0].condition_type, ConditionType::Lost);

    let counters = h.counters(item.id()).await;
    assert_eq!(counters.lost, 1);
    assert_eq!(counters.borrowed, 0);
    assert_eq!(counters.total, 1);
    assert_eq!(h.instance(item.instance_ids()[0]).await.status, InstanceStatus::Lost);
}

#[tokio::test]
async fn test_lost_copy_without_a_price_cannot_be_charged() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let item = h.priced_item("Carmilla", None, 1).await;
    let flat = seed::create_fine_policy(&h.db, "Flat loss", ConditionType::Lost, ChargeKind::Fixed, 1500)
        .await
        .unwrap();
    let damage = seed::create_fine_policy(&h.db, "Damage", ConditionType::Damaged, ChargeKind::Fixed, 300)
        .await
        .unwrap();

    let record = h.lend(card, item.instance_ids()).await;
    let err = h
        .engine
        .process_return(
            &common::ctx(),
            record.record.id,
            ReturnInput {
                lost: vec![LostLine {
                    detail_id: record.details[0].id,
                    fines: vec![
                        FineClaim { policy_id: flat.id },
                        FineClaim {
                            policy_id: damage.id,
                        },
                    ],
                }],
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.has_code(IssueCode::MissingEstimatedPrice));
    assert!(err.has_code(IssueCode::WrongFineType));
    assert_eq!(h.counters(item.id()).await.lost, 0);
}

#[tokio::test]
async fn test_due_lines_left_out_must_be_confirmed() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let first = h.item("The Turn of the Screw", 1).await;
    let second = h.item("The Monk", 1).await;
    let late_fee = seed::create_fine_policy(&h.db, "Late fee", ConditionType::Overdue, ChargeKind::DailyRate, 25)
        .await
        .unwrap();

    let record = h
        .lend(card, vec![first.instance_ids()[0], second.instance_ids()[0]])
        .await;
    let (kept, brought) = (record.details[1].id, record.details[0].id);
    let ctx = common::ctx_in(15);

    let input = ReturnInput {
        returned: vec![returned_with_fine(brought, late_fee.id)],
        ..Default::default()
    };
    let err = h
        .engine
        .process_return(&ctx, record.record.id, input.clone())
        .await
        .unwrap_err();
    match &err {
        LendingError::ConfirmMissing { detail_ids } => assert_eq!(detail_ids, &vec![kept]),
        other => panic!("expected ConfirmMissing, got {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::Validation);

    let outcome = h
        .engine
        .process_return(
            &ctx,
            record.record.id,
            ReturnInput {
                confirm_missing: true,
                ..input
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.returned, vec![brought]);
    assert_eq!(outcome.fines[0].amount_cents, 25);

    let record = h.engine.get_record(record.record.id).await.unwrap();
    let still_out = record.details.iter().find(|d| d.id == kept).unwrap();
    assert!(still_out.status.is_open());
}

#[tokio::test]
async fn test_each_bad_line_is_reported() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let late_fee = seed::create_fine_policy(&h.db, "Late fee", ConditionType::Overdue, ChargeKind::Fixed, 100)
        .await
        .unwrap();
    let items = [
        h.item("Melmoth", 1).await,
        h.item("Vathek", 1).await,
        h.item("Zofloya", 1).await,
    ];
    let record = h
        .lend(card, items.iter().map(|i| i.instance_ids()[0]).collect())
        .await;
    let ids: Vec<i32> = record.details.iter().map(|d| d.id).collect();

    let err = h
        .engine
        .process_return(
            &common::ctx(),
            record.record.id,
            ReturnInput {
                returned: vec![
                    common::returned(ids[0]),
                    returned_with_fine(ids[1], late_fee.id),
                    ReturnedLine {
                        condition: Some("  ".to_string()),
                        ..common::returned(ids[2])
                    },
                ],
                lost: vec![LostLine {
                    detail_id: ids[0],
                    fines: Vec::new(),
                }],
                confirm_missing: false,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let codes: Vec<IssueCode> = err.issues().iter().map(|i| i.code).collect();
    assert_eq!(
        codes,
        vec![
            IssueCode::DetailInBothLists,
            IssueCode::UnexpectedFine,
            IssueCode::ReturnConditionRequired,
        ]
    );

    h.give_back(&record).await;
    let err = h
        .engine
        .process_return(
            &common::ctx(),
            record.record.id,
            ReturnInput {
                returned: vec![common::returned(ids[0])],
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert!(err.has_code(IssueCode::DetailClosed));
}

#[tokio::test]
async fn test_late_lines_are_flagged_when_the_return_lands() {
    let h = common::setup().await;
    let card = h.card("ada").await;
    let first = h.item("Wide Sargasso Sea", 1).await;
    let second = h.item("Rebecca", 1).await;
    let late_fee = seed::create_fine_policy(&h.db, "Late fee", ConditionType::Overdue, ChargeKind::DailyRate, 25)
        .await
        .unwrap();

    let record = h
        .lend(card, vec![first.instance_ids()[0], second.instance_ids()[0]])
        .await;
    let (brought, kept) = (record.details[0].id, record.details[1].id);
    let ctx = common::ctx_in(16);

    // Nobody ran the sweep; the line is still Borrowing on disk but already late.
    let err = h
        .engine
        .process_return(
            &ctx,
            record.record.id,
            ReturnInput {
                returned: vec![common::returned(brought)],
                confirm_missing: true,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.has_code(IssueCode::OverdueFineRequired));
    let untouched = h.engine.get_record(record.record.id).await.unwrap();
    assert!(untouched.details.iter().all(|d| d.status == DetailStatus::Borrowing));

    let outcome = h
        .engine
        .process_return(
            &ctx,
            record.record.id,
            ReturnInput {
                returned: vec![returned_with_fine(brought, late_fee.id)],
                confirm_missing: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.fines[0].amount_cents, 50);

    let record = h.engine.get_record(record.record.id).await.unwrap();
    let still_out = record.details.iter().find(|d| d.id == kept).unwrap();
    assert_eq!(still_out.status, DetailStatus::Overdue);
}
