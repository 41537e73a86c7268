mod common;

use chrono::Utc;
use circulation::db;
use circulation::domain::{ErrorKind, IssueCode};
use circulation::services::LendingPolicy;
use circulation::services::record_service::CheckoutInput;
use std::path::PathBuf;

fn scratch_db() -> PathBuf {
    std::env::temp_dir().join(format!(
        "circulation-{}-{}.db",
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ))
}

fn take_home(card_id: i32, instance_id: i32) -> CheckoutInput {
    CheckoutInput {
        card_id,
        instance_ids: vec![instance_id],
        borrow_type: Default::default(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_checkouts_on_pooled_database_leave_one_winner() {
    let path = scratch_db();
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let conn = db::init_db(&url, 5).await.expect("Failed to init DB");
    let h = common::setup_on(conn, LendingPolicy::default()).await;

    for round in 0..10 {
        let a = h.card(&format!("ada{}", round)).await;
        let b = h.card(&format!("ben{}", round)).await;
        let item = h.item(&format!("Kindred {}", round), 1).await;
        let copy = item.instance_ids()[0];

        let first = tokio::spawn({
            let engine = h.engine.clone();
            async move { engine.walk_in_checkout(&common::ctx(), take_home(a, copy)).await }
        });
        let second = tokio::spawn({
            let engine = h.engine.clone();
            async move { engine.walk_in_checkout(&common::ctx(), take_home(b, copy)).await }
        });
        let outcomes = [first.await.unwrap(), second.await.unwrap()];

        let winners = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(winners, 1, "round {}: {:?}", round, outcomes);
        let loser = outcomes
            .iter()
            .find_map(|o| o.as_ref().err())
            .expect("one checkout fails");
        assert_eq!(loser.kind(), ErrorKind::Conflict, "round {}: {:?}", round, loser);
        assert!(
            loser.has_code(IssueCode::ConcurrentModification)
                || loser.has_code(IssueCode::InstanceAlreadyBorrowed),
            "round {}: {:?}",
            round,
            loser
        );

        let counters = h.counters(item.id()).await;
        assert_eq!(counters.borrowed, 1);
        assert_eq!(counters.available, 0);
    }

    drop(h);
    let _ = std::fs::remove_file(&path);
}
