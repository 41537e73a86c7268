#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use circulation::db;
use circulation::domain::{LoanConfirmation, Locale, Notifier, OpContext, ReservationNotice};
use circulation::infrastructure::AppState;
use circulation::models::{category, instance, inventory};
use circulation::seed::{self, CatalogItem};
use circulation::services::record_service::{CheckoutInput, RecordSummary};
use circulation::services::request_service::{NewRequest, RequestSummary};
use circulation::services::return_service::{ReturnInput, ReturnOutcome, ReturnedLine};
use circulation::services::{LendingEngine, LendingPolicy};
use sea_orm::{DatabaseConnection, EntityTrait};
use std::sync::{Arc, Mutex};

/// Notifier that keeps everything it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub loans: Mutex<Vec<LoanConfirmation>>,
    pub pickups: Mutex<Vec<ReservationNotice>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn loan_confirmed(&self, confirmation: &LoanConfirmation) {
        self.loans.lock().unwrap().push(confirmation.clone());
    }

    async fn reservation_assigned(&self, notice: &ReservationNotice) {
        self.pickups.lock().unwrap().push(notice.clone());
    }
}

impl RecordingNotifier {
    pub fn pickups(&self) -> Vec<ReservationNotice> {
        self.pickups.lock().unwrap().clone()
    }

    pub fn loans(&self) -> Vec<LoanConfirmation> {
        self.loans.lock().unwrap().clone()
    }
}

pub struct Harness {
    pub db: DatabaseConnection,
    pub engine: LendingEngine,
    pub notifier: Arc<RecordingNotifier>,
    pub category: category::Model,
}

/// Fresh in-memory library with one 14-day category.
pub async fn setup() -> Harness {
    setup_with_policy(LendingPolicy::default()).await
}

pub async fn setup_with_policy(policy: LendingPolicy) -> Harness {
    let db = db::init_memory_db().await.expect("Failed to init DB");
    setup_on(db, policy).await
}

/// Library over an already migrated database.
pub async fn setup_on(db: DatabaseConnection, policy: LendingPolicy) -> Harness {
    let category = seed::create_category(&db, "General", 14)
        .await
        .expect("Failed to create category");
    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState::with_notifier(db.clone(), policy, notifier.clone());
    Harness {
        db,
        engine: state.engine,
        notifier,
        category,
    }
}

pub fn ctx() -> OpContext {
    OpContext::new(Locale::En)
}

/// Context `days` from now.
pub fn ctx_in(days: i64) -> OpContext {
    OpContext::at(Locale::En, Utc::now() + Duration::days(days))
}

impl Harness {
    pub async fn item(&self, title: &str, copies: usize) -> CatalogItem {
        self.priced_item(title, Some(2000), copies).await
    }

    pub async fn priced_item(&self, title: &str, price: Option<i64>, copies: usize) -> CatalogItem {
        seed::create_item(&self.db, self.category.id, title, price, copies)
            .await
            .expect("Failed to create item")
    }

    pub async fn card(&self, name: &str) -> i32 {
        seed::create_card(&self.db, &format!("{}@example.org", name), name)
            .await
            .expect("Failed to create card")
            .id
    }

    pub async fn counters(&self, item_id: i32) -> inventory::Model {
        let counters = self.engine.inventory(item_id).await.expect("counters");
        assert!(counters.is_balanced(), "unbalanced counters: {:?}", counters);
        counters
    }

    /// Walk-in take-home loan at the desk.
    pub async fn lend(&self, card_id: i32, instance_ids: Vec<i32>) -> RecordSummary {
        self.engine
            .walk_in_checkout(
                &ctx(),
                CheckoutInput {
                    card_id,
                    instance_ids,
                    borrow_type: Default::default(),
                },
            )
            .await
            .expect("walk-in checkout")
    }

    pub async fn request(&self, card_id: i32, item_ids: Vec<i32>) -> RequestSummary {
        self.engine
            .create_request(
                &ctx(),
                NewRequest {
                    card_id,
                    item_ids,
                    ..Default::default()
                },
            )
            .await
            .expect("create request")
    }

    /// Bring every line of a record back in good condition, on time.
    pub async fn give_back(&self, record: &RecordSummary) -> ReturnOutcome {
        let input = ReturnInput {
            returned: record.details.iter().map(|d| returned(d.id)).collect(),
            ..Default::default()
        };
        self.engine
            .process_return(&ctx(), record.record.id, input)
            .await
            .expect("return")
    }

    pub async fn instance(&self, instance_id: i32) -> instance::Model {
        instance::Entity::find_by_id(instance_id)
            .one(&self.db)
            .await
            .expect("query")
            .expect("instance exists")
    }
}

pub fn returned(detail_id: i32) -> ReturnedLine {
    ReturnedLine {
        detail_id,
        condition: Some("good".to_string()),
        fines: Vec::new(),
    }
}
