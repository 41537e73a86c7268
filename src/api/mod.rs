use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::infrastructure::AppState;

pub mod error;
pub mod health;
pub mod inventory;
pub mod patrons;
pub mod records;
pub mod requests;

pub use error::{ApiContext, ApiError};

pub fn api_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Borrow requests
        .route("/requests", post(requests::create_request))
        .route("/requests/:id", get(requests::get_request))
        .route("/requests/:id/cancel", post(requests::cancel_request))
        .route("/requests/:id/items", post(requests::add_item))
        .route("/requests/:id/resources", post(requests::add_resource))
        .route(
            "/requests/:id/items/:line_id",
            delete(requests::cancel_item_line),
        )
        .route(
            "/requests/:id/resources/:line_id",
            delete(requests::cancel_resource_line),
        )
        .route(
            "/requests/:id/reservations/:entry_id",
            delete(requests::cancel_reservation_line),
        )
        .route("/requests/:id/fulfil", post(requests::fulfil_request))
        // Checkouts and records
        .route("/checkouts/walk-in", post(records::walk_in_checkout))
        .route("/checkouts/self-service", post(records::self_checkout))
        .route("/records/:id", get(records::get_record))
        .route("/records/:id/extend", post(records::extend_due_date))
        .route("/records/:id/return", post(records::process_return))
        // Patrons
        .route("/cards/lookup", get(patrons::lookup_card))
        .route("/cards/:id/loans", get(patrons::active_loans))
        .route("/cards/:id/requests", get(patrons::pending_requests))
        .route("/cards/:id/summary", get(patrons::activity_summary))
        .route(
            "/cards/:id/reservable/:item_id",
            get(patrons::check_reservable),
        )
        // Inventory and maintenance
        .route("/items/:id/inventory", get(inventory::item_counters))
        .route("/instances/:id/shelve", post(inventory::shelve_instance))
        .route("/maintenance/sweep", post(inventory::run_sweep))
        .with_state(state)
}
