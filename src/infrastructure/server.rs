// Server module - builds the HTTP app and runs it with background maintenance

use axum::http::HeaderValue;
use axum::Router;
use sea_orm::DatabaseConnection;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::domain::OpContext;
use crate::infrastructure::config::Config;
use crate::infrastructure::AppState;
use crate::services::LendingEngine;

/// Build the API router around an already wired state.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .nest("/api", api::api_router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Periodically expire requests and reservations and flag overdue loans.
pub fn spawn_sweeper(engine: LendingEngine, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match engine.sweep(&OpContext::default()).await {
                Ok(report) => tracing::debug!(
                    expired_requests = report.expired_requests.len(),
                    expired_reservations = report.expired_reservations.len(),
                    overdue = report.overdue_details.len(),
                    "maintenance sweep"
                ),
                Err(e) => tracing::error!("maintenance sweep failed: {}", e),
            }
        }
    })
}

/// Serve until the listener fails.
pub async fn serve(db: DatabaseConnection, config: &Config) -> Result<(), std::io::Error> {
    let state = AppState::new(db, config.policy.clone());
    if config.sweep_interval_secs > 0 {
        spawn_sweeper(
            state.engine.clone(),
            Duration::from_secs(config.sweep_interval_secs),
        );
    }
    let app = build_router(state, &config.cors_allowed_origins);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("circulation server listening on {}", addr);
    axum::serve(listener, app).await
}
