//! Application state shared across handlers

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::domain::Notifier;
use crate::infrastructure::{SeaOrmCardDirectory, TracingNotifier};
use crate::services::{LendingEngine, LendingPolicy};

#[derive(Clone)]
pub struct AppState {
    pub engine: LendingEngine,
}

impl AppState {
    /// Engine wired to the log notifier and the local card table.
    pub fn new(db: DatabaseConnection, policy: LendingPolicy) -> Self {
        Self::with_notifier(db, policy, Arc::new(TracingNotifier))
    }

    pub fn with_notifier(
        db: DatabaseConnection,
        policy: LendingPolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let identity = Arc::new(SeaOrmCardDirectory::new(db.clone()));
        Self {
            engine: LendingEngine::new(db, policy, notifier, identity),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.engine.db()
    }
}

impl axum::extract::FromRef<AppState> for LendingEngine {
    fn from_ref(state: &AppState) -> Self {
        state.engine.clone()
    }
}
