pub mod backups;
pub mod maintenance;
pub mod preferences;

use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/backups", backups::router())
        .nest("/api/maintenance", maintenance::router())
        .nest("/api/preferences", preferences::router())
        .route("/health", get(health))
        .route("/ws", get(crate::ws::ui::ws_handler))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backups": state.store.list().await.len(),
    }))
}
