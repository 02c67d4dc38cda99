use crate::error::AppError;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use save_keeper::OrphanReport;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orphans", get(list_orphans))
        .route("/sweep", post(sweep_orphans))
}

async fn list_orphans(State(state): State<Arc<AppState>>) -> Result<Json<OrphanReport>, AppError> {
    Ok(Json(state.store.orphans().await?))
}

async fn sweep_orphans(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let removed = state.store.sweep_orphans().await?;
    tracing::info!(count = removed.len(), "Swept untracked directories");
    Ok(Json(json!({ "removed": removed })))
}
