use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use save_keeper::fs::walker::TreeSummary;
use save_keeper::{Backup, BackupPatch, NewBackup};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_backups).post(create_backup))
        .route(
            "/{id}",
            get(get_backup).patch(rename_backup).delete(remove_backup),
        )
        .route("/{id}/load", post(load_backup))
        .route("/{id}/usage", get(backup_usage))
}

async fn list_backups(State(state): State<Arc<AppState>>) -> Json<Vec<Backup>> {
    Json(state.store.list().await)
}

async fn get_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Backup>, AppError> {
    Ok(Json(state.store.get(id).await?))
}

async fn create_backup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewBackup>,
) -> Result<(StatusCode, Json<Backup>), AppError> {
    let backup = state.store.create(body).await?;
    state
        .ui
        .broadcast("backup:created", Some(backup.game), json!({ "backup": backup }));
    Ok((StatusCode::CREATED, Json(backup)))
}

#[derive(Debug, Default, Deserialize)]
struct LoadRequest {
    #[serde(default)]
    confirm: bool,
}

async fn load_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<LoadRequest>,
) -> Result<Json<Backup>, AppError> {
    let backup = state.store.get(id).await?;
    if !body.confirm {
        return Err(AppError::ConfirmationRequired(format!(
            "Loading \"{}\" replaces the live save directory; resend with {{\"confirm\": true}}",
            backup.name
        )));
    }

    let backup = state.store.load(id).await?;
    state
        .ui
        .broadcast("backup:loaded", Some(backup.game), json!({ "backup": backup }));
    Ok(Json(backup))
}

async fn rename_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<BackupPatch>,
) -> Result<Json<Backup>, AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("name or description is required".into()));
    }

    let backup = state.store.rename(id, body).await?;
    state
        .ui
        .broadcast("backup:renamed", Some(backup.game), json!({ "backup": backup }));
    Ok(Json(backup))
}

async fn remove_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let backup = state.store.remove(id).await?;
    state.ui.broadcast(
        "backup:removed",
        Some(backup.game),
        json!({ "id": backup.id, "type": backup.game }),
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn backup_usage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TreeSummary>, AppError> {
    Ok(Json(state.store.usage(id).await?))
}
