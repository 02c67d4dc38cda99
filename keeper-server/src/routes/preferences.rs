use crate::error::AppError;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use save_keeper::{Preferences, PreferencesPatch};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_preferences).put(update_preferences))
}

async fn get_preferences(State(state): State<Arc<AppState>>) -> Json<Preferences> {
    Json(state.store.preferences().await)
}

async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PreferencesPatch>,
) -> Result<Json<Preferences>, AppError> {
    let preferences = state.store.set_preferences(body).await?;
    state.ui.broadcast(
        "preferences:updated",
        None,
        serde_json::json!({ "preferences": preferences }),
    );
    Ok(Json(preferences))
}
