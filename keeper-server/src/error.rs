use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use save_keeper::{ErrorKind, KeeperError};
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Keeper(#[from] KeeperError),

    #[error("{0}")]
    BadRequest(String),

    /// A destructive request arrived without explicit confirmation.
    #[error("{0}")]
    ConfirmationRequired(String),
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::DuplicateName => StatusCode::CONFLICT,
        ErrorKind::IllegalName | ErrorKind::InvalidLength | ErrorKind::InvalidPreferences => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::CopyFailed
        | ErrorKind::RestoreFailed
        | ErrorKind::RenameFailed
        | ErrorKind::DeleteFailed
        | ErrorKind::IndexCorrupt
        | ErrorKind::Config
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Keeper(e) => {
                let kind = e.kind();
                let status = status_for(kind);
                if status.is_server_error() {
                    tracing::error!(kind = %kind, "Store operation failed: {e}");
                }
                let mut body = json!({ "error": e.to_string(), "kind": kind.as_str() });
                if let KeeperError::RestoreFailed { live_cleared, .. } = e {
                    body["liveCleared"] = json!(live_cleared);
                }
                (status, body)
            }
            AppError::BadRequest(m) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": m, "kind": "BadRequest" }),
            ),
            AppError::ConfirmationRequired(m) => (
                StatusCode::PRECONDITION_REQUIRED,
                json!({ "error": m, "kind": "ConfirmationRequired" }),
            ),
        };
        (status, Json(body)).into_response()
    }
}
