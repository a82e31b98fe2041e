use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;

use crate::error::AppResult;
use crate::extractors::Json;
use crate::notifications::NotificationRepository;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/get-notifications/{username}", get(list))
}

/// GET /get-notifications/{username}
/// Polled by clients; newest first.
pub async fn list(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Response> {
    let notifications = state.notifications().list_for(&username).await?;

    Ok(Json(json!({
        "message": "Notifications retrieved successfully",
        "notifications": notifications,
    }))
    .into_response())
}
