use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::extractors::Json;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/discover/search", get(search))
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct SearchQuery {
    pub query: String,
}

/// GET /discover/search?query=
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Response> {
    let results = state.recommender.search_tracks(&params.query).await?;

    Ok(Json(json!({
        "message": "Tracks retrieved successfully",
        "results": results,
    }))
    .into_response())
}
