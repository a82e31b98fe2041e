pub mod accounts;
pub mod discover;
pub mod follow;
pub mod notifications;
pub mod posts;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Avatars and covers arrive inline as data URLs
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(accounts::router())
        .merge(posts::router())
        .merge(follow::router())
        .merge(notifications::router())
        .merge(discover::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Fails with `Validation(message)` when any field is blank.
pub(crate) fn require<S: AsRef<str>>(fields: &[S], message: &str) -> AppResult<()> {
    if fields.iter().any(|field| field.as_ref().trim().is_empty()) {
        return Err(AppError::Validation(message.to_string()));
    }
    Ok(())
}
