use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AppError;

/// JSON body extractor that rejects with `AppError`, so malformed or
/// mistyped bodies get a 400 with a `{"message"}` body like every other
/// client error.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => Err(rejection_to_error(rejection)),
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

fn rejection_to_error(rejection: JsonRejection) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge;
    }
    tracing::debug!("Rejected request body: {}", rejection.body_text());
    AppError::Validation(rejection.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Rated {
        rating: u8,
    }

    async fn extract(content_type: Option<&str>, body: &str) -> Result<Json<Rated>, AppError> {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let req = builder.body(Body::from(body.to_string())).unwrap();
        Json::<Rated>::from_request(req, &()).await
    }

    #[tokio::test]
    async fn well_formed_body_is_extracted() {
        let Json(rated) = extract(Some("application/json"), r#"{"rating":4}"#)
            .await
            .unwrap();
        assert_eq!(rated.rating, 4);
    }

    #[tokio::test]
    async fn wrongly_typed_value_is_a_validation_error() {
        let result = extract(Some("application/json"), r#"{"rating":"4"}"#).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn syntax_error_and_missing_content_type_are_validation_errors() {
        let result = extract(Some("application/json"), r#"{"rating":"#).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result = extract(None, r#"{"rating":4}"#).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
