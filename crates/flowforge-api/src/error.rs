//! Maps [`ForgeError`] onto HTTP responses (spec section 7) without violating the orphan rule:
//! `ForgeError` lives in `flowforge-core`, `IntoResponse` is foreign to this crate, so the
//! mapping goes through a local newtype.

use axum::response::{IntoResponse, Response};
use axum::Json;
use flowforge_core::error::ForgeError;
use serde::Serialize;

/// Wraps a [`ForgeError`] so handlers can use `?` and still produce an HTTP response.
pub struct ApiError(pub ForgeError);

impl From<ForgeError> for ApiError {
    fn from(err: ForgeError) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = axum::http::StatusCode::from_u16(self.0.status_code())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody { error: ErrorDetail { kind: self.0.kind(), message: self.0.to_string() } };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
