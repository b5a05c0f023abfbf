use crate::core::approval::ApprovalError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors crossing the HTTP boundary. Each maps to a status code and a
/// small JSON body; internals never leak into responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Approval(#[from] ApprovalError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Approval(e) => {
                let status = match e {
                    ApprovalError::NotFound(_) => StatusCode::NOT_FOUND,
                    ApprovalError::Expired(_) => StatusCode::GONE,
                    ApprovalError::AlreadyResolved(_) => StatusCode::CONFLICT,
                    ApprovalError::Timeout | ApprovalError::Cancelled => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
