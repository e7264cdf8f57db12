// Maps shaping failures onto HTTP responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::ShapingError;

#[derive(Debug)]
pub enum ApiError {
    Shaping(ShapingError),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<ShapingError> for ApiError {
    fn from(e: ShapingError) -> Self {
        ApiError::Shaping(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(anyhow::anyhow!("blocking task join: {}", e))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Shaping(e) => match e {
                ShapingError::InvalidRate(_) | ShapingError::InvalidInterface(_) => {
                    StatusCode::BAD_REQUEST
                }
                ShapingError::Unsupported => StatusCode::NOT_IMPLEMENTED,
                ShapingError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
                ShapingError::RedirectDeviceBusy { .. } => StatusCode::CONFLICT,
                ShapingError::CommandFailed { .. } => StatusCode::BAD_GATEWAY,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Shaping(e) => e.to_string(),
            ApiError::BadRequest(m) => m.clone(),
            ApiError::Internal(e) => {
                tracing::warn!(error = %e, "request failed");
                e.to_string()
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
