use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::UnknownView;
use crate::model::InferenceError;

pub const NOT_FOUND_DETAIL: &str = "Id not Found";

/// Every failure a route can produce. Converted to a `{"detail": ...}` body at
/// the HTTP boundary; none of them take the process down.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{detail}")]
    InvalidInput { status: StatusCode, detail: String },
    #[error("{}", NOT_FOUND_DETAIL)]
    NotFound,
    #[error(transparent)]
    UnknownView(#[from] UnknownView),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub detail: String,
}

impl ApiError {
    pub fn invalid(detail: impl Into<String>) -> Self {
        ApiError::InvalidInput {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput { status, .. } => *status,
            ApiError::NotFound | ApiError::UnknownView(_) => StatusCode::NOT_FOUND,
            ApiError::Inference(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // 400 for broken JSON, 415 for a missing content type, 422 for a
        // well-formed body of the wrong shape
        ApiError::InvalidInput {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::invalid(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::debug!("request rejected ({}): {}", status, self);
        }
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}
