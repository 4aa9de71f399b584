use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use grounded_rag::{ErrorResponse, PipelineError, RagError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Rag(#[from] RagError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ApiError {
    fn cause(&self) -> Option<&RagError> {
        match self {
            ApiError::BadRequest(_) => None,
            ApiError::Rag(err) => Some(err),
            ApiError::Pipeline(err) => Some(&err.source),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.cause() {
            None | Some(RagError::Validation(_)) => StatusCode::BAD_REQUEST,
            Some(RagError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Some(RagError::Connection(_) | RagError::Upstream { .. } | RagError::Decode(_)) => {
                StatusCode::BAD_GATEWAY
            }
            Some(RagError::Config(_) | RagError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.cause().map_or("validation_error", RagError::kind)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        } else {
            log::warn!("Request rejected: {}", self);
        }

        let body = ErrorResponse {
            status: "error".to_string(),
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
