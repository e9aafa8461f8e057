use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::BAD_REQUEST, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::NOT_FOUND, message: msg.into() }
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::UNPROCESSABLE_ENTITY, message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, message: msg.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, message = %self.message, "request failed");
        }
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<nclc_pipeline::PipelineError> for ApiError {
    fn from(e: nclc_pipeline::PipelineError) -> Self {
        use nclc_pipeline::PipelineError;
        match e {
            PipelineError::NodeClassNotReady(_) | PipelineError::InsufficientCapacity(_) => {
                ApiError::unprocessable(e.to_string())
            }
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<nclc_driver::DriverError> for ApiError {
    fn from(e: nclc_driver::DriverError) -> Self {
        use nclc_driver::DriverError;
        match e {
            DriverError::NotFound(msg) => ApiError::not_found(msg),
            DriverError::InsufficientCapacity(_) | DriverError::NodeClassNotReady(_) => {
                ApiError::unprocessable(e.to_string())
            }
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<nclc_drift::DriftError> for ApiError {
    fn from(e: nclc_drift::DriftError) -> Self {
        ApiError::internal(e.to_string())
    }
}

impl From<nclc_catalog::CatalogError> for ApiError {
    fn from(e: nclc_catalog::CatalogError) -> Self {
        ApiError::internal(e.to_string())
    }
}
