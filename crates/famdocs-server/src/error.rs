//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use famdocs_workflow::WorkflowError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub WorkflowError);

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match &self.0 {
      WorkflowError::Unauthorized => StatusCode::UNAUTHORIZED,
      WorkflowError::Forbidden(_) | WorkflowError::SubscriptionInactive(_) => {
        StatusCode::FORBIDDEN
      }
      WorkflowError::NotFound(_) | WorkflowError::SubscriptionNotFound(_) => {
        StatusCode::NOT_FOUND
      }
      WorkflowError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
      WorkflowError::Conflict(_) => StatusCode::CONFLICT,
      WorkflowError::QuotaExhausted { .. } | WorkflowError::LimitReached(_) => {
        StatusCode::TOO_MANY_REQUESTS
      }
      WorkflowError::GenerationFailed(_) | WorkflowError::ArchiveFailed(_) => {
        StatusCode::BAD_GATEWAY
      }
      WorkflowError::RenderFailed(_)
      | WorkflowError::PersistenceFailed(_)
      | WorkflowError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(error = %self.0, code = self.0.code(), "request failed");
    }

    let body = json!({
      "success": false,
      "error":   self.0.code(),
      "message": self.0.to_string(),
    });
    let mut res = (status, Json(body)).into_response();
    if status == StatusCode::UNAUTHORIZED {
      res
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    res
  }
}
