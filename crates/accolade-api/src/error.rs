//! API error type and [`axum::response::IntoResponse`] implementation.

use accolade_core::Error as WorkflowError;
use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// No [`accolade_core::identity::Principal`] was attached to the request.
  #[error("authentication required")]
  Unauthenticated,

  #[error(transparent)]
  Workflow(#[from] WorkflowError),
}

impl ApiError {
  /// The HTTP status for this error. Stable per error kind.
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
      ApiError::Workflow(e) => match e {
        WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
        WorkflowError::Unauthorized(_) | WorkflowError::Forbidden => StatusCode::FORBIDDEN,
        WorkflowError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
        WorkflowError::StorageTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        WorkflowError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      ApiError::Unauthenticated => "unauthenticated",
      ApiError::Workflow(e) => e.kind(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(kind = self.kind(), error = %self, "request failed");
    }
    let body = json!({ "error": self.to_string(), "kind": self.kind() });
    (status, Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use accolade_core::status::{AchievementStatus, Action};
  use uuid::Uuid;

  use super::*;

  #[test]
  fn statuses_are_stable_per_kind() {
    let cases = [
      (WorkflowError::Validation("x".into()), 422, "validation_error"),
      (WorkflowError::Unauthorized(Uuid::nil()), 403, "unauthorized"),
      (WorkflowError::Forbidden, 403, "forbidden"),
      (
        WorkflowError::InvalidStateTransition {
          from:   AchievementStatus::Verified,
          action: Action::Verify,
        },
        409,
        "invalid_state_transition",
      ),
    ];
    for (err, status, kind) in cases {
      let api = ApiError::from(err);
      assert_eq!(api.status().as_u16(), status);
      assert_eq!(api.kind(), kind);
    }
    assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
  }
}
