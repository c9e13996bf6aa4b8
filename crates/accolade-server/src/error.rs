//! Authentication errors and their axum `IntoResponse` implementation.

use std::time::Duration;

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,
  #[error("credential lookup timed out after {0:?}")]
  StoreTimeout(Duration),
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn kind(&self) -> &'static str {
    match self {
      Error::Unauthorized => "unauthenticated",
      Error::StoreTimeout(_) => "storage_timeout",
      Error::Store(_) => "storage_error",
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = match &self {
      Error::Unauthorized => StatusCode::UNAUTHORIZED,
      Error::StoreTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
      Error::Store(e) => {
        tracing::error!(error = %e, "credential lookup failed");
        StatusCode::INTERNAL_SERVER_ERROR
      }
    };
    let body = json!({ "error": self.to_string(), "kind": self.kind() });
    let mut res = (status, Json(body)).into_response();
    if status == StatusCode::UNAUTHORIZED {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"accolade\""),
      );
    }
    res
  }
}
