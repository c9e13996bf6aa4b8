//! JSON REST API for Accolade.
//!
//! Exposes an axum [`Router`] over a [`Workflow`]. Authentication is the
//! caller's responsibility: whoever mounts the router must attach the
//! authenticated [`Principal`] to each request as an extension.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", accolade_api::api_router(workflow.clone()))
//! ```

pub mod achievements;
pub mod error;

use accolade_core::{
  Workflow,
  identity::Principal,
  store::{DocumentStore, RelationalStore},
};
use axum::{
  Router,
  extract::FromRequestParts,
  http::request::Parts,
  routing::{get, post},
};

pub use error::ApiError;

/// Extracts the [`Principal`] attached by the authentication layer.
///
/// Rejects with `401` if none is present.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Principal);

impl<S> FromRequestParts<S> for Caller
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    parts
      .extensions
      .get::<Principal>()
      .copied()
      .map(Caller)
      .ok_or(ApiError::Unauthenticated)
  }
}

/// Build a fully-materialised API router for `workflow`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<R, D>(workflow: Workflow<R, D>) -> Router<()>
where
  R: RelationalStore + 'static,
  D: DocumentStore + 'static,
{
  Router::new()
    .route(
      "/achievements",
      get(achievements::list::<R, D>).post(achievements::create::<R, D>),
    )
    .route(
      "/achievements/{id}",
      get(achievements::get_one::<R, D>)
        .put(achievements::update::<R, D>)
        .delete(achievements::delete::<R, D>),
    )
    .route("/achievements/{id}/submit", post(achievements::submit::<R, D>))
    .route("/achievements/{id}/verify", post(achievements::verify::<R, D>))
    .route("/achievements/{id}/reject", post(achievements::reject::<R, D>))
    .route(
      "/achievements/{id}/attachments",
      post(achievements::add_attachment::<R, D>),
    )
    .route("/achievements/{id}/history", get(achievements::history::<R, D>))
    .with_state(workflow)
}
