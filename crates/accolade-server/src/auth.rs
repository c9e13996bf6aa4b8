//! HTTP Basic authentication against the users table.
//!
//! A successful check attaches the caller's [`Principal`] to the request,
//! where [`accolade_api::Caller`] picks it up.

use std::time::Duration;

use accolade_core::{
  identity::Principal,
  store::{DocumentStore, RelationalStore},
};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::{Request, State},
  http::HeaderMap,
  middleware::Next,
  response::Response,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

use crate::{AppState, error::Error};

/// Split a `Basic` authorization header into username and password.
pub fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), Error> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(Error::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| Error::Unauthorized)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| Error::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;
  Ok((username.to_owned(), password.to_owned()))
}

/// Verify the request's Basic credentials and resolve the [`Principal`].
pub async fn verify_auth<R>(
  headers: &HeaderMap,
  store: &R,
  timeout: Duration,
) -> Result<Principal, Error>
where
  R: RelationalStore,
{
  let (username, password) = basic_credentials(headers)?;

  let creds = tokio::time::timeout(timeout, store.find_credentials(username.clone()))
    .await
    .map_err(|_| Error::StoreTimeout(timeout))?
    .map_err(|e| Error::Store(Box::new(e)))?
    .ok_or_else(|| {
      tracing::debug!(%username, "unknown user");
      Error::Unauthorized
    })?;

  let parsed_hash = PasswordHash::new(&creds.password_hash)
    .map_err(|_| Error::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| {
      tracing::debug!(%username, "password mismatch");
      Error::Unauthorized
    })?;

  Ok(Principal::from(&creds.user))
}

/// Middleware guarding the API: rejects with `401` unless the request carries
/// valid credentials.
pub async fn require_principal<R, D>(
  State(state): State<AppState<R, D>>,
  mut req: Request,
  next: Next,
) -> Result<Response, Error>
where
  R: RelationalStore + 'static,
  D: DocumentStore + 'static,
{
  let principal = verify_auth(
    req.headers(),
    state.workflow.relational().as_ref(),
    state.config.store_timeout(),
  )
  .await?;
  req.extensions_mut().insert(principal);
  Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
  use accolade_core::identity::Role;
  use accolade_store_sqlite::SqliteStore;
  use argon2::{PasswordHasher, password_hash::SaltString};
  use axum::http::{HeaderValue, header};
  use rand_core::OsRng;

  use super::*;

  const TIMEOUT: Duration = Duration::from_secs(5);

  async fn store_with(username: &str, password: &str, role: Role) -> SqliteStore {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string();
    store.add_user(username, hash, role).await.unwrap();
    store
  }

  fn headers(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    headers
  }

  fn basic(user: &str, pass: &str) -> String {
    let encoded = B64.encode(format!("{user}:{pass}"));
    format!("Basic {encoded}")
  }

  #[tokio::test]
  async fn correct_credentials_resolve_principal() {
    let store = store_with("dosen", "secret", Role::Lecturer).await;
    let principal = verify_auth(&headers(&basic("dosen", "secret")), &store, TIMEOUT)
      .await
      .unwrap();
    assert_eq!(principal.role, Role::Lecturer);

    let creds = store.find_credentials("dosen".into()).await.unwrap().unwrap();
    assert_eq!(principal.user_id, creds.user.user_id);
  }

  #[tokio::test]
  async fn wrong_password() {
    let store = store_with("dosen", "secret", Role::Lecturer).await;
    let result = verify_auth(&headers(&basic("dosen", "wrong")), &store, TIMEOUT).await;
    assert!(matches!(result, Err(Error::Unauthorized)));
  }

  #[tokio::test]
  async fn unknown_user() {
    let store = store_with("dosen", "secret", Role::Lecturer).await;
    let result = verify_auth(&headers(&basic("nobody", "secret")), &store, TIMEOUT).await;
    assert!(matches!(result, Err(Error::Unauthorized)));
  }

  #[tokio::test]
  async fn missing_header() {
    let store = store_with("dosen", "secret", Role::Lecturer).await;
    let result = verify_auth(&HeaderMap::new(), &store, TIMEOUT).await;
    assert!(matches!(result, Err(Error::Unauthorized)));
  }

  #[test]
  fn invalid_base64() {
    let result = basic_credentials(&headers("Basic !!!not-base64!!!"));
    assert!(matches!(result, Err(Error::Unauthorized)));
  }

  #[test]
  fn bearer_is_not_basic() {
    let result = basic_credentials(&headers("Bearer abc"));
    assert!(matches!(result, Err(Error::Unauthorized)));
  }
}
