//! HTTP server for Accolade.
//!
//! Mounts the [`accolade_api`] router under `/api` behind HTTP Basic
//! authentication against the users table of any [`RelationalStore`].

pub mod auth;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use accolade_core::{
  Workflow, WorkflowConfig,
  points::PointsPolicy,
  store::{DocumentStore, RelationalStore},
};
use axum::{Router, middleware, routing::get};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `ACCOLADE__*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                  String,
  pub port:                  u16,
  pub relational_store_path: PathBuf,
  pub document_store_path:   PathBuf,
  /// Upper bound on each individual store call, in milliseconds.
  pub store_timeout_ms:      u64,
  pub points:                PointsPolicy,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                  "127.0.0.1".to_string(),
      port:                  8080,
      relational_store_path: PathBuf::from("accolade.db"),
      document_store_path:   PathBuf::from("accolade-documents.db"),
      store_timeout_ms:      5_000,
      points:                PointsPolicy::default(),
    }
  }
}

impl ServerConfig {
  pub fn store_timeout(&self) -> Duration { Duration::from_millis(self.store_timeout_ms) }

  pub fn workflow_config(&self) -> WorkflowConfig {
    WorkflowConfig {
      store_timeout: self.store_timeout(),
      points:        self.points.clone(),
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the middleware.
pub struct AppState<R, D> {
  pub workflow: Workflow<R, D>,
  pub config:   Arc<ServerConfig>,
}

impl<R, D> Clone for AppState<R, D> {
  fn clone(&self) -> Self {
    Self {
      workflow: self.workflow.clone(),
      config:   Arc::clone(&self.config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router: `/health` unauthenticated, `/api/*`
/// behind Basic auth, everything traced.
pub fn router<R, D>(state: AppState<R, D>) -> Router
where
  R: RelationalStore + 'static,
  D: DocumentStore + 'static,
{
  let api = accolade_api::api_router(state.workflow.clone()).layer(
    middleware::from_fn_with_state(state.clone(), auth::require_principal::<R, D>),
  );

  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use super::*;

  use accolade_core::identity::{Role, Student};
  use accolade_store_sqlite::{SqliteDocumentStore, SqliteStore};
  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use rand_core::OsRng;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use uuid::Uuid;

  const PASSWORD: &str = "secret";

  struct TestApp {
    state:   AppState<SqliteStore, SqliteDocumentStore>,
    student: Student,
  }

  async fn make_app() -> TestApp {
    let relational = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let documents = Arc::new(SqliteDocumentStore::open_in_memory().await.unwrap());

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(PASSWORD.as_bytes(), &salt)
      .unwrap()
      .to_string();

    let user = relational.add_user("siti", hash.clone(), Role::Student).await.unwrap();
    let student = relational
      .add_student(user.user_id, "S-001", "Informatics", "2024")
      .await
      .unwrap();
    let advisor = relational.add_user("dosen", hash.clone(), Role::Lecturer).await.unwrap();
    let lecturer = relational.add_lecturer(advisor.user_id, "L-001", "CS").await.unwrap();
    relational.assign_advisor(student.id, Some(lecturer.id)).await.unwrap();
    relational.add_user("admin", hash, Role::Admin).await.unwrap();

    let config = ServerConfig::default();
    let workflow = Workflow::new(relational, documents, config.workflow_config());
    TestApp {
      state: AppState { workflow, config: Arc::new(config) },
      student,
    }
  }

  fn auth_header(user: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{PASSWORD}")))
  }

  async fn call(
    app: &TestApp,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
      builder = builder.header(header::AUTHORIZATION, auth_header(user));
    }
    let req = match body {
      Some(json) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router(app.state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
  }

  fn medal(level: &str) -> Value {
    json!({
      "achievementType": "competition",
      "title": "Gold Medal",
      "points": 10,
      "details": { "competitionName": "Gemastik", "competitionLevel": level },
      "tags": ["programming"],
    })
  }

  async fn create(app: &TestApp, level: &str) -> String {
    let (status, body) =
      call(app, "POST", "/api/achievements", Some("siti"), Some(medal(level))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_owned()
  }

  #[tokio::test]
  async fn health_needs_no_auth() {
    let app = make_app().await;
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = router(app.state.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn api_requires_credentials() {
    let app = make_app().await;
    let req = Request::builder()
      .uri("/api/achievements")
      .body(Body::empty())
      .unwrap();
    let resp = router(app.state.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));

    let req = Request::builder()
      .uri("/api/achievements")
      .header(
        header::AUTHORIZATION,
        format!("Basic {}", B64.encode("siti:wrong")),
      )
      .body(Body::empty())
      .unwrap();
    let resp = router(app.state.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn create_submit_verify_over_http() {
    let app = make_app().await;
    let id = create(&app, "National").await;

    let (status, body) =
      call(&app, "POST", &format!("/api/achievements/{id}/submit"), Some("siti"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["reference"]["status"], "submitted");

    let (status, body) =
      call(&app, "POST", &format!("/api/achievements/{id}/verify"), Some("dosen"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["points"], 30);

    let (status, body) =
      call(&app, "POST", &format!("/api/achievements/{id}/verify"), Some("dosen"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_state_transition");

    let student = app
      .state
      .workflow
      .relational()
      .get_student(app.student.id)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(student.total_points, 30);
  }

  #[tokio::test]
  async fn errors_carry_stable_kinds() {
    let app = make_app().await;
    let id = create(&app, "Campus").await;

    // Students cannot verify.
    let (status, body) =
      call(&app, "POST", &format!("/api/achievements/{id}/verify"), Some("siti"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");

    // Lecturers cannot create.
    let (status, body) =
      call(&app, "POST", "/api/achievements", Some("dosen"), Some(medal("Campus"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");

    let (status, body) = call(
      &app,
      "POST",
      "/api/achievements",
      Some("siti"),
      Some(json!({ "achievementType": "competition", "title": "  ", "points": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "validation_error");

    let (status, body) = call(
      &app,
      "GET",
      &format!("/api/achievements/{}", Uuid::new_v4()),
      Some("siti"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    // Drafts cannot be rejected.
    let (status, body) = call(
      &app,
      "POST",
      &format!("/api/achievements/{id}/reject"),
      Some("dosen"),
      Some(json!({ "note": "incomplete" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_state_transition");
  }

  #[tokio::test]
  async fn listing_respects_roles() {
    let app = make_app().await;
    let draft = create(&app, "Campus").await;
    let submitted = create(&app, "National").await;
    call(
      &app,
      "POST",
      &format!("/api/achievements/{submitted}/submit"),
      Some("siti"),
      None,
    )
    .await;

    let (status, body) =
      call(&app, "GET", "/api/achievements?details=true", Some("siti"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert!(body[0]["detail"].is_object());

    let (_, body) = call(&app, "GET", "/api/achievements", Some("dosen"), None).await;
    let ids: Vec<_> = body
      .as_array()
      .unwrap()
      .iter()
      .map(|v| v["reference"]["id"].as_str().unwrap().to_owned())
      .collect();
    assert_eq!(ids, vec![submitted]);
    assert!(body[0].get("detail").is_none());

    let (_, body) = call(&app, "GET", "/api/achievements", Some("admin"), None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, _) = call(
      &app,
      "DELETE",
      &format!("/api/achievements/{draft}"),
      Some("siti"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = call(&app, "GET", "/api/achievements", Some("siti"), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn edit_attach_and_history() {
    let app = make_app().await;
    let id = create(&app, "Campus").await;

    let (status, body) = call(
      &app,
      "POST",
      &format!("/api/achievements/{id}/attachments"),
      Some("siti"),
      Some(json!({ "fileName": "certificate.pdf", "fileUrl": "/uploads/certificate.pdf" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["detail"]["attachments"].as_array().unwrap().len(), 1);

    let (status, body) = call(
      &app,
      "PUT",
      &format!("/api/achievements/{id}"),
      Some("siti"),
      Some(medal("International")),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
      body["detail"]["details"]["data"]["competitionLevel"],
      "International"
    );
    assert_eq!(body["detail"]["attachments"].as_array().unwrap().len(), 1);

    call(&app, "POST", &format!("/api/achievements/{id}/submit"), Some("siti"), None).await;
    let (status, body) = call(
      &app,
      "POST",
      &format!("/api/achievements/{id}/reject"),
      Some("dosen"),
      Some(json!({ "note": "blurry scan" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["reference"]["rejectionNote"], "blurry scan");

    let (status, body) = call(
      &app,
      "GET",
      &format!("/api/achievements/{id}/history"),
      Some("siti"),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let statuses: Vec<_> = body
      .as_array()
      .unwrap()
      .iter()
      .map(|e| e["to"].as_str().unwrap().to_owned())
      .collect();
    assert_eq!(statuses, ["draft", "submitted", "rejected"]);
  }
}
