//! Handlers for `/achievements` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/achievements` | Visible to the caller; `?details=true` joins detail documents |
//! | `POST`   | `/achievements` | Student only. Body: [`DetailPayload`]; returns 201 + reference |
//! | `GET`    | `/achievements/{id}` | Reference and detail; 404 if not visible |
//! | `PUT`    | `/achievements/{id}` | Owner only, while `draft` or `rejected` |
//! | `DELETE` | `/achievements/{id}` | Owner only, while `draft`; returns 204 |
//! | `POST`   | `/achievements/{id}/submit` | Owner only |
//! | `POST`   | `/achievements/{id}/verify` | Advisor only; returns the point award |
//! | `POST`   | `/achievements/{id}/reject` | Advisor only. Body: `{"note":"..."}` |
//! | `POST`   | `/achievements/{id}/attachments` | Owner only, while `draft`. Body: [`NewAttachment`] |
//! | `GET`    | `/achievements/{id}/history` | Status history, oldest first |

use accolade_core::{
  Workflow,
  achievement::{AchievementReference, StatusEvent, VisibleAchievement},
  detail::{DetailPayload, NewAttachment},
  points::PointAward,
  store::{DocumentStore, RelationalStore},
};
use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{Caller, error::ApiError};

// ─── Queries ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Join each reference with its detail document. Default `false`.
  #[serde(default)]
  pub details: bool,
}

/// `GET /achievements[?details=true]`
pub async fn list<R, D>(
  State(workflow): State<Workflow<R, D>>,
  Caller(principal): Caller,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<VisibleAchievement>>, ApiError>
where
  R: RelationalStore,
  D: DocumentStore,
{
  Ok(Json(workflow.visible(principal, params.details).await?))
}

/// `GET /achievements/{id}`
pub async fn get_one<R, D>(
  State(workflow): State<Workflow<R, D>>,
  Caller(principal): Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<VisibleAchievement>, ApiError>
where
  R: RelationalStore,
  D: DocumentStore,
{
  Ok(Json(workflow.get_one(principal, id).await?))
}

/// `GET /achievements/{id}/history`
pub async fn history<R, D>(
  State(workflow): State<Workflow<R, D>>,
  Caller(principal): Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<StatusEvent>>, ApiError>
where
  R: RelationalStore,
  D: DocumentStore,
{
  Ok(Json(workflow.history(principal, id).await?))
}

// ─── Student commands ─────────────────────────────────────────────────────────

/// `POST /achievements`
pub async fn create<R, D>(
  State(workflow): State<Workflow<R, D>>,
  Caller(principal): Caller,
  Json(payload): Json<DetailPayload>,
) -> Result<impl IntoResponse, ApiError>
where
  R: RelationalStore,
  D: DocumentStore,
{
  let student = workflow.acting_student(principal).await?;
  let reference: AchievementReference = workflow.create(student.id, payload).await?;
  Ok((StatusCode::CREATED, Json(reference)))
}

/// `PUT /achievements/{id}`
pub async fn update<R, D>(
  State(workflow): State<Workflow<R, D>>,
  Caller(principal): Caller,
  Path(id): Path<Uuid>,
  Json(payload): Json<DetailPayload>,
) -> Result<Json<VisibleAchievement>, ApiError>
where
  R: RelationalStore,
  D: DocumentStore,
{
  let student = workflow.acting_student(principal).await?;
  workflow.update(id, student.id, payload).await?;
  Ok(Json(workflow.get_one(principal, id).await?))
}

/// `DELETE /achievements/{id}`
pub async fn delete<R, D>(
  State(workflow): State<Workflow<R, D>>,
  Caller(principal): Caller,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  R: RelationalStore,
  D: DocumentStore,
{
  let student = workflow.acting_student(principal).await?;
  workflow.delete(id, student.id).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /achievements/{id}/submit`
pub async fn submit<R, D>(
  State(workflow): State<Workflow<R, D>>,
  Caller(principal): Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<VisibleAchievement>, ApiError>
where
  R: RelationalStore,
  D: DocumentStore,
{
  let student = workflow.acting_student(principal).await?;
  workflow.submit(id, student.id).await?;
  Ok(Json(workflow.get_one(principal, id).await?))
}

/// `POST /achievements/{id}/attachments`
pub async fn add_attachment<R, D>(
  State(workflow): State<Workflow<R, D>>,
  Caller(principal): Caller,
  Path(id): Path<Uuid>,
  Json(attachment): Json<NewAttachment>,
) -> Result<Json<VisibleAchievement>, ApiError>
where
  R: RelationalStore,
  D: DocumentStore,
{
  let student = workflow.acting_student(principal).await?;
  workflow.add_attachment(id, student.id, attachment).await?;
  Ok(Json(workflow.get_one(principal, id).await?))
}

// ─── Advisor commands ─────────────────────────────────────────────────────────

/// `POST /achievements/{id}/verify`
pub async fn verify<R, D>(
  State(workflow): State<Workflow<R, D>>,
  Caller(principal): Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<PointAward>, ApiError>
where
  R: RelationalStore,
  D: DocumentStore,
{
  Ok(Json(workflow.verify(id, principal.user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
  pub note: String,
}

/// `POST /achievements/{id}/reject`; body: `{"note":"..."}`
pub async fn reject<R, D>(
  State(workflow): State<Workflow<R, D>>,
  Caller(principal): Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<RejectBody>,
) -> Result<Json<VisibleAchievement>, ApiError>
where
  R: RelationalStore,
  D: DocumentStore,
{
  workflow.reject(id, principal.user_id, body.note).await?;
  Ok(Json(workflow.get_one(principal, id).await?))
}
