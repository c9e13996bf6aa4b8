//! Store traits consumed by the workflow.
//!
//! Two independent backends: a relational store (identity, references, status
//! history, point ledger) that is authoritative for workflow state, and a
//! document store holding achievement content. There is no transaction
//! spanning both.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  achievement::{AchievementReference, StatusChange, StatusEvent},
  detail::{AchievementDetail, Attachment, DetailFields},
  identity::{Lecturer, Student, UserCredentials},
  points::PointAward,
  status::AchievementStatus,
};

// ─── Relational store ────────────────────────────────────────────────────────

pub trait RelationalStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Identity ──────────────────────────────────────────────────────────

  /// Look up a login account by username.
  fn find_credentials(
    &self,
    username: String,
  ) -> impl Future<Output = Result<Option<UserCredentials>, Self::Error>> + Send + '_;

  /// Resolve the student profile of a user.
  fn student_by_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + '_;

  /// Resolve the lecturer profile of a user.
  fn lecturer_by_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<Lecturer>, Self::Error>> + Send + '_;

  fn get_student(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + '_;

  /// Students whose current advisor is `lecturer_id`.
  fn list_advisees(
    &self,
    lecturer_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Student>, Self::Error>> + Send + '_;

  // ── References ────────────────────────────────────────────────────────

  /// Persist a new reference and its creation [`StatusEvent`].
  fn insert_reference(
    &self,
    reference: AchievementReference,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn find_reference(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<AchievementReference>, Self::Error>> + Send + '_;

  fn find_references_by_student(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AchievementReference>, Self::Error>> + Send + '_;

  fn find_all_references(
    &self,
  ) -> impl Future<Output = Result<Vec<AchievementReference>, Self::Error>> + Send + '_;

  /// References owned by the current advisees of `lecturer_id`, restricted
  /// to `statuses`.
  fn find_references_by_advisor(
    &self,
    lecturer_id: Uuid,
    statuses: Vec<AchievementStatus>,
  ) -> impl Future<Output = Result<Vec<AchievementReference>, Self::Error>> + Send + '_;

  /// Apply `change` only if the stored status equals `change.from`.
  ///
  /// Returns the number of rows affected: `1` if the transition happened,
  /// `0` if the reference is missing or its status has moved on.
  fn update_if_status(
    &self,
    id: Uuid,
    change: StatusChange,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Status history of a reference, oldest first.
  fn status_history(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Vec<StatusEvent>, Self::Error>> + Send + '_;

  // ── Points ledger ─────────────────────────────────────────────────────

  /// Atomically add `delta` to a student's cumulative points. Returns
  /// `false` if the student does not exist.
  fn add_points(
    &self,
    student_id: Uuid,
    delta: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Record `award` and credit its points, keyed by `award.reference_id`.
  ///
  /// Returns `false` without crediting if the reference was already
  /// awarded.
  fn award_points(
    &self,
    award: PointAward,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// `verified` references that have no award recorded.
  fn unawarded_verified(
    &self,
  ) -> impl Future<Output = Result<Vec<AchievementReference>, Self::Error>> + Send + '_;
}

// ─── Document store ──────────────────────────────────────────────────────────

pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn insert_detail(
    &self,
    detail: AchievementDetail,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Retrieve a detail. Discarded documents are reported as missing.
  fn find_detail(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<AchievementDetail>, Self::Error>> + Send + '_;

  /// Overwrite the mutable fields. Returns `false` if the document is
  /// missing.
  fn replace_fields(
    &self,
    id: Uuid,
    fields: DetailFields,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Push onto the attachment list. Returns `false` if the document is
  /// missing.
  fn append_attachment(
    &self,
    id: Uuid,
    attachment: Attachment,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Mark a document as discarded (soft delete). Used to compensate a
  /// failed create.
  fn discard(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
