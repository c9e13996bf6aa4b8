//! The relational achievement reference and its status history.
//!
//! The reference is authoritative for workflow state. Content lives in the
//! detail document it points to (see [`crate::detail`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{detail::AchievementDetail, status::AchievementStatus};

/// Relational record tracking an achievement's lifecycle and ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementReference {
  pub id:             Uuid,
  /// Owning student profile; immutable.
  pub student_id:     Uuid,
  /// The detail document created together with this reference; never
  /// repointed.
  pub detail_id:      Uuid,
  pub status:         AchievementStatus,
  /// First submission time. Kept through rejection and resubmission.
  pub submitted_at:   Option<DateTime<Utc>>,
  pub verified_at:    Option<DateTime<Utc>>,
  pub verified_by:    Option<Uuid>,
  /// Text of the most recent rejection.
  pub rejection_note: Option<String>,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
}

impl AchievementReference {
  /// A fresh `draft` reference pointing at `detail_id`.
  pub fn draft(student_id: Uuid, detail_id: Uuid, now: DateTime<Utc>) -> Self {
    Self {
      id: Uuid::new_v4(),
      student_id,
      detail_id,
      status: AchievementStatus::Draft,
      submitted_at: None,
      verified_at: None,
      verified_by: None,
      rejection_note: None,
      created_at: now,
      updated_at: now,
    }
  }
}

/// A conditional status update: applied only while the stored status still
/// equals `from`.
///
/// Backends apply it as follows:
/// - `status = to`, `updated_at = at`;
/// - entering `submitted` sets `submitted_at` only if it is still unset;
/// - entering `verified` sets `verified_at = at` and `verified_by`;
/// - `rejection_note`, when present, overwrites the stored note;
/// - a [`StatusEvent`] is appended in the same transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
  pub from:           AchievementStatus,
  pub to:             AchievementStatus,
  pub actor:          Uuid,
  pub at:             DateTime<Utc>,
  pub verified_by:    Option<Uuid>,
  pub rejection_note: Option<String>,
}

impl StatusChange {
  pub fn new(
    from: AchievementStatus,
    to: AchievementStatus,
    actor: Uuid,
    at: DateTime<Utc>,
  ) -> Self {
    Self { from, to, actor, at, verified_by: None, rejection_note: None }
  }
}

/// One entry of a reference's append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
  pub event_id:     Uuid,
  pub reference_id: Uuid,
  /// `None` for the creation event.
  pub from:         Option<AchievementStatus>,
  pub to:           AchievementStatus,
  pub actor:        Uuid,
  pub note:         Option<String>,
  pub at:           DateTime<Utc>,
}

/// A reference joined with its detail document on demand.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleAchievement {
  pub reference: AchievementReference,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub detail:    Option<AchievementDetail>,
}
