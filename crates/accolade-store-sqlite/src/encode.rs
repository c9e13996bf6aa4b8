//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. UUIDs are stored as
//! hyphenated lowercase strings. Enums are stored in their snake_case form.

use std::str::FromStr;

use accolade_core::{
  achievement::{AchievementReference, StatusEvent},
  identity::{Lecturer, Role, Student, User, UserCredentials},
  points::PointAward,
  status::AchievementStatus,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_status(s: &str) -> Result<AchievementStatus> {
  AchievementStatus::from_str(s).map_err(|_| Error::UnknownValue {
    column: "status",
    value:  s.to_owned(),
  })
}

pub fn decode_role(s: &str) -> Result<Role> {
  Role::from_str(s).map_err(|_| Error::UnknownValue {
    column: "role",
    value:  s.to_owned(),
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const REFERENCE_COLUMNS: &str = "r.reference_id, r.student_id, r.detail_id, r.status, \
   r.submitted_at, r.verified_at, r.verified_by, r.rejection_note, \
   r.created_at, r.updated_at";

/// Raw strings read directly from an `achievement_references` row.
pub struct RawReference {
  pub reference_id:   String,
  pub student_id:     String,
  pub detail_id:      String,
  pub status:         String,
  pub submitted_at:   Option<String>,
  pub verified_at:    Option<String>,
  pub verified_by:    Option<String>,
  pub rejection_note: Option<String>,
  pub created_at:     String,
  pub updated_at:     String,
}

impl RawReference {
  /// Map a row selected with [`REFERENCE_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      reference_id:   row.get(0)?,
      student_id:     row.get(1)?,
      detail_id:      row.get(2)?,
      status:         row.get(3)?,
      submitted_at:   row.get(4)?,
      verified_at:    row.get(5)?,
      verified_by:    row.get(6)?,
      rejection_note: row.get(7)?,
      created_at:     row.get(8)?,
      updated_at:     row.get(9)?,
    })
  }

  pub fn into_reference(self) -> Result<AchievementReference> {
    Ok(AchievementReference {
      id:             decode_uuid(&self.reference_id)?,
      student_id:     decode_uuid(&self.student_id)?,
      detail_id:      decode_uuid(&self.detail_id)?,
      status:         decode_status(&self.status)?,
      submitted_at:   decode_opt_dt(self.submitted_at)?,
      verified_at:    decode_opt_dt(self.verified_at)?,
      verified_by:    decode_opt_uuid(self.verified_by)?,
      rejection_note: self.rejection_note,
      created_at:     decode_dt(&self.created_at)?,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}

pub const STUDENT_COLUMNS: &str = "s.student_id, s.user_id, s.student_number, \
   s.program, s.academic_year, s.advisor_id, s.total_points";

/// Raw strings read directly from a `students` row.
pub struct RawStudent {
  pub student_id:     String,
  pub user_id:        String,
  pub student_number: String,
  pub program:        String,
  pub academic_year:  String,
  pub advisor_id:     Option<String>,
  pub total_points:   i64,
}

impl RawStudent {
  /// Map a row selected with [`STUDENT_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      student_id:     row.get(0)?,
      user_id:        row.get(1)?,
      student_number: row.get(2)?,
      program:        row.get(3)?,
      academic_year:  row.get(4)?,
      advisor_id:     row.get(5)?,
      total_points:   row.get(6)?,
    })
  }

  pub fn into_student(self) -> Result<Student> {
    Ok(Student {
      id:             decode_uuid(&self.student_id)?,
      user_id:        decode_uuid(&self.user_id)?,
      student_number: self.student_number,
      program:        self.program,
      academic_year:  self.academic_year,
      advisor_id:     decode_opt_uuid(self.advisor_id)?,
      total_points:   self.total_points,
    })
  }
}

/// Raw strings read directly from a `lecturers` row.
pub struct RawLecturer {
  pub lecturer_id:     String,
  pub user_id:         String,
  pub lecturer_number: String,
  pub department:      String,
}

impl RawLecturer {
  pub fn into_lecturer(self) -> Result<Lecturer> {
    Ok(Lecturer {
      id:              decode_uuid(&self.lecturer_id)?,
      user_id:         decode_uuid(&self.user_id)?,
      lecturer_number: self.lecturer_number,
      department:      self.department,
    })
  }
}

/// Raw strings read directly from a `users` row.
pub struct RawUser {
  pub user_id:       String,
  pub username:      String,
  pub password_hash: String,
  pub role:          String,
}

impl RawUser {
  pub fn into_credentials(self) -> Result<UserCredentials> {
    Ok(UserCredentials {
      user:          User {
        user_id:  decode_uuid(&self.user_id)?,
        username: self.username,
        role:     decode_role(&self.role)?,
      },
      password_hash: self.password_hash,
    })
  }
}

/// Raw strings read directly from a `status_events` row.
pub struct RawEvent {
  pub event_id:     String,
  pub reference_id: String,
  pub from_status:  Option<String>,
  pub to_status:    String,
  pub actor:        String,
  pub note:         Option<String>,
  pub recorded_at:  String,
}

impl RawEvent {
  pub fn into_event(self) -> Result<StatusEvent> {
    Ok(StatusEvent {
      event_id:     decode_uuid(&self.event_id)?,
      reference_id: decode_uuid(&self.reference_id)?,
      from:         self.from_status.as_deref().map(decode_status).transpose()?,
      to:           decode_status(&self.to_status)?,
      actor:        decode_uuid(&self.actor)?,
      note:         self.note,
      at:           decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw strings read directly from a `point_awards` row.
pub struct RawAward {
  pub reference_id: String,
  pub student_id:   String,
  pub points:       i64,
  pub awarded_at:   String,
}

impl RawAward {
  pub fn into_award(self) -> Result<PointAward> {
    Ok(PointAward {
      reference_id: decode_uuid(&self.reference_id)?,
      student_id:   decode_uuid(&self.student_id)?,
      points:       u32::try_from(self.points).map_err(|_| Error::UnknownValue {
        column: "points",
        value:  self.points.to_string(),
      })?,
      awarded_at:   decode_dt(&self.awarded_at)?,
    })
  }
}
