//! Identity records consumed by the workflow: users, student and lecturer
//! profiles, and the acting principal.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role attached to a user account.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  Admin,
  Lecturer,
  Student,
}

/// A login account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub user_id:  Uuid,
  pub username: String,
  pub role:     Role,
}

/// A user together with the PHC string of their password hash.
#[derive(Debug, Clone)]
pub struct UserCredentials {
  pub user:          User,
  pub password_hash: String,
}

/// The authenticated caller of a workflow operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
  pub user_id: Uuid,
  pub role:    Role,
}

impl From<&User> for Principal {
  fn from(user: &User) -> Self {
    Self { user_id: user.user_id, role: user.role }
  }
}

/// A student profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
  pub id:             Uuid,
  pub user_id:        Uuid,
  /// Institutional identifying number.
  pub student_number: String,
  pub program:        String,
  pub academic_year:  String,
  /// The lecturer currently advising this student, if any.
  pub advisor_id:     Option<Uuid>,
  /// Cumulative points credited by verified achievements.
  pub total_points:   i64,
}

/// A lecturer profile. Lecturers act as academic advisors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lecturer {
  pub id:              Uuid,
  pub user_id:         Uuid,
  pub lecturer_number: String,
  pub department:      String,
}
