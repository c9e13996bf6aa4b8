//! [`SqliteStore`], the SQLite implementation of [`RelationalStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use accolade_core::{
  achievement::{AchievementReference, StatusChange, StatusEvent},
  identity::{Lecturer, Role, Student, User, UserCredentials},
  points::PointAward,
  status::AchievementStatus,
  store::RelationalStore,
};

use crate::{
  encode::{
    encode_dt, encode_uuid, RawAward, RawEvent, RawLecturer, RawReference, RawStudent,
    RawUser, REFERENCE_COLUMNS, STUDENT_COLUMNS,
  },
  schema::RELATIONAL_SCHEMA,
  Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The relational half of Accolade: identity, achievement references, status
/// history and the points ledger, in a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store; useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(RELATIONAL_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_references(
    &self,
    sql: String,
    params: Vec<String>,
  ) -> Result<Vec<AchievementReference>> {
    let raws: Vec<RawReference> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawReference::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawReference::into_reference).collect()
  }

  async fn query_student(&self, column: &'static str, id: Uuid) -> Result<Option<Student>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawStudent> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students s WHERE s.{column} = ?1");
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawStudent::from_row)
            .optional()?,
        )
      })
      .await?;
    raw.map(RawStudent::into_student).transpose()
  }

  // ── Provisioning ──────────────────────────────────────────────────────

  /// Create a login account. `password_hash` must be an argon2 PHC string.
  pub async fn add_user(
    &self,
    username: impl Into<String>,
    password_hash: impl Into<String>,
    role: Role,
  ) -> Result<User> {
    let user = User { user_id: Uuid::new_v4(), username: username.into(), role };
    let id_str = encode_uuid(user.user_id);
    let username = user.username.clone();
    let hash = password_hash.into();
    let role_str = role.as_ref().to_owned();
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO users (user_id, username, password_hash, role, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, username, hash, role_str, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(user)
  }

  /// Attach a student profile to an existing user. The student starts with
  /// no advisor and zero points.
  pub async fn add_student(
    &self,
    user_id: Uuid,
    student_number: impl Into<String>,
    program: impl Into<String>,
    academic_year: impl Into<String>,
  ) -> Result<Student> {
    let student = Student {
      id:             Uuid::new_v4(),
      user_id,
      student_number: student_number.into(),
      program:        program.into(),
      academic_year:  academic_year.into(),
      advisor_id:     None,
      total_points:   0,
    };
    let id_str = encode_uuid(student.id);
    let user_str = encode_uuid(user_id);
    let number = student.student_number.clone();
    let program = student.program.clone();
    let year = student.academic_year.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO students (student_id, user_id, student_number, program, academic_year)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, user_str, number, program, year],
        )?;
        Ok(())
      })
      .await?;
    Ok(student)
  }

  /// Attach a lecturer profile to an existing user.
  pub async fn add_lecturer(
    &self,
    user_id: Uuid,
    lecturer_number: impl Into<String>,
    department: impl Into<String>,
  ) -> Result<Lecturer> {
    let lecturer = Lecturer {
      id: Uuid::new_v4(),
      user_id,
      lecturer_number: lecturer_number.into(),
      department: department.into(),
    };
    let id_str = encode_uuid(lecturer.id);
    let user_str = encode_uuid(user_id);
    let number = lecturer.lecturer_number.clone();
    let department = lecturer.department.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO lecturers (lecturer_id, user_id, lecturer_number, department)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, user_str, number, department],
        )?;
        Ok(())
      })
      .await?;
    Ok(lecturer)
  }

  /// Set or clear a student's advisor. Returns `false` if the student does
  /// not exist.
  pub async fn assign_advisor(&self, student_id: Uuid, lecturer_id: Option<Uuid>) -> Result<bool> {
    let student_str = encode_uuid(student_id);
    let lecturer_str = lecturer_id.map(encode_uuid);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE students SET advisor_id = ?1 WHERE student_id = ?2",
          rusqlite::params![lecturer_str, student_str],
        )?)
      })
      .await?;
    Ok(changed == 1)
  }

  /// The ledger entry for a reference, if it has been credited.
  pub async fn award_for(&self, reference_id: Uuid) -> Result<Option<PointAward>> {
    let id_str = encode_uuid(reference_id);
    let raw: Option<RawAward> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT reference_id, student_id, points, awarded_at
               FROM point_awards WHERE reference_id = ?1",
              rusqlite::params![id_str],
              |r| {
                Ok(RawAward {
                  reference_id: r.get(0)?,
                  student_id:   r.get(1)?,
                  points:       r.get(2)?,
                  awarded_at:   r.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawAward::into_award).transpose()
  }
}

// ─── RelationalStore impl ────────────────────────────────────────────────────

impl RelationalStore for SqliteStore {
  type Error = crate::Error;

  async fn find_credentials(&self, username: String) -> Result<Option<UserCredentials>> {
    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT user_id, username, password_hash, role FROM users WHERE username = ?1",
              rusqlite::params![username],
              |r| {
                Ok(RawUser {
                  user_id:       r.get(0)?,
                  username:      r.get(1)?,
                  password_hash: r.get(2)?,
                  role:          r.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawUser::into_credentials).transpose()
  }

  async fn student_by_user(&self, user_id: Uuid) -> Result<Option<Student>> {
    self.query_student("user_id", user_id).await
  }

  async fn lecturer_by_user(&self, user_id: Uuid) -> Result<Option<Lecturer>> {
    let id_str = encode_uuid(user_id);
    let raw: Option<RawLecturer> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT lecturer_id, user_id, lecturer_number, department
               FROM lecturers WHERE user_id = ?1",
              rusqlite::params![id_str],
              |r| {
                Ok(RawLecturer {
                  lecturer_id:     r.get(0)?,
                  user_id:         r.get(1)?,
                  lecturer_number: r.get(2)?,
                  department:      r.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawLecturer::into_lecturer).transpose()
  }

  async fn get_student(&self, id: Uuid) -> Result<Option<Student>> {
    self.query_student("student_id", id).await
  }

  async fn list_advisees(&self, lecturer_id: Uuid) -> Result<Vec<Student>> {
    let id_str = encode_uuid(lecturer_id);
    let raws: Vec<RawStudent> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {STUDENT_COLUMNS} FROM students s
           WHERE s.advisor_id = ?1 ORDER BY s.student_number"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawStudent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawStudent::into_student).collect()
  }

  async fn insert_reference(&self, reference: AchievementReference) -> Result<()> {
    let id_str = encode_uuid(reference.id);
    let student_str = encode_uuid(reference.student_id);
    let detail_str = encode_uuid(reference.detail_id);
    let status_str = reference.status.as_ref().to_owned();
    let submitted_str = reference.submitted_at.map(encode_dt);
    let verified_str = reference.verified_at.map(encode_dt);
    let verified_by_str = reference.verified_by.map(encode_uuid);
    let note = reference.rejection_note;
    let created_str = encode_dt(reference.created_at);
    let updated_str = encode_dt(reference.updated_at);
    let event_str = encode_uuid(Uuid::new_v4());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO achievement_references
             (reference_id, student_id, detail_id, status, submitted_at,
              verified_at, verified_by, rejection_note, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            id_str,
            student_str,
            detail_str,
            status_str,
            submitted_str,
            verified_str,
            verified_by_str,
            note,
            created_str,
            updated_str,
          ],
        )?;
        // The creation event is attributed to the owning student profile.
        tx.execute(
          "INSERT INTO status_events
             (event_id, reference_id, from_status, to_status, actor, note, recorded_at)
           VALUES (?1, ?2, NULL, ?3, ?4, NULL, ?5)",
          rusqlite::params![event_str, id_str, status_str, student_str, created_str],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn find_reference(&self, id: Uuid) -> Result<Option<AchievementReference>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawReference> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {REFERENCE_COLUMNS} FROM achievement_references r WHERE r.reference_id = ?1"
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawReference::from_row)
            .optional()?,
        )
      })
      .await?;
    raw.map(RawReference::into_reference).transpose()
  }

  async fn find_references_by_student(
    &self,
    student_id: Uuid,
  ) -> Result<Vec<AchievementReference>> {
    let sql = format!(
      "SELECT {REFERENCE_COLUMNS} FROM achievement_references r
       WHERE r.student_id = ?1 ORDER BY r.created_at, r.rowid"
    );
    self.query_references(sql, vec![encode_uuid(student_id)]).await
  }

  async fn find_all_references(&self) -> Result<Vec<AchievementReference>> {
    let sql = format!(
      "SELECT {REFERENCE_COLUMNS} FROM achievement_references r ORDER BY r.created_at, r.rowid"
    );
    self.query_references(sql, Vec::new()).await
  }

  async fn find_references_by_advisor(
    &self,
    lecturer_id: Uuid,
    statuses: Vec<AchievementStatus>,
  ) -> Result<Vec<AchievementReference>> {
    if statuses.is_empty() {
      return Ok(Vec::new());
    }
    let placeholders = (0..statuses.len())
      .map(|i| format!("?{}", i + 2))
      .collect::<Vec<_>>()
      .join(", ");
    let sql = format!(
      "SELECT {REFERENCE_COLUMNS} FROM achievement_references r
       JOIN students s ON s.student_id = r.student_id
       WHERE s.advisor_id = ?1 AND r.status IN ({placeholders})
       ORDER BY r.created_at, r.rowid"
    );
    let mut params = vec![encode_uuid(lecturer_id)];
    params.extend(statuses.iter().map(|s| s.as_ref().to_owned()));
    self.query_references(sql, params).await
  }

  async fn update_if_status(&self, id: Uuid, change: StatusChange) -> Result<u64> {
    let id_str = encode_uuid(id);
    let from_str = change.from.as_ref().to_owned();
    let to_str = change.to.as_ref().to_owned();
    let at_str = encode_dt(change.at);
    let actor_str = encode_uuid(change.actor);
    let verified_by_str = change.verified_by.map(encode_uuid);
    let note = change.rejection_note;
    let event_str = encode_uuid(Uuid::new_v4());

    let affected = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let affected = tx.execute(
          "UPDATE achievement_references SET
             status         = ?1,
             updated_at     = ?2,
             submitted_at   = CASE WHEN ?1 = 'submitted'
                                THEN COALESCE(submitted_at, ?2) ELSE submitted_at END,
             verified_at    = CASE WHEN ?1 = 'verified' THEN ?2 ELSE verified_at END,
             verified_by    = COALESCE(?3, verified_by),
             rejection_note = COALESCE(?4, rejection_note)
           WHERE reference_id = ?5 AND status = ?6",
          rusqlite::params![to_str, at_str, verified_by_str, note, id_str, from_str],
        )?;
        if affected == 1 {
          tx.execute(
            "INSERT INTO status_events
               (event_id, reference_id, from_status, to_status, actor, note, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![event_str, id_str, from_str, to_str, actor_str, note, at_str],
          )?;
        }
        tx.commit()?;
        Ok(affected)
      })
      .await?;
    Ok(affected as u64)
  }

  async fn status_history(&self, id: Uuid) -> Result<Vec<StatusEvent>> {
    let id_str = encode_uuid(id);
    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT event_id, reference_id, from_status, to_status, actor, note, recorded_at
           FROM status_events WHERE reference_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |r| {
            Ok(RawEvent {
              event_id:     r.get(0)?,
              reference_id: r.get(1)?,
              from_status:  r.get(2)?,
              to_status:    r.get(3)?,
              actor:        r.get(4)?,
              note:         r.get(5)?,
              recorded_at:  r.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn add_points(&self, student_id: Uuid, delta: i64) -> Result<bool> {
    let id_str = encode_uuid(student_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(increment_points(conn, &id_str, delta)?)
      })
      .await?;
    Ok(changed == 1)
  }

  async fn award_points(&self, award: PointAward) -> Result<bool> {
    let reference_str = encode_uuid(award.reference_id);
    let student_str = encode_uuid(award.student_id);
    let points = i64::from(award.points);
    let awarded_str = encode_dt(award.awarded_at);

    let credited = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let inserted = tx.execute(
          "INSERT INTO point_awards (reference_id, student_id, points, awarded_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(reference_id) DO NOTHING",
          rusqlite::params![reference_str, student_str, points, awarded_str],
        )?;
        if inserted == 1 {
          increment_points(&tx, &student_str, points)?;
        }
        tx.commit()?;
        Ok(inserted == 1)
      })
      .await?;

    if !credited {
      tracing::debug!(reference = %award.reference_id, "award already recorded");
    }
    Ok(credited)
  }

  async fn unawarded_verified(&self) -> Result<Vec<AchievementReference>> {
    let sql = format!(
      "SELECT {REFERENCE_COLUMNS} FROM achievement_references r
       LEFT JOIN point_awards a ON a.reference_id = r.reference_id
       WHERE r.status = 'verified' AND a.reference_id IS NULL
       ORDER BY r.verified_at, r.rowid"
    );
    self.query_references(sql, Vec::new()).await
  }
}

/// The only statement that changes `students.total_points`. Returns the
/// number of student rows touched.
fn increment_points(
  conn: &rusqlite::Connection,
  student_id: &str,
  delta: i64,
) -> rusqlite::Result<usize> {
  conn.execute(
    "UPDATE students SET total_points = total_points + ?1 WHERE student_id = ?2",
    rusqlite::params![delta, student_id],
  )
}
