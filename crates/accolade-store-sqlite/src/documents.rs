//! [`SqliteDocumentStore`], the SQLite implementation of [`DocumentStore`].
//!
//! Each detail is stored as one JSON document. Edits are single `UPDATE`
//! statements built on SQLite's JSON functions, so a field replacement or an
//! attachment push never needs a read-modify-write round trip.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use accolade_core::{
  detail::{AchievementDetail, Attachment, DetailFields},
  store::DocumentStore,
};

use crate::{
  encode::{encode_dt, encode_uuid},
  schema::DOCUMENT_SCHEMA,
  Result,
};

/// Achievement detail documents in their own SQLite file.
///
/// Kept on a separate connection from [`crate::SqliteStore`]; nothing
/// commits atomically across the two.
#[derive(Clone)]
pub struct SqliteDocumentStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteDocumentStore {
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

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
        conn.execute_batch(DOCUMENT_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Whether a document row exists, discarded or not.
  pub async fn contains(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let found = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM achievement_details WHERE detail_id = ?1",
              rusqlite::params![id_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(found)
  }
}

impl DocumentStore for SqliteDocumentStore {
  type Error = crate::Error;

  async fn insert_detail(&self, detail: AchievementDetail) -> Result<()> {
    let id_str = encode_uuid(detail.id);
    let student_id = detail.student_id.clone();
    let created_str = encode_dt(detail.created_at);
    let updated_str = encode_dt(detail.updated_at);
    let body = serde_json::to_string(&detail)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO achievement_details (detail_id, student_id, body, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, student_id, body, created_str, updated_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn find_detail(&self, id: Uuid) -> Result<Option<AchievementDetail>> {
    let id_str = encode_uuid(id);
    let body: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT body FROM achievement_details
               WHERE detail_id = ?1 AND discarded_at IS NULL",
              rusqlite::params![id_str],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
  }

  async fn replace_fields(
    &self,
    id: Uuid,
    fields: DetailFields,
    at: DateTime<Utc>,
  ) -> Result<bool> {
    let id_str = encode_uuid(id);
    let achievement_type = fields.achievement_type;
    let details_json = serde_json::to_string(&fields.details)?;
    let tags_json = serde_json::to_string(&fields.tags)?;
    let points = i64::from(fields.points);
    let at_json = serde_json::to_string(&at)?;
    let at_str = encode_dt(at);
    let title = fields.title;
    let description = fields.description;

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE achievement_details SET
             body = json_set(body,
               '$.achievementType', ?2,
               '$.title',           ?3,
               '$.description',     ?4,
               '$.details',         json(?5),
               '$.tags',            json(?6),
               '$.points',          ?7,
               '$.updatedAt',       json(?8)),
             updated_at = ?9
           WHERE detail_id = ?1 AND discarded_at IS NULL",
          rusqlite::params![
            id_str,
            achievement_type,
            title,
            description,
            details_json,
            tags_json,
            points,
            at_json,
            at_str,
          ],
        )?)
      })
      .await?;
    Ok(changed == 1)
  }

  async fn append_attachment(&self, id: Uuid, attachment: Attachment) -> Result<bool> {
    let id_str = encode_uuid(id);
    let at_json = serde_json::to_string(&attachment.uploaded_at)?;
    let at_str = encode_dt(attachment.uploaded_at);
    let attachment_json = serde_json::to_string(&attachment)?;

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE achievement_details SET
             body = json_set(
               json_insert(body, '$.attachments[#]', json(?2)),
               '$.updatedAt', json(?3)),
             updated_at = ?4
           WHERE detail_id = ?1 AND discarded_at IS NULL",
          rusqlite::params![id_str, attachment_json, at_json, at_str],
        )?)
      })
      .await?;
    Ok(changed == 1)
  }

  async fn discard(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let now_str = encode_dt(Utc::now());
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE achievement_details SET discarded_at = ?2
           WHERE detail_id = ?1 AND discarded_at IS NULL",
          rusqlite::params![id_str, now_str],
        )?)
      })
      .await?;
    if changed == 1 {
      tracing::info!(detail = %id, "discarded detail document");
    }
    Ok(changed == 1)
  }
}
