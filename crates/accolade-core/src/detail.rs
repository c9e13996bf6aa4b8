//! Detail documents: free-form achievement content.
//!
//! A detail is only mutated while its owning reference is `draft` or
//! `rejected`; the workflow enforces that, not the document store.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Type-specific details ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompetitionDetails {
  pub competition_name:  Option<String>,
  /// Free-text level, e.g. "National"; drives the point award.
  pub competition_level: Option<String>,
  pub rank:              Option<u32>,
  pub medal_type:        Option<String>,
  pub event_date:        Option<NaiveDate>,
  pub location:          Option<String>,
  pub organizer:         Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PublicationDetails {
  pub publication_type:  Option<String>,
  pub publication_title: Option<String>,
  pub authors:           Vec<String>,
  pub publisher:         Option<String>,
  pub issn:              Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrganizationDetails {
  pub organization_name: Option<String>,
  pub position:          Option<String>,
  pub start_date:        Option<NaiveDate>,
  pub end_date:          Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CertificationDetails {
  pub certification_name:   Option<String>,
  pub issued_by:            Option<String>,
  pub certification_number: Option<String>,
  pub valid_until:          Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AcademicDetails {
  pub event_date: Option<NaiveDate>,
  pub location:   Option<String>,
  pub organizer:  Option<String>,
  pub score:      Option<f64>,
}

/// Type-specific structured fields, tagged by achievement type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AchievementDetails {
  Competition(CompetitionDetails),
  Publication(PublicationDetails),
  Organization(OrganizationDetails),
  Certification(CertificationDetails),
  Academic(AcademicDetails),
  /// Any other achievement type; fields are kept as given.
  Other(Map<String, Value>),
}

const KNOWN_TYPES: [&str; 5] =
  ["competition", "publication", "organization", "certification", "academic"];

impl AchievementDetails {
  /// The achievement type discriminant. Matches the serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Competition(_) => "competition",
      Self::Publication(_) => "publication",
      Self::Organization(_) => "organization",
      Self::Certification(_) => "certification",
      Self::Academic(_) => "academic",
      Self::Other(_) => "other",
    }
  }

  /// Build from a free-form achievement type and its JSON fields. Type names
  /// are case-insensitive; unknown types become [`Self::Other`].
  pub fn from_parts(achievement_type: &str, data: Value) -> Result<Self> {
    let fields = match data {
      Value::Null => Map::new(),
      Value::Object(map) => map,
      _ => {
        return Err(Error::Validation("details must be a JSON object".into()));
      }
    };

    let tag = achievement_type.trim().to_ascii_lowercase();
    if !KNOWN_TYPES.contains(&tag.as_str()) {
      return Ok(Self::Other(fields));
    }

    let wrapped = serde_json::json!({ "type": tag, "data": fields });
    serde_json::from_value(wrapped)
      .map_err(|e| Error::Validation(format!("invalid {tag} details: {e}")))
  }

  /// The level/category field consulted by the point policy, if any.
  pub fn level(&self) -> Option<&str> {
    match self {
      Self::Competition(c) => c.competition_level.as_deref(),
      Self::Other(fields) => fields
        .get("competitionLevel")
        .or_else(|| fields.get("level"))
        .and_then(Value::as_str),
      _ => None,
    }
  }
}

// ─── Attachments ─────────────────────────────────────────────────────────────

/// Metadata of an evidence file. The file itself lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
  pub file_name:   String,
  pub file_url:    String,
  pub file_type:   String,
  pub uploaded_at: DateTime<Utc>,
}

/// Input to the add-attachment operation; `uploaded_at` is set by the
/// workflow.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttachment {
  pub file_name: String,
  pub file_url:  String,
  #[serde(default)]
  pub file_type: String,
}

impl NewAttachment {
  pub fn into_attachment(self, now: DateTime<Utc>) -> Result<Attachment> {
    if self.file_name.trim().is_empty() || self.file_url.trim().is_empty() {
      return Err(Error::Validation(
        "attachment fileName and fileUrl are required".into(),
      ));
    }
    Ok(Attachment {
      file_name:   self.file_name,
      file_url:    self.file_url,
      file_type:   self.file_type,
      uploaded_at: now,
    })
  }
}

// ─── Payload and validated fields ────────────────────────────────────────────

/// Caller-supplied achievement content, as accepted by create and update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailPayload {
  pub achievement_type: String,
  pub title:            String,
  #[serde(default)]
  pub description:      String,
  /// Claimed value of the achievement; must be a positive integer.
  #[serde(default)]
  pub points:           i64,
  #[serde(default)]
  pub details:          Value,
  #[serde(default)]
  pub tags:             Vec<String>,
}

/// The mutable fields of a detail document, after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailFields {
  /// The caller's type name, trimmed. Only its case-folded form selects the
  /// [`AchievementDetails`] variant.
  pub achievement_type: String,
  pub title:            String,
  pub description:      String,
  pub details:          AchievementDetails,
  pub tags:             BTreeSet<String>,
  pub points:           u32,
}

impl DetailPayload {
  pub fn validate(self) -> Result<DetailFields> {
    let title = self.title.trim();
    if title.is_empty() {
      return Err(Error::Validation("title is required".into()));
    }
    let achievement_type = self.achievement_type.trim();
    if achievement_type.is_empty() {
      return Err(Error::Validation("achievementType is required".into()));
    }
    let points = u32::try_from(self.points)
      .ok()
      .filter(|p| *p > 0)
      .ok_or_else(|| {
        Error::Validation(format!(
          "points must be a positive integer, got {}",
          self.points
        ))
      })?;

    let details = AchievementDetails::from_parts(achievement_type, self.details)?;
    let tags = self
      .tags
      .iter()
      .map(|t| t.trim())
      .filter(|t| !t.is_empty())
      .map(str::to_owned)
      .collect();

    Ok(DetailFields {
      achievement_type: achievement_type.to_owned(),
      title: title.to_owned(),
      description: self.description,
      details,
      tags,
      points,
    })
  }
}

// ─── Detail document ─────────────────────────────────────────────────────────

/// The document-store record holding an achievement's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementDetail {
  pub id:               Uuid,
  /// Denormalised owner id, in string form.
  pub student_id:       String,
  pub achievement_type: String,
  pub title:            String,
  pub description:      String,
  pub details:          AchievementDetails,
  /// Append-only; order is upload order.
  pub attachments:      Vec<Attachment>,
  pub tags:             BTreeSet<String>,
  pub points:           u32,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

impl AchievementDetail {
  /// A new document with a freshly generated id.
  pub fn new(student_id: Uuid, fields: DetailFields, now: DateTime<Utc>) -> Self {
    Self {
      id:               Uuid::new_v4(),
      student_id:       student_id.to_string(),
      achievement_type: fields.achievement_type,
      title:            fields.title,
      description:      fields.description,
      details:          fields.details,
      attachments:      Vec::new(),
      tags:             fields.tags,
      points:           fields.points,
      created_at:       now,
      updated_at:       now,
    }
  }

  /// Overwrite the mutable fields. Attachments are left untouched.
  pub fn apply(&mut self, fields: DetailFields, now: DateTime<Utc>) {
    self.achievement_type = fields.achievement_type;
    self.title = fields.title;
    self.description = fields.description;
    self.details = fields.details;
    self.tags = fields.tags;
    self.points = fields.points;
    self.updated_at = now;
  }
}
