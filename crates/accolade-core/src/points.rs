//! The tiered point policy and ledger award records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Recognised achievement levels, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AchievementLevel {
  International,
  National,
  #[strum(serialize = "provincial", serialize = "regional")]
  Provincial,
  #[strum(serialize = "campus", serialize = "local")]
  Campus,
}

/// Points credited on verification, by level. This is the only place the
/// level → points mapping lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointsPolicy {
  pub international: u32,
  pub national:      u32,
  pub provincial:    u32,
  pub campus:        u32,
  /// Awarded when the level is missing or unrecognised.
  pub default:       u32,
}

impl Default for PointsPolicy {
  fn default() -> Self {
    Self { international: 50, national: 30, provincial: 20, campus: 10, default: 5 }
  }
}

impl PointsPolicy {
  /// Reject tables that are not strictly descending or that award nothing for
  /// unrecognised levels.
  pub fn validate(&self) -> Result<()> {
    let tiers = [
      self.international,
      self.national,
      self.provincial,
      self.campus,
      self.default,
    ];
    if self.default == 0 {
      return Err(Error::Validation("default award must be non-zero".into()));
    }
    if tiers.windows(2).any(|w| w[0] <= w[1]) {
      return Err(Error::Validation(format!(
        "point tiers must be strictly descending, got {tiers:?}"
      )));
    }
    Ok(())
  }

  pub fn points_for(&self, level: Option<AchievementLevel>) -> u32 {
    match level {
      Some(AchievementLevel::International) => self.international,
      Some(AchievementLevel::National) => self.national,
      Some(AchievementLevel::Provincial) => self.provincial,
      Some(AchievementLevel::Campus) => self.campus,
      None => self.default,
    }
  }

  /// Points for a free-text level as found in a detail document.
  pub fn award_for(&self, level: Option<&str>) -> u32 {
    self.points_for(level.and_then(|l| l.trim().parse().ok()))
  }
}

/// A ledger credit, keyed by the reference that earned it. A reference is
/// credited at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointAward {
  pub reference_id: Uuid,
  pub student_id:   Uuid,
  pub points:       u32,
  pub awarded_at:   DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tiers_are_strictly_descending() {
    let policy = PointsPolicy::default();
    policy.validate().unwrap();
    let awards: Vec<u32> = [
      Some("International"),
      Some("National"),
      Some("Provincial"),
      Some("Campus"),
      None,
    ]
    .into_iter()
    .map(|l| policy.award_for(l))
    .collect();
    assert!(awards.windows(2).all(|w| w[0] > w[1]), "{awards:?}");
    assert!(*awards.last().unwrap() > 0);
  }

  #[test]
  fn national_awards_thirty() {
    assert_eq!(PointsPolicy::default().award_for(Some("National")), 30);
  }

  #[test]
  fn level_matching_ignores_case_and_whitespace() {
    let policy = PointsPolicy::default();
    assert_eq!(policy.award_for(Some(" INTERNATIONAL ")), 50);
    assert_eq!(policy.award_for(Some("regional")), policy.provincial);
  }

  #[test]
  fn unknown_level_gets_default() {
    let policy = PointsPolicy::default();
    assert_eq!(policy.award_for(Some("intergalactic")), policy.default);
    assert_eq!(policy.award_for(None), policy.default);
  }

  #[test]
  fn invalid_tables_are_rejected() {
    let flat = PointsPolicy { national: 50, ..PointsPolicy::default() };
    assert!(flat.validate().is_err());

    let zero = PointsPolicy { default: 0, ..PointsPolicy::default() };
    assert!(zero.validate().is_err());
  }
}
