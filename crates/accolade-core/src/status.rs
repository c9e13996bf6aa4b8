//! Achievement status and the transition table.
//!
//! ```text
//! draft     --submit-->  submitted
//! rejected  --submit-->  submitted
//! submitted --verify-->  verified   (terminal)
//! submitted --reject-->  rejected
//! draft     --delete-->  deleted    (terminal)
//! ```

use serde::{Deserialize, Serialize};

/// The lifecycle state of an achievement reference.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
  strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AchievementStatus {
  Draft,
  Submitted,
  Verified,
  Rejected,
  Deleted,
}

/// Statuses an advisor may see; drafts are private to the student.
pub const ADVISOR_VISIBLE: [AchievementStatus; 3] = [
  AchievementStatus::Submitted,
  AchievementStatus::Verified,
  AchievementStatus::Rejected,
];

/// An operation a principal may attempt against an achievement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
  Submit,
  Verify,
  Reject,
  Update,
  AddAttachment,
  Delete,
}

impl AchievementStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Verified | Self::Deleted)
  }

  /// Whether the associated detail document may be edited.
  pub fn is_editable(self) -> bool {
    matches!(self, Self::Draft | Self::Rejected)
  }

  /// The status reached by applying `action`, or `None` if `action` is not a
  /// transition out of `self`. Edits never change the status.
  pub fn next(self, action: Action) -> Option<Self> {
    use AchievementStatus::*;
    match (self, action) {
      (Draft | Rejected, Action::Submit) => Some(Submitted),
      (Submitted, Action::Verify) => Some(Verified),
      (Submitted, Action::Reject) => Some(Rejected),
      (Draft, Action::Delete) => Some(Deleted),
      _ => None,
    }
  }

  /// Whether `action` is permitted from this status.
  pub fn permits(self, action: Action) -> bool {
    match action {
      Action::Update => self.is_editable(),
      // Evidence is locked once any reviewer may have seen it.
      Action::AddAttachment => self == Self::Draft,
      _ => self.next(action).is_some(),
    }
  }
}
