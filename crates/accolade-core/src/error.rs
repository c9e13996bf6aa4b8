//! Error taxonomy for workflow operations.
//!
//! Every variant maps to a stable [`Error::kind`] string so that callers can
//! decide whether to retry, ask for corrected input, or show an authorization
//! message.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::status::{AchievementStatus, Action};

/// The entity a [`Error::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Entity {
  Reference,
  Detail,
  Student,
  Lecturer,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation error: {0}")]
  Validation(String),

  #[error("{entity} not found: {id}")]
  NotFound { entity: Entity, id: Uuid },

  #[error("principal does not own achievement {0}")]
  Unauthorized(Uuid),

  #[error("principal may not perform this action")]
  Forbidden,

  #[error("cannot {action} an achievement in status {from}")]
  InvalidStateTransition {
    from:   AchievementStatus,
    action: Action,
  },

  #[error("store call `{op}` timed out after {after:?}")]
  StorageTimeout { op: &'static str, after: Duration },

  #[error("store error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn not_found(entity: Entity, id: Uuid) -> Self {
    Self::NotFound { entity, id }
  }

  pub(crate) fn storage<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Storage(Box::new(e))
  }

  /// Stable machine-readable name of the error kind.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Validation(_) => "validation_error",
      Self::NotFound { .. } => "not_found",
      Self::Unauthorized(_) => "unauthorized",
      Self::Forbidden => "forbidden",
      Self::InvalidStateTransition { .. } => "invalid_state_transition",
      Self::StorageTimeout { .. } => "storage_timeout",
      Self::Storage(_) => "storage_error",
    }
  }

  /// Whether repeating the same call may succeed without changing the input.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::StorageTimeout { .. } | Self::Storage(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
