//! The achievement verification workflow.
//!
//! [`Workflow`] enforces the status machine in [`crate::status`], ownership
//! and advisor authorization, and the point policy. It orchestrates a
//! [`RelationalStore`] (authoritative for state) and a [`DocumentStore`]
//! (authoritative for content) without a transaction spanning both:
//!
//! - create writes the detail first, then the reference, and discards the
//!   detail only once the reference is known not to exist;
//! - every status change is a conditional update on the expected status, so
//!   concurrent transitions on the same reference cannot both win;
//! - verification credits points through an award keyed by reference id, so
//!   a retried or reconciled credit never double-counts.
//!
//! Every store call is bounded by [`WorkflowConfig::store_timeout`].

use std::{future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  achievement::{AchievementReference, StatusChange, StatusEvent, VisibleAchievement},
  detail::{AchievementDetail, DetailPayload, NewAttachment},
  error::Entity,
  identity::{Lecturer, Principal, Role, Student},
  points::{PointAward, PointsPolicy},
  status::{ADVISOR_VISIBLE, AchievementStatus, Action},
  store::{DocumentStore, RelationalStore},
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
  /// Upper bound on every individual store call.
  pub store_timeout: Duration,
  pub points:        PointsPolicy,
}

impl Default for WorkflowConfig {
  fn default() -> Self {
    Self {
      store_timeout: Duration::from_secs(5),
      points:        PointsPolicy::default(),
    }
  }
}

// ─── Audience ────────────────────────────────────────────────────────────────

/// Who is reading, resolved from a [`Principal`]. The single source of the
/// read-side visibility rule.
enum Audience {
  Student(Student),
  Advisor(Lecturer),
  Admin,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// The workflow engine. Cloning is cheap; store handles are shared.
pub struct Workflow<R, D> {
  relational: Arc<R>,
  documents:  Arc<D>,
  config:     WorkflowConfig,
}

impl<R, D> Clone for Workflow<R, D> {
  fn clone(&self) -> Self {
    Self {
      relational: Arc::clone(&self.relational),
      documents:  Arc::clone(&self.documents),
      config:     self.config.clone(),
    }
  }
}

impl<R, D> Workflow<R, D>
where
  R: RelationalStore,
  D: DocumentStore,
{
  pub fn new(relational: Arc<R>, documents: Arc<D>, config: WorkflowConfig) -> Self {
    Self { relational, documents, config }
  }

  pub fn relational(&self) -> &Arc<R> { &self.relational }

  pub fn documents(&self) -> &Arc<D> { &self.documents }

  pub fn config(&self) -> &WorkflowConfig { &self.config }

  // ── Commands ──────────────────────────────────────────────────────────

  /// Create a `draft` achievement owned by `owner_student_id`.
  ///
  /// Writes the detail first, then the reference. If the reference write
  /// fails the detail is discarded; a retry always creates a fresh detail.
  /// A timed-out reference write may still have committed, so the reference
  /// is looked up first: if it exists the create succeeded, and if the
  /// lookup fails too the detail is kept rather than risk orphaning a
  /// committed reference.
  pub async fn create(
    &self,
    owner_student_id: Uuid,
    payload: DetailPayload,
  ) -> Result<AchievementReference> {
    let fields = payload.validate()?;

    self
      .bounded("get_student", self.relational.get_student(owner_student_id))
      .await?
      .ok_or(Error::not_found(Entity::Student, owner_student_id))?;

    let now = Utc::now();
    let detail = AchievementDetail::new(owner_student_id, fields, now);
    let detail_id = detail.id;
    self
      .bounded("insert_detail", self.documents.insert_detail(detail))
      .await?;

    let reference = AchievementReference::draft(owner_student_id, detail_id, now);
    let inserted = self
      .bounded(
        "insert_reference",
        self.relational.insert_reference(reference.clone()),
      )
      .await;

    match inserted {
      Ok(()) => {}
      Err(e @ Error::StorageTimeout { .. }) => {
        match self
          .bounded("find_reference", self.relational.find_reference(reference.id))
          .await
        {
          Ok(Some(_)) => {
            warn!(reference_id = %reference.id, "reference write timed out but committed");
          }
          Ok(None) => {
            self.discard_detail(detail_id, &e).await;
            return Err(e);
          }
          Err(lookup_err) => {
            error!(
              %detail_id,
              reference_id = %reference.id,
              error = %lookup_err,
              "reference write outcome unknown; detail kept and possibly orphaned"
            );
            return Err(e);
          }
        }
      }
      Err(e) => {
        self.discard_detail(detail_id, &e).await;
        return Err(e);
      }
    }

    info!(reference_id = %reference.id, student_id = %owner_student_id, "achievement created");
    Ok(reference)
  }

  /// Submit a `draft` or `rejected` achievement for review.
  pub async fn submit(&self, reference_id: Uuid, acting_student_id: Uuid) -> Result<()> {
    let reference = self.owned_reference(reference_id, acting_student_id).await?;
    let to = guard(reference.status, Action::Submit)?;

    let change = StatusChange::new(reference.status, to, acting_student_id, Utc::now());
    self.commit(reference_id, Action::Submit, change).await?;

    info!(%reference_id, "achievement submitted");
    Ok(())
  }

  /// Verify a `submitted` achievement and credit the owner's points.
  ///
  /// Steps, each aborting the rest on failure: read the detail, compute the
  /// award, transition the status, credit the ledger. If crediting fails
  /// after the transition, the reference stays `verified` and
  /// [`Self::reconcile_awards`] completes the credit later.
  pub async fn verify(
    &self,
    reference_id: Uuid,
    acting_principal_id: Uuid,
  ) -> Result<PointAward> {
    let reference = self.advised_reference(reference_id, acting_principal_id).await?;
    let to = guard(reference.status, Action::Verify)?;

    let detail = self.detail_of(&reference).await?;
    let points = self.config.points.award_for(detail.details.level());

    let now = Utc::now();
    let mut change = StatusChange::new(reference.status, to, acting_principal_id, now);
    change.verified_by = Some(acting_principal_id);
    if let Err(e) = self.commit(reference_id, Action::Verify, change).await {
      if matches!(e, Error::StorageTimeout { .. }) {
        self.note_unconfirmed_verify(&reference, points).await;
      }
      return Err(e);
    }

    let award = PointAward {
      reference_id,
      student_id: reference.student_id,
      points,
      awarded_at: now,
    };
    match self
      .bounded("award_points", self.relational.award_points(award.clone()))
      .await
    {
      Ok(true) => {}
      Ok(false) => warn!(%reference_id, "points were already credited"),
      Err(e) => {
        error!(
          %reference_id,
          student_id = %reference.student_id,
          points,
          error = %e,
          "achievement verified but points not credited; pending reconciliation"
        );
        return Err(e);
      }
    }

    info!(%reference_id, verified_by = %acting_principal_id, points, "achievement verified");
    Ok(award)
  }

  /// Reject a `submitted` achievement, returning it to an editable state.
  pub async fn reject(
    &self,
    reference_id: Uuid,
    acting_principal_id: Uuid,
    note: String,
  ) -> Result<()> {
    let note = note.trim().to_owned();
    if note.is_empty() {
      return Err(Error::Validation("rejection note is required".into()));
    }

    let reference = self.advised_reference(reference_id, acting_principal_id).await?;
    let to = guard(reference.status, Action::Reject)?;

    let mut change = StatusChange::new(reference.status, to, acting_principal_id, Utc::now());
    change.rejection_note = Some(note);
    self.commit(reference_id, Action::Reject, change).await?;

    info!(%reference_id, rejected_by = %acting_principal_id, "achievement rejected");
    Ok(())
  }

  /// Overwrite the content of a `draft` or `rejected` achievement.
  ///
  /// The status check and the document write are separate store calls; a
  /// transition committed between them is logged, not undone.
  pub async fn update(
    &self,
    reference_id: Uuid,
    acting_student_id: Uuid,
    payload: DetailPayload,
  ) -> Result<()> {
    let reference = self.owned_reference(reference_id, acting_student_id).await?;
    check(reference.status, Action::Update)?;
    let fields = payload.validate()?;

    let found = self
      .bounded(
        "replace_fields",
        self.documents.replace_fields(reference.detail_id, fields, Utc::now()),
      )
      .await?;
    if !found {
      return Err(Error::not_found(Entity::Detail, reference.detail_id));
    }
    self.recheck_editable(reference_id, Action::Update).await;

    info!(%reference_id, "achievement updated");
    Ok(())
  }

  /// Append evidence to a `draft` achievement. Races with transitions as
  /// [`Self::update`] does.
  pub async fn add_attachment(
    &self,
    reference_id: Uuid,
    acting_student_id: Uuid,
    attachment: NewAttachment,
  ) -> Result<()> {
    let reference = self.owned_reference(reference_id, acting_student_id).await?;
    check(reference.status, Action::AddAttachment)?;
    let attachment = attachment.into_attachment(Utc::now())?;

    let found = self
      .bounded(
        "append_attachment",
        self.documents.append_attachment(reference.detail_id, attachment),
      )
      .await?;
    if !found {
      return Err(Error::not_found(Entity::Detail, reference.detail_id));
    }
    self.recheck_editable(reference_id, Action::AddAttachment).await;

    info!(%reference_id, "attachment added");
    Ok(())
  }

  /// Soft-delete a `draft` achievement. The detail document is retained.
  pub async fn delete(&self, reference_id: Uuid, acting_student_id: Uuid) -> Result<()> {
    let reference = self.owned_reference(reference_id, acting_student_id).await?;
    let to = guard(reference.status, Action::Delete)?;

    let change = StatusChange::new(reference.status, to, acting_student_id, Utc::now());
    self.commit(reference_id, Action::Delete, change).await?;

    info!(%reference_id, "achievement deleted");
    Ok(())
  }

  /// Credit every `verified` reference that has no award recorded.
  /// Returns the awards made.
  pub async fn reconcile_awards(&self) -> Result<Vec<PointAward>> {
    let pending = self
      .bounded("unawarded_verified", self.relational.unawarded_verified())
      .await?;

    let mut credited = Vec::with_capacity(pending.len());
    for reference in pending {
      let detail = self.detail_of(&reference).await?;
      let award = PointAward {
        reference_id: reference.id,
        student_id:   reference.student_id,
        points:       self.config.points.award_for(detail.details.level()),
        awarded_at:   Utc::now(),
      };
      if self
        .bounded("award_points", self.relational.award_points(award.clone()))
        .await?
      {
        info!(reference_id = %reference.id, points = award.points, "reconciled award");
        credited.push(award);
      }
    }
    Ok(credited)
  }

  // ── Queries ───────────────────────────────────────────────────────────

  /// The references `principal` may see, optionally joined with details.
  ///
  /// Students see their own (excluding deleted ones), advisors see their
  /// current advisees' non-draft references, admins see everything.
  pub async fn visible(
    &self,
    principal: Principal,
    with_details: bool,
  ) -> Result<Vec<VisibleAchievement>> {
    let references = match self.audience(principal).await? {
      Audience::Student(student) => {
        let mut refs = self
          .bounded(
            "find_references_by_student",
            self.relational.find_references_by_student(student.id),
          )
          .await?;
        refs.retain(|r| r.status != AchievementStatus::Deleted);
        refs
      }
      Audience::Advisor(lecturer) => {
        self
          .bounded(
            "find_references_by_advisor",
            self
              .relational
              .find_references_by_advisor(lecturer.id, ADVISOR_VISIBLE.to_vec()),
          )
          .await?
      }
      Audience::Admin => {
        self
          .bounded("find_all_references", self.relational.find_all_references())
          .await?
      }
    };

    let mut visible = Vec::with_capacity(references.len());
    for reference in references {
      let detail = if with_details {
        self.optional_detail(&reference).await?
      } else {
        None
      };
      visible.push(VisibleAchievement { reference, detail });
    }
    Ok(visible)
  }

  /// A single reference and its detail, if visible to `principal`.
  pub async fn get_one(
    &self,
    principal: Principal,
    reference_id: Uuid,
  ) -> Result<VisibleAchievement> {
    let reference = self.visible_reference(principal, reference_id).await?;
    let detail = self.optional_detail(&reference).await?;
    Ok(VisibleAchievement { reference, detail })
  }

  /// The status history of a reference visible to `principal`.
  pub async fn history(
    &self,
    principal: Principal,
    reference_id: Uuid,
  ) -> Result<Vec<StatusEvent>> {
    self.visible_reference(principal, reference_id).await?;
    self
      .bounded("status_history", self.relational.status_history(reference_id))
      .await
  }

  /// Resolve the student profile `principal` acts through. Only student
  /// principals own achievements.
  pub async fn acting_student(&self, principal: Principal) -> Result<Student> {
    if principal.role != Role::Student {
      return Err(Error::Forbidden);
    }
    self
      .bounded(
        "student_by_user",
        self.relational.student_by_user(principal.user_id),
      )
      .await?
      .ok_or(Error::not_found(Entity::Student, principal.user_id))
  }

  // ── Helpers ───────────────────────────────────────────────────────────

  /// Run a store call under the configured timeout, boxing backend errors.
  async fn bounded<T, E, F>(&self, op: &'static str, fut: F) -> Result<T>
  where
    F: Future<Output = std::result::Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
  {
    let after = self.config.store_timeout;
    match tokio::time::timeout(after, fut).await {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(e)) => Err(Error::storage(e)),
      Err(_) => {
        warn!(op, ?after, "store call timed out");
        Err(Error::StorageTimeout { op, after })
      }
    }
  }

  async fn discard_detail(&self, detail_id: Uuid, cause: &Error) {
    warn!(%detail_id, error = %cause, "reference write failed; discarding detail");
    if let Err(e) = self.bounded("discard", self.documents.discard(detail_id)).await {
      error!(%detail_id, error = %e, "orphaned detail document needs manual cleanup");
    }
  }

  /// After a timed-out verify transition, find out whether it landed. A
  /// verified reference without its award is left for reconciliation.
  async fn note_unconfirmed_verify(&self, reference: &AchievementReference, points: u32) {
    match self
      .bounded("find_reference", self.relational.find_reference(reference.id))
      .await
    {
      Ok(Some(current)) if current.status == AchievementStatus::Verified => error!(
        reference_id = %reference.id,
        student_id = %reference.student_id,
        points,
        "achievement verified but points not credited; pending reconciliation"
      ),
      Ok(_) => {}
      Err(e) => error!(
        reference_id = %reference.id,
        error = %e,
        "verify outcome unknown; if it committed, award is pending reconciliation"
      ),
    }
  }

  /// Warn when a detail edit raced a transition out of an editable status.
  async fn recheck_editable(&self, reference_id: Uuid, action: Action) {
    match self.load_reference(reference_id).await {
      Ok(current) if current.status.permits(action) => {}
      Ok(current) => warn!(
        %reference_id,
        status = %current.status,
        %action,
        "detail edited while the achievement left an editable status"
      ),
      Err(e) => warn!(%reference_id, error = %e, "could not recheck status after edit"),
    }
  }

  async fn load_reference(&self, reference_id: Uuid) -> Result<AchievementReference> {
    self
      .bounded("find_reference", self.relational.find_reference(reference_id))
      .await?
      .ok_or(Error::not_found(Entity::Reference, reference_id))
  }

  /// Load a reference and check that `student_id` owns it.
  async fn owned_reference(
    &self,
    reference_id: Uuid,
    student_id: Uuid,
  ) -> Result<AchievementReference> {
    let reference = self.load_reference(reference_id).await?;
    if reference.student_id != student_id {
      warn!(%reference_id, %student_id, "ownership check failed");
      return Err(Error::Unauthorized(reference_id));
    }
    Ok(reference)
  }

  /// Load a reference and check that `principal_id` is a lecturer advising
  /// its owner.
  async fn advised_reference(
    &self,
    reference_id: Uuid,
    principal_id: Uuid,
  ) -> Result<AchievementReference> {
    let reference = self.load_reference(reference_id).await?;

    let Some(lecturer) = self
      .bounded("lecturer_by_user", self.relational.lecturer_by_user(principal_id))
      .await?
    else {
      warn!(%reference_id, %principal_id, "principal is not a lecturer");
      return Err(Error::Forbidden);
    };

    let owner = self
      .bounded("get_student", self.relational.get_student(reference.student_id))
      .await?
      .ok_or(Error::not_found(Entity::Student, reference.student_id))?;

    if owner.advisor_id != Some(lecturer.id) {
      warn!(%reference_id, lecturer_id = %lecturer.id, "lecturer is not the advisor");
      return Err(Error::Forbidden);
    }
    Ok(reference)
  }

  async fn detail_of(&self, reference: &AchievementReference) -> Result<AchievementDetail> {
    self
      .bounded("find_detail", self.documents.find_detail(reference.detail_id))
      .await?
      .ok_or(Error::not_found(Entity::Detail, reference.detail_id))
  }

  async fn optional_detail(
    &self,
    reference: &AchievementReference,
  ) -> Result<Option<AchievementDetail>> {
    let detail = self
      .bounded("find_detail", self.documents.find_detail(reference.detail_id))
      .await?;
    if detail.is_none() {
      warn!(reference_id = %reference.id, detail_id = %reference.detail_id, "detail document missing");
    }
    Ok(detail)
  }

  /// Apply a conditional status change. If another caller moved the status
  /// first, report the transition as invalid from the status now stored.
  async fn commit(&self, reference_id: Uuid, action: Action, change: StatusChange) -> Result<()> {
    let expected = change.from;
    let affected = self
      .bounded(
        "update_if_status",
        self.relational.update_if_status(reference_id, change),
      )
      .await?;
    if affected == 1 {
      return Ok(());
    }

    let current = self.load_reference(reference_id).await?;
    warn!(%reference_id, %expected, current = %current.status, %action, "lost status race");
    Err(Error::InvalidStateTransition { from: current.status, action })
  }

  async fn audience(&self, principal: Principal) -> Result<Audience> {
    match principal.role {
      Role::Admin => Ok(Audience::Admin),
      Role::Student => self
        .bounded(
          "student_by_user",
          self.relational.student_by_user(principal.user_id),
        )
        .await?
        .map(Audience::Student)
        .ok_or(Error::not_found(Entity::Student, principal.user_id)),
      Role::Lecturer => self
        .bounded(
          "lecturer_by_user",
          self.relational.lecturer_by_user(principal.user_id),
        )
        .await?
        .map(Audience::Advisor)
        .ok_or(Error::not_found(Entity::Lecturer, principal.user_id)),
    }
  }

  /// Load a reference, reporting it as missing if `principal` may not see
  /// it.
  async fn visible_reference(
    &self,
    principal: Principal,
    reference_id: Uuid,
  ) -> Result<AchievementReference> {
    let audience = self.audience(principal).await?;
    let reference = self.load_reference(reference_id).await?;

    let admitted = match &audience {
      Audience::Admin => true,
      Audience::Student(student) => {
        reference.student_id == student.id
          && reference.status != AchievementStatus::Deleted
      }
      Audience::Advisor(lecturer) => {
        ADVISOR_VISIBLE.contains(&reference.status)
          && self
            .bounded("list_advisees", self.relational.list_advisees(lecturer.id))
            .await?
            .iter()
            .any(|s| s.id == reference.student_id)
      }
    };

    if admitted {
      Ok(reference)
    } else {
      Err(Error::not_found(Entity::Reference, reference_id))
    }
  }
}

/// The status `action` leads to from `from`, or an invalid-transition error.
fn guard(from: AchievementStatus, action: Action) -> Result<AchievementStatus> {
  from
    .next(action)
    .ok_or(Error::InvalidStateTransition { from, action })
}

/// Check a non-transition action (an edit) against the current status.
fn check(status: AchievementStatus, action: Action) -> Result<()> {
  if status.permits(action) {
    Ok(())
  } else {
    Err(Error::InvalidStateTransition { from: status, action })
  }
}
