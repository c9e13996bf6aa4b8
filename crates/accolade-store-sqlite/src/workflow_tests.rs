//! End-to-end workflow tests over both SQLite stores.

use std::sync::Arc;

use accolade_core::{
  Error, Workflow, WorkflowConfig,
  achievement::StatusChange,
  detail::{DetailPayload, NewAttachment},
  identity::{Principal, Role, Student},
  status::{AchievementStatus, Action},
  store::{DocumentStore, RelationalStore},
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{SqliteDocumentStore, SqliteStore};

struct Faculty {
  relational: Arc<SqliteStore>,
  documents:  Arc<SqliteDocumentStore>,
  workflow:   Workflow<SqliteStore, SqliteDocumentStore>,
  student:    Student,
  /// User id of the student's advisor.
  advisor:    Uuid,
}

async fn faculty() -> Faculty {
  let relational = Arc::new(SqliteStore::open_in_memory().await.expect("relational store"));
  let documents = Arc::new(
    SqliteDocumentStore::open_in_memory()
      .await
      .expect("document store"),
  );

  let user = relational.add_user("siti", "h", Role::Student).await.unwrap();
  let student = relational
    .add_student(user.user_id, "S-001", "Informatics", "2024")
    .await
    .unwrap();
  let advisor = relational.add_user("dosen", "h", Role::Lecturer).await.unwrap();
  let lecturer = relational
    .add_lecturer(advisor.user_id, "L-001", "Computer Science")
    .await
    .unwrap();
  relational.assign_advisor(student.id, Some(lecturer.id)).await.unwrap();
  let student = relational.get_student(student.id).await.unwrap().unwrap();

  let workflow = Workflow::new(
    Arc::clone(&relational),
    Arc::clone(&documents),
    WorkflowConfig::default(),
  );
  Faculty { relational, documents, workflow, student, advisor: advisor.user_id }
}

fn competition(level: &str) -> DetailPayload {
  DetailPayload {
    achievement_type: "competition".into(),
    title:            "Gold Medal".into(),
    description:      "National programming contest".into(),
    points:           10,
    details:          json!({ "competitionName": "Gemastik", "competitionLevel": level }),
    tags:             vec!["programming".into()],
  }
}

impl Faculty {
  async fn points(&self) -> i64 {
    self
      .relational
      .get_student(self.student.id)
      .await
      .unwrap()
      .unwrap()
      .total_points
  }

  async fn submitted(&self, level: &str) -> Uuid {
    let reference = self.workflow.create(self.student.id, competition(level)).await.unwrap();
    self.workflow.submit(reference.id, self.student.id).await.unwrap();
    reference.id
  }
}

#[tokio::test]
async fn national_competition_round_trip() {
  let f = faculty().await;
  let reference = f.workflow.create(f.student.id, competition("National")).await.unwrap();
  assert_eq!(reference.status, AchievementStatus::Draft);

  let pdf = NewAttachment {
    file_name: "certificate.pdf".into(),
    file_url:  "https://files.example.edu/certificate.pdf".into(),
    file_type: "application/pdf".into(),
  };
  f.workflow.add_attachment(reference.id, f.student.id, pdf).await.unwrap();
  f.workflow.submit(reference.id, f.student.id).await.unwrap();

  let award = f.workflow.verify(reference.id, f.advisor).await.unwrap();
  assert_eq!(award.points, 30);
  assert_eq!(f.points().await, 30);

  let stored = f.relational.find_reference(reference.id).await.unwrap().unwrap();
  assert_eq!(stored.status, AchievementStatus::Verified);
  assert_eq!(stored.verified_by, Some(f.advisor));
  assert!(stored.verified_at.is_some());
  assert!(stored.submitted_at.is_some());

  let owner = Principal { user_id: f.student.user_id, role: Role::Student };
  let visible = f.workflow.get_one(owner, reference.id).await.unwrap();
  let detail = visible.detail.unwrap();
  assert_eq!(detail.attachments.len(), 1);
  assert_eq!(detail.details.level(), Some("National"));
}

#[tokio::test]
async fn free_form_type_names_survive_storage() {
  let f = faculty().await;
  let mut payload = competition("Campus");
  payload.achievement_type = "Hackathon".into();
  payload.details = json!({ "level": "Campus", "teamSize": 4 });
  let reference = f.workflow.create(f.student.id, payload.clone()).await.unwrap();

  let detail = f.documents.find_detail(reference.detail_id).await.unwrap().unwrap();
  assert_eq!(detail.achievement_type, "Hackathon");
  assert_eq!(detail.details.discriminant(), "other");
  assert_eq!(detail.details.level(), Some("Campus"));

  payload.achievement_type = "Game Jam".into();
  f.workflow.update(reference.id, f.student.id, payload).await.unwrap();
  let detail = f.documents.find_detail(reference.detail_id).await.unwrap().unwrap();
  assert_eq!(detail.achievement_type, "Game Jam");
}

#[tokio::test]
async fn concurrent_verifications_credit_once() {
  let f = faculty().await;
  let reference = f.submitted("National").await;

  let (a, b) = tokio::join!(
    f.workflow.verify(reference, f.advisor),
    f.workflow.verify(reference, f.advisor),
  );

  let outcomes = [a, b];
  let wins = outcomes.iter().filter(|r| r.is_ok()).count();
  assert_eq!(wins, 1, "{outcomes:?}");
  let loser = outcomes.into_iter().find_map(Result::err).unwrap();
  assert!(
    matches!(
      loser,
      Error::InvalidStateTransition { from: AchievementStatus::Verified, action: Action::Verify }
    ),
    "{loser}"
  );
  assert_eq!(f.points().await, 30);

  let history = f.relational.status_history(reference).await.unwrap();
  let verified = history
    .iter()
    .filter(|e| e.to == AchievementStatus::Verified)
    .count();
  assert_eq!(verified, 1);
}

#[tokio::test]
async fn rejection_and_resubmission() {
  let f = faculty().await;
  let reference = f.submitted("Provincial").await;
  let first = f.relational.find_reference(reference).await.unwrap().unwrap();

  f.workflow
    .reject(reference, f.advisor, "please attach the certificate".into())
    .await
    .unwrap();
  f.workflow.update(reference, f.student.id, competition("International")).await.unwrap();
  f.workflow.submit(reference, f.student.id).await.unwrap();

  let stored = f.relational.find_reference(reference).await.unwrap().unwrap();
  assert_eq!(stored.status, AchievementStatus::Submitted);
  assert_eq!(stored.submitted_at, first.submitted_at);
  assert_eq!(stored.rejection_note.as_deref(), Some("please attach the certificate"));

  // The award follows the content at verification time.
  let award = f.workflow.verify(reference, f.advisor).await.unwrap();
  assert_eq!(award.points, 50);
}

#[tokio::test]
async fn submitted_content_is_frozen() {
  let f = faculty().await;
  let reference = f.submitted("Campus").await;

  let err = f
    .workflow
    .update(reference, f.student.id, competition("International"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidStateTransition { .. }), "{err}");

  let stored = f.relational.find_reference(reference).await.unwrap().unwrap();
  let detail = f.documents.find_detail(stored.detail_id).await.unwrap().unwrap();
  assert_eq!(detail.details.level(), Some("Campus"));
}

#[tokio::test]
async fn deleted_drafts_keep_their_detail() {
  let f = faculty().await;
  let reference = f.workflow.create(f.student.id, competition("Campus")).await.unwrap();
  f.workflow.delete(reference.id, f.student.id).await.unwrap();

  let stored = f.relational.find_reference(reference.id).await.unwrap().unwrap();
  assert_eq!(stored.status, AchievementStatus::Deleted);
  assert!(f.documents.find_detail(reference.detail_id).await.unwrap().is_some());

  let owner = Principal { user_id: f.student.user_id, role: Role::Student };
  assert!(f.workflow.visible(owner, false).await.unwrap().is_empty());

  let admin = Principal { user_id: Uuid::new_v4(), role: Role::Admin };
  assert_eq!(f.workflow.visible(admin, false).await.unwrap().len(), 1);
}

#[tokio::test]
async fn advisors_only_see_reviewable_work() {
  let f = faculty().await;
  let draft = f.workflow.create(f.student.id, competition("Campus")).await.unwrap();
  let submitted = f.submitted("National").await;

  let advisor = Principal { user_id: f.advisor, role: Role::Lecturer };
  let visible = f.workflow.visible(advisor, true).await.unwrap();
  assert_eq!(visible.len(), 1);
  assert_eq!(visible[0].reference.id, submitted);
  assert!(visible[0].detail.is_some());

  let err = f.workflow.get_one(advisor, draft.id).await.unwrap_err();
  assert!(matches!(err, Error::NotFound { .. }), "{err}");
}

#[tokio::test]
async fn reconciliation_completes_interrupted_awards() {
  let f = faculty().await;
  let reference = f.submitted("Provincial").await;

  // Simulate a crash between the status transition and the credit.
  let change = StatusChange {
    verified_by: Some(f.advisor),
    ..StatusChange::new(
      AchievementStatus::Submitted,
      AchievementStatus::Verified,
      f.advisor,
      Utc::now(),
    )
  };
  assert_eq!(f.relational.update_if_status(reference, change).await.unwrap(), 1);
  assert_eq!(f.points().await, 0);

  let credited = f.workflow.reconcile_awards().await.unwrap();
  assert_eq!(credited.len(), 1);
  assert_eq!(credited[0].points, 20);
  assert_eq!(f.points().await, 20);

  assert!(f.workflow.reconcile_awards().await.unwrap().is_empty());
  assert_eq!(f.points().await, 20);
  assert!(f.relational.award_for(reference).await.unwrap().is_some());
}

#[tokio::test]
async fn history_records_every_transition() {
  let f = faculty().await;
  let reference = f.submitted("National").await;
  f.workflow.reject(reference, f.advisor, "blurry scan".into()).await.unwrap();
  f.workflow.submit(reference, f.student.id).await.unwrap();
  f.workflow.verify(reference, f.advisor).await.unwrap();

  let owner = Principal { user_id: f.student.user_id, role: Role::Student };
  let history = f.workflow.history(owner, reference).await.unwrap();
  let path: Vec<_> = history.iter().map(|e| (e.from, e.to)).collect();
  use AchievementStatus::*;
  assert_eq!(path, vec![
    (None, Draft),
    (Some(Draft), Submitted),
    (Some(Submitted), Rejected),
    (Some(Rejected), Submitted),
    (Some(Submitted), Verified),
  ]);
  assert_eq!(history[2].note.as_deref(), Some("blurry scan"));
}
