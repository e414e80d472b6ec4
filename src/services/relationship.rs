//! Keeps each parent's embedded `children` list in step with the students
//! collection. Runs inline with student mutations; every side is an
//! independent atomic upsert or remove on the parent record, and a failure on
//! one side is logged and never undoes the other or the student write.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::metrics::SYNC_FAILURES_COUNTER;
use crate::models::{student::Student, user::ChildRef};
use crate::store::{DataSource, StoreError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("parent {0} not found")]
    ParentMissing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened to the parent records during one student mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub linked: Option<String>,
    pub unlinked: Vec<String>,
    pub failures: Vec<String>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct RelationshipSync;

impl RelationshipSync {
    pub async fn on_created(store: &dyn DataSource, student: &Student) -> SyncReport {
        let mut report = SyncReport::default();
        if student.is_active {
            if let Some(parent) = student.parent() {
                Self::link(store, parent, student, &mut report).await;
            }
        }
        report
    }

    /// `before` is the stored record prior to the write, `after` the record
    /// as written.
    pub async fn on_updated(store: &dyn DataSource, before: &Student, after: &Student) -> SyncReport {
        let mut report = SyncReport::default();
        let old_parent = before.parent();
        let new_parent = after.parent();

        if !after.is_active {
            if let Some(old) = old_parent {
                Self::unlink(store, old, &after.id, &mut report).await;
            }
            if let Some(new) = new_parent.filter(|p| Some(*p) != old_parent) {
                Self::unlink(store, new, &after.id, &mut report).await;
            }
            return report;
        }

        // Coming back from a soft delete does not restore the link on its own.
        if !before.is_active {
            return report;
        }

        if old_parent != new_parent {
            if let Some(old) = old_parent {
                Self::unlink(store, old, &after.id, &mut report).await;
            }
        }
        if let Some(new) = new_parent {
            Self::link(store, new, after, &mut report).await;
        }
        report
    }

    pub async fn on_deactivated(store: &dyn DataSource, student: &Student) -> SyncReport {
        let mut report = SyncReport::default();
        if let Some(parent) = student.parent() {
            Self::unlink(store, parent, &student.id, &mut report).await;
        }
        report
    }

    /// Explicitly re-adds an active student to its parent's list.
    pub async fn relink(store: &dyn DataSource, student: &Student) -> SyncReport {
        Self::on_created(store, student).await
    }

    async fn link(store: &dyn DataSource, parent_id: &str, student: &Student, report: &mut SyncReport) {
        let child = ChildRef::from_student(student, Utc::now());
        let result = match store.upsert_child_ref(parent_id, &child).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SyncError::ParentMissing(parent_id.to_string())),
            Err(e) => Err(SyncError::Store(e)),
        };
        match result {
            Ok(()) => {
                info!("Linked student {} to parent {}", student.id, parent_id);
                report.linked = Some(parent_id.to_string());
            }
            Err(e) => Self::record_failure("link", &student.id, e, report),
        }
    }

    async fn unlink(store: &dyn DataSource, parent_id: &str, student_id: &str, report: &mut SyncReport) {
        let result = match store.remove_child_ref(parent_id, student_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SyncError::ParentMissing(parent_id.to_string())),
            Err(e) => Err(SyncError::Store(e)),
        };
        match result {
            Ok(()) => {
                info!("Unlinked student {} from parent {}", student_id, parent_id);
                report.unlinked.push(parent_id.to_string());
            }
            Err(e) => Self::record_failure("unlink", student_id, e, report),
        }
    }

    fn record_failure(operation: &str, student_id: &str, err: SyncError, report: &mut SyncReport) {
        warn!("Relationship sync ({operation}) for student {student_id} failed: {err}");
        SYNC_FAILURES_COUNTER.with_label_values(&[operation]).inc();
        report.failures.push(format!("{operation}: {err}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::student::{ApprovalStatus, CurrentStatus};
    use crate::models::user::{User, UserType};
    use crate::store::fixture::{Fault, FixtureStore};

    fn parent(id: &str) -> User {
        let now = Utc::now();
        User {
            id: id.into(),
            name: format!("Parent {id}"),
            email: format!("{id}@mybus.test"),
            phone: "0500000000".into(),
            user_type: UserType::Parent,
            is_active: true,
            children: Vec::new(),
            permissions: None,
            fcm_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn student(id: &str, parent_id: &str) -> Student {
        let now = Utc::now();
        Student {
            id: id.into(),
            name: "Ahmad".into(),
            parent_id: parent_id.into(),
            parent_name: String::new(),
            parent_phone: String::new(),
            school_name: "Al Noor".into(),
            grade: "3".into(),
            bus_route: "North".into(),
            bus_id: None,
            current_status: CurrentStatus::Home,
            qr_code: format!("QR-{id}"),
            is_active: true,
            approval_status: ApprovalStatus::Approved,
            approved_at: None,
            rejected_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn store_with_parents(ids: &[&str]) -> FixtureStore {
        let store = FixtureStore::new();
        for id in ids {
            store.insert_user(&parent(id), None).await.unwrap();
        }
        store
    }

    async fn children_of(store: &FixtureStore, id: &str) -> Vec<ChildRef> {
        store.get_user(id).await.unwrap().unwrap().children
    }

    #[tokio::test]
    async fn creating_twice_yields_one_child_ref() {
        let store = store_with_parents(&["p1"]).await;
        let s = student("s1", "p1");

        RelationshipSync::on_created(&store, &s).await;
        let first = children_of(&store, "p1").await;
        RelationshipSync::on_created(&store, &s).await;
        let second = children_of(&store, "p1").await;

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].added_at, first[0].added_at);
    }

    #[tokio::test]
    async fn update_refreshes_fields_in_place() {
        let store = store_with_parents(&["p1"]).await;
        let before = student("s1", "p1");
        RelationshipSync::on_created(&store, &before).await;

        let after = Student { grade: "4".into(), bus_route: "South".into(), ..before.clone() };
        let report = RelationshipSync::on_updated(&store, &before, &after).await;

        assert!(report.is_clean());
        let children = children_of(&store, "p1").await;
        assert_eq!(children.len(), 1);
        assert!(children[0].mirrors(&after));
    }

    #[tokio::test]
    async fn update_appends_when_parent_list_lacks_the_child() {
        let store = store_with_parents(&["p1"]).await;
        let before = student("s1", "p1");
        assert!(children_of(&store, "p1").await.is_empty());

        let after = Student { grade: "5".into(), ..before.clone() };
        let report = RelationshipSync::on_updated(&store, &before, &after).await;

        assert_eq!(report.linked.as_deref(), Some("p1"));
        assert!(report.unlinked.is_empty() && report.is_clean());
        let children = children_of(&store, "p1").await;
        assert_eq!(children.len(), 1);
        assert!(children[0].mirrors(&after));
    }

    #[tokio::test]
    async fn reparent_moves_child_ref() {
        let store = store_with_parents(&["a", "b"]).await;
        let before = student("s1", "a");
        RelationshipSync::on_created(&store, &before).await;

        let after = Student { parent_id: "b".into(), name: "Ahmad Ali".into(), ..before.clone() };
        let report = RelationshipSync::on_updated(&store, &before, &after).await;

        assert_eq!(report.linked.as_deref(), Some("b"));
        assert_eq!(report.unlinked, vec!["a".to_string()]);
        assert!(children_of(&store, "a").await.is_empty());
        let b = children_of(&store, "b").await;
        assert_eq!(b.len(), 1);
        assert!(b[0].mirrors(&after));
    }

    #[tokio::test]
    async fn failing_side_does_not_block_the_other() {
        let store = store_with_parents(&["a", "b"]).await;
        let before = student("s1", "a");
        RelationshipSync::on_created(&store, &before).await;
        store.inject(Fault::UserWrite("a".into())).await;

        let after = Student { parent_id: "b".into(), ..before.clone() };
        let report = RelationshipSync::on_updated(&store, &before, &after).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(children_of(&store, "b").await.len(), 1);
    }

    #[tokio::test]
    async fn missing_parent_is_reported_not_fatal() {
        let store = FixtureStore::new();
        let report = RelationshipSync::on_created(&store, &student("s1", "ghost")).await;

        assert_eq!(report.linked, None);
        assert_eq!(report.failures.len(), 1);
    }

    #[tokio::test]
    async fn soft_delete_removes_and_reactivation_does_not_restore() {
        let store = store_with_parents(&["p1"]).await;
        let active = student("s1", "p1");
        RelationshipSync::on_created(&store, &active).await;

        let deleted = Student { is_active: false, ..active.clone() };
        RelationshipSync::on_updated(&store, &active, &deleted).await;
        assert!(children_of(&store, "p1").await.is_empty());

        let restored = Student { is_active: true, ..deleted.clone() };
        let report = RelationshipSync::on_updated(&store, &deleted, &restored).await;
        assert_eq!(report, SyncReport::default());
        assert!(children_of(&store, "p1").await.is_empty());

        RelationshipSync::relink(&store, &restored).await;
        assert_eq!(children_of(&store, "p1").await.len(), 1);
    }

    #[tokio::test]
    async fn unlinking_is_idempotent() {
        let store = store_with_parents(&["p1"]).await;
        let s = student("s1", "p1");

        let first = RelationshipSync::on_deactivated(&store, &s).await;
        let second = RelationshipSync::on_deactivated(&store, &s).await;
        assert!(first.is_clean() && second.is_clean());
        assert!(children_of(&store, "p1").await.is_empty());
    }
}
