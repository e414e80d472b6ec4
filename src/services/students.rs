use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::import::ImportRow;
use super::relationship::{RelationshipSync, SyncReport};
use crate::error::{AppError, AppResult};
use crate::models::student::{
    non_empty, ApprovalStatus, ApproveStudentRequest, CreateStudentRequest, CurrentStatus,
    ImportSummary, Student, StudentQuery, UpdateStudentRequest,
};
use crate::store::{new_id, DataSource};

/// A student write together with what happened to the parent records.
#[derive(Debug, Serialize)]
pub struct StudentWrite {
    #[serde(flatten)]
    pub student: Student,
    pub sync: SyncReport,
}

const UNSPECIFIED: &str = "غير محدد";
const DEFAULT_SCHOOL: &str = "مدرسة افتراضية";

pub fn generate_qr_code(id: &str) -> String {
    let prefix: String = id.chars().take(6).collect();
    format!("STU-{}", prefix.to_uppercase())
}

pub struct StudentService;

impl StudentService {
    /// Active students matching the query, sorted by name.
    pub async fn list(store: &dyn DataSource, query: &StudentQuery) -> AppResult<Vec<Student>> {
        let parent = query.parent_id.as_deref().and_then(non_empty);
        let students = store.list_students(parent, true).await?;
        Ok(students.into_iter().filter(|s| query.matches(s)).collect())
    }

    pub async fn get(store: &dyn DataSource, id: &str) -> AppResult<Student> {
        store
            .get_student(id)
            .await?
            .ok_or_else(|| AppError::not_found("student", id))
    }

    pub async fn create(store: &dyn DataSource, req: CreateStudentRequest) -> AppResult<StudentWrite> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Missing required field: name".into()));
        }

        let id = new_id();
        let qr_code = match req.qr_code.as_deref().and_then(non_empty) {
            Some(qr) => qr.to_string(),
            None => generate_qr_code(&id),
        };
        if store.find_student_by_qr(&qr_code).await?.is_some() {
            return Err(AppError::Conflict(format!("QR code {qr_code} is already in use")));
        }

        let now = Utc::now();
        let mut student = Student {
            id,
            name: name.to_string(),
            parent_id: req.parent_id.trim().to_string(),
            parent_name: req.parent_name,
            parent_phone: req.parent_phone,
            school_name: req.school_name,
            grade: req.grade,
            bus_route: req.bus_route,
            bus_id: None,
            current_status: req.current_status.unwrap_or_default(),
            qr_code,
            is_active: req.is_active.unwrap_or(true),
            approval_status: ApprovalStatus::Approved,
            approved_at: Some(now),
            rejected_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        fill_parent_contact(store, &mut student).await?;

        store.insert_students(std::slice::from_ref(&student)).await?;
        info!("Created student {} ({})", student.id, student.qr_code);

        let sync = RelationshipSync::on_created(store, &student).await;
        Ok(StudentWrite { student, sync })
    }

    pub async fn update(
        store: &dyn DataSource,
        id: &str,
        req: UpdateStudentRequest,
    ) -> AppResult<StudentWrite> {
        let before = Self::get(store, id).await?;
        let mut after = before.clone();

        if let Some(name) = req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Validation("name must not be empty".into()));
            }
            after.name = name.to_string();
        }
        if let Some(qr) = req.qr_code {
            let qr = qr.trim();
            if qr.is_empty() {
                return Err(AppError::Validation("qrCode must not be empty".into()));
            }
            if qr != before.qr_code {
                if let Some(other) = store.find_student_by_qr(qr).await? {
                    if other.id != before.id {
                        return Err(AppError::Conflict(format!("QR code {qr} is already in use")));
                    }
                }
            }
            after.qr_code = qr.to_string();
        }
        if let Some(parent_id) = req.parent_id {
            after.parent_id = parent_id.trim().to_string();
            if after.parent_id != before.parent_id {
                after.parent_name.clear();
                after.parent_phone.clear();
            }
        }
        if let Some(v) = req.parent_name {
            after.parent_name = v;
        }
        if let Some(v) = req.parent_phone {
            after.parent_phone = v;
        }
        if let Some(v) = req.school_name {
            after.school_name = v;
        }
        if let Some(v) = req.grade {
            after.grade = v;
        }
        if let Some(v) = req.bus_route {
            after.bus_route = v;
        }
        if let Some(v) = req.bus_id {
            after.bus_id = non_empty(&v).map(str::to_string);
        }
        if let Some(v) = req.current_status {
            after.current_status = v;
        }
        if let Some(active) = req.is_active {
            after.is_active = active;
            after.deleted_at = if active { None } else { before.deleted_at.or(Some(Utc::now())) };
        }
        fill_parent_contact(store, &mut after).await?;
        after.updated_at = Utc::now();

        if !store.update_student(&after).await? {
            return Err(AppError::not_found("student", id));
        }
        let sync = RelationshipSync::on_updated(store, &before, &after).await;
        Ok(StudentWrite { student: after, sync })
    }

    /// Soft delete.
    pub async fn deactivate(store: &dyn DataSource, id: &str) -> AppResult<StudentWrite> {
        let mut student = Self::get(store, id).await?;
        if !student.is_active {
            return Ok(StudentWrite { student, sync: SyncReport::default() });
        }
        let now = Utc::now();
        student.is_active = false;
        student.deleted_at = Some(now);
        student.updated_at = now;

        if !store.update_student(&student).await? {
            return Err(AppError::not_found("student", id));
        }
        info!("Deactivated student {}", student.id);
        let sync = RelationshipSync::on_deactivated(store, &student).await;
        Ok(StudentWrite { student, sync })
    }

    /// Restores the parent's ChildRef for an active student.
    pub async fn relink(store: &dyn DataSource, id: &str) -> AppResult<StudentWrite> {
        let student = Self::get(store, id).await?;
        if !student.is_active {
            return Err(AppError::FailedPrecondition(format!("student {id} is inactive")));
        }
        if student.parent().is_none() {
            return Err(AppError::FailedPrecondition(format!("student {id} has no parent")));
        }
        let sync = RelationshipSync::relink(store, &student).await;
        Ok(StudentWrite { student, sync })
    }

    pub async fn approve(
        store: &dyn DataSource,
        id: &str,
        req: ApproveStudentRequest,
    ) -> AppResult<Student> {
        let mut student = Self::get(store, id).await?;
        if let Some(bus_id) = req.bus_id.as_deref().and_then(non_empty) {
            if store.get_bus(bus_id).await?.is_none() {
                return Err(AppError::not_found("bus", bus_id));
            }
            student.bus_id = Some(bus_id.to_string());
        }
        let now = Utc::now();
        student.approval_status = ApprovalStatus::Approved;
        student.approved_at = Some(now);
        student.updated_at = now;

        if !store.update_student(&student).await? {
            return Err(AppError::not_found("student", id));
        }
        info!("Approved student {}", student.id);
        Ok(student)
    }

    pub async fn reject(store: &dyn DataSource, id: &str) -> AppResult<Student> {
        let mut student = Self::get(store, id).await?;
        let now = Utc::now();
        student.approval_status = ApprovalStatus::Rejected;
        student.rejected_at = Some(now);
        student.updated_at = now;

        if !store.update_student(&student).await? {
            return Err(AppError::not_found("student", id));
        }
        info!("Rejected student {}", student.id);
        Ok(student)
    }

    /// Rows without a name or parent phone, or reusing a QR code, are skipped.
    /// Imported students are approved and unlinked; all rows land in one batch.
    pub async fn import(store: &dyn DataSource, rows: Vec<ImportRow>) -> AppResult<ImportSummary> {
        let now = Utc::now();
        let mut seen = HashSet::new();
        let mut students = Vec::new();
        let mut skipped = 0;

        for row in rows {
            let (Some(name), Some(parent_phone)) = (row.get("name"), row.get("parentPhone")) else {
                skipped += 1;
                continue;
            };

            let id = new_id();
            let qr_code = row
                .get("qrCode")
                .map(str::to_string)
                .unwrap_or_else(|| generate_qr_code(&id));
            if !seen.insert(qr_code.clone()) || store.find_student_by_qr(&qr_code).await?.is_some() {
                skipped += 1;
                continue;
            }

            students.push(Student {
                id,
                name: name.to_string(),
                parent_id: String::new(),
                parent_name: row.get("parentName").unwrap_or_default().to_string(),
                parent_phone: parent_phone.to_string(),
                school_name: row.get("schoolName").unwrap_or(DEFAULT_SCHOOL).to_string(),
                grade: row.get("grade").unwrap_or(UNSPECIFIED).to_string(),
                bus_route: row.get("busRoute").unwrap_or(UNSPECIFIED).to_string(),
                bus_id: None,
                current_status: CurrentStatus::Home,
                qr_code,
                is_active: true,
                approval_status: ApprovalStatus::Approved,
                approved_at: Some(now),
                rejected_at: None,
                deleted_at: None,
                created_at: now,
                updated_at: now,
            });
        }

        if !students.is_empty() {
            store.insert_students(&students).await?;
        }
        info!("Imported {} students, skipped {}", students.len(), skipped);
        Ok(ImportSummary {
            imported: students.len(),
            skipped,
        })
    }
}

/// Copies the parent's name and phone onto the student when they are blank.
async fn fill_parent_contact(store: &dyn DataSource, student: &mut Student) -> AppResult<()> {
    let Some(parent_id) = student.parent() else {
        return Ok(());
    };
    if !student.parent_name.trim().is_empty() && !student.parent_phone.trim().is_empty() {
        return Ok(());
    }
    if let Some(parent) = store.get_user(parent_id).await? {
        if student.parent_name.trim().is_empty() {
            student.parent_name = parent.name;
        }
        if student.parent_phone.trim().is_empty() {
            student.parent_phone = parent.phone;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FixtureStore;

    fn create_req(name: &str, parent_id: &str) -> CreateStudentRequest {
        CreateStudentRequest {
            name: name.into(),
            parent_id: parent_id.into(),
            parent_name: String::new(),
            parent_phone: String::new(),
            school_name: "Al Noor".into(),
            grade: "3".into(),
            bus_route: "North".into(),
            qr_code: None,
            current_status: None,
            is_active: None,
        }
    }

    #[tokio::test]
    async fn create_links_parent_and_fills_contact() {
        let store = FixtureStore::seeded().await;
        let written = StudentService::create(&store, create_req("Sara", "parent_1")).await.unwrap();

        assert!(written.sync.is_clean());
        assert!(written.student.qr_code.starts_with("STU-"));
        assert_eq!(written.student.parent_phone, "0501234567");
        let parent = store.get_user("parent_1").await.unwrap().unwrap();
        assert!(parent.child(&written.student.id).is_some());
    }

    #[tokio::test]
    async fn duplicate_qr_code_is_rejected() {
        let store = FixtureStore::seeded().await;
        let mut req = create_req("Sara", "");
        req.qr_code = Some("STU001".into());

        let err = StudentService::create(&store, req).await.unwrap_err();
        assert_eq!(err.kind(), "already-exists");
    }

    #[tokio::test]
    async fn create_succeeds_when_parent_is_missing() {
        let store = FixtureStore::seeded().await;
        let written = StudentService::create(&store, create_req("Sara", "nobody")).await.unwrap();

        assert_eq!(written.sync.failures.len(), 1);
        assert!(store.get_student(&written.student.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reparent_through_update() {
        let store = FixtureStore::seeded().await;
        let req = UpdateStudentRequest {
            parent_id: Some("parent_2".into()),
            ..Default::default()
        };
        let written = StudentService::update(&store, "student_1", req).await.unwrap();

        assert_eq!(written.student.parent_name, "عبدالله محمد");
        let old = store.get_user("parent_1").await.unwrap().unwrap();
        let new = store.get_user("parent_2").await.unwrap().unwrap();
        assert!(old.child("student_1").is_none());
        assert!(new.child("student_1").unwrap().mirrors(&written.student));
    }

    #[tokio::test]
    async fn deactivate_then_reactivate_requires_relink() {
        let store = FixtureStore::seeded().await;
        StudentService::deactivate(&store, "student_2").await.unwrap();
        let parent = store.get_user("parent_2").await.unwrap().unwrap();
        assert!(parent.child("student_2").is_none());

        let listed = StudentService::list(&store, &StudentQuery::default()).await.unwrap();
        assert!(listed.iter().all(|s| s.id != "student_2"));

        let req = UpdateStudentRequest { is_active: Some(true), ..Default::default() };
        StudentService::update(&store, "student_2", req).await.unwrap();
        let parent = store.get_user("parent_2").await.unwrap().unwrap();
        assert!(parent.child("student_2").is_none());

        StudentService::relink(&store, "student_2").await.unwrap();
        let parent = store.get_user("parent_2").await.unwrap().unwrap();
        assert!(parent.child("student_2").is_some());
    }

    #[tokio::test]
    async fn approve_assigns_known_bus_only() {
        let store = FixtureStore::seeded().await;
        let err = StudentService::approve(
            &store,
            "student_1",
            ApproveStudentRequest { bus_id: Some("bus_99".into()) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "not-found");

        let student = StudentService::approve(
            &store,
            "student_1",
            ApproveStudentRequest { bus_id: Some("bus_1".into()) },
        )
        .await
        .unwrap();
        assert_eq!(student.approval_status, ApprovalStatus::Approved);
        assert_eq!(student.bus_id.as_deref(), Some("bus_1"));
        assert!(student.approved_at.is_some());
    }

    #[tokio::test]
    async fn reject_stamps_rejected_at() {
        let store = FixtureStore::seeded().await;
        let student = StudentService::reject(&store, "student_3").await.unwrap();
        assert_eq!(student.approval_status, ApprovalStatus::Rejected);
        assert!(student.rejected_at.is_some());
    }

    #[tokio::test]
    async fn import_skips_incomplete_rows() {
        let store = FixtureStore::new();
        let rows = vec![
            ImportRow::from_pairs([("name", "Ali"), ("parentPhone", "0500000001")]),
            ImportRow::from_pairs([("name", "No Phone")]),
            ImportRow::from_pairs([("name", "Dup"), ("parentPhone", "1"), ("qrCode", "Q1")]),
            ImportRow::from_pairs([("name", "Dup 2"), ("parentPhone", "2"), ("qrCode", "Q1")]),
        ];

        let summary = StudentService::import(&store, rows).await.unwrap();
        assert_eq!(summary, ImportSummary { imported: 2, skipped: 2 });

        let students = store.list_students(None, true).await.unwrap();
        let ali = students.iter().find(|s| s.name == "Ali").unwrap();
        assert_eq!(ali.approval_status, ApprovalStatus::Approved);
        assert_eq!(ali.parent_id, "");
        assert_eq!(ali.grade, UNSPECIFIED);
    }
}
