//! In-memory data source used for local development (`DATA_SOURCE=fixture`)
//! and by the test suite. Every method holds the lock for the whole mutation,
//! giving the same per-document atomicity the remote store provides.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::{DataSource, StoreError};
use crate::models::{
    bus::Bus,
    complaint::{Complaint, ComplaintPriority, ComplaintStatus},
    notification::{
        AuditRecord, EmailQueueItem, NotificationRecord, NotificationStats, PushQueueItem,
        QueueOutcome, QueueStatus,
    },
    route::BusRoute,
    settings::{SettingsDoc, SettingsEntry},
    student::{ApprovalStatus, CurrentStatus, Student},
    trip::Trip,
    user::{ChildRef, User, UserType},
};

/// Failure injected into the fixture to exercise partial-failure paths.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Every write touching this user record fails.
    UserWrite(String),
    /// Audit appends fail.
    AuditWrite,
    /// Delete batches succeed this many times, then fail.
    DeleteBatchesAfter(usize),
}

#[derive(Default)]
struct FixtureState {
    users: HashMap<String, User>,
    passwords: HashMap<String, String>,
    students: HashMap<String, Student>,
    buses: HashMap<String, Bus>,
    bus_routes: HashMap<String, BusRoute>,
    settings: BTreeMap<String, SettingsDoc>,
    trips: Vec<Trip>,
    complaints: HashMap<String, Complaint>,
    notifications: HashMap<String, NotificationRecord>,
    stats: HashMap<String, NotificationStats>,
    push_queue: HashMap<String, PushQueueItem>,
    email_queue: HashMap<String, EmailQueueItem>,
    audit: Vec<AuditRecord>,
    faults: Vec<Fault>,
    delete_batches: usize,
}

impl FixtureState {
    fn user_write_blocked(&self, user_id: &str) -> Result<(), StoreError> {
        if self.faults.iter().any(|f| matches!(f, Fault::UserWrite(id) if id == user_id)) {
            return Err(StoreError::Unavailable(format!("injected write failure for user {user_id}")));
        }
        Ok(())
    }

    fn delete_blocked(&mut self) -> Result<(), StoreError> {
        let limit = self.faults.iter().find_map(|f| match f {
            Fault::DeleteBatchesAfter(n) => Some(*n),
            _ => None,
        });
        if let Some(limit) = limit {
            if self.delete_batches >= limit {
                return Err(StoreError::Unavailable("injected delete batch failure".into()));
            }
        }
        self.delete_batches += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct FixtureStore {
    state: RwLock<FixtureState>,
}

impl FixtureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn inject(&self, fault: Fault) {
        self.state.write().await.faults.push(fault);
    }

    pub async fn clear_faults(&self) {
        let mut state = self.state.write().await;
        state.faults.clear();
        state.delete_batches = 0;
    }

    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.state.read().await.audit.clone()
    }

    pub async fn insert_trip(&self, trip: Trip) {
        self.state.write().await.trips.push(trip);
    }

    pub async fn notification_count(&self) -> usize {
        self.state.read().await.notifications.len()
    }

    pub async fn push_item_count(&self) -> usize {
        self.state.read().await.push_queue.len()
    }

    /// Demo dataset: six buses with matching routes, six parents each with one
    /// student, and a few complaints. Ids are stable (`bus_1`, `route_1`,
    /// `parent_1`, `student_1`, ...).
    pub async fn seeded() -> Self {
        let store = Self::new();
        let now = Utc::now();

        let buses = [
            ("أ ب ج 123", "الرياض - حي النرجس", "أحمد محمد", "0501234567", 30),
            ("د هـ و 456", "الرياض - حي الملقا", "محمد علي", "0507654321", 25),
            ("ز ح ط 789", "الرياض - حي العليا", "سعد أحمد", "0551234567", 35),
            ("ي ك ل 012", "الرياض - حي الورود", "عبدالله سالم", "0509876543", 28),
            ("م ن س 345", "الرياض - حي الصحافة", "خالد يوسف", "0556789012", 32),
            ("ع ف ص 678", "الرياض - حي الياسمين", "فهد عبدالرحمن", "0503456789", 30),
        ];

        // (student, grade, school, approval, parent, parent phone)
        let families = [
            ("أحمد محمد علي", "الثالث الابتدائي", "مدرسة النور الابتدائية", ApprovalStatus::Pending, "محمد علي أحمد", "0501234567"),
            ("فاطمة عبدالله", "الخامس الابتدائي", "مدرسة الأمل الابتدائية", ApprovalStatus::Approved, "عبدالله محمد", "0507654321"),
            ("خالد سعد", "الأول الابتدائي", "مدرسة المستقبل الابتدائية", ApprovalStatus::Pending, "سعد خالد", "0551234567"),
            ("نورا أحمد", "الرابع الابتدائي", "مدرسة الفجر الابتدائية", ApprovalStatus::Approved, "أحمد عبدالرحمن", "0509876543"),
            ("عبدالرحمن يوسف", "الثاني الابتدائي", "مدرسة الرسالة الابتدائية", ApprovalStatus::Rejected, "يوسف عبدالرحمن", "0556789012"),
            ("مريم سالم", "السادس الابتدائي", "مدرسة الهدى الابتدائية", ApprovalStatus::Pending, "سالم مريم", "0503456789"),
        ];

        {
            let mut state = store.state.write().await;

            for (n, (plate, route, driver, phone, capacity)) in buses.iter().enumerate() {
                let bus = Bus {
                    id: format!("bus_{}", n + 1),
                    plate_number: plate.to_string(),
                    driver_name: driver.to_string(),
                    driver_phone: phone.to_string(),
                    route: route.to_string(),
                    capacity: *capacity,
                    is_active: true,
                    students_count: 0,
                };
                state.buses.insert(bus.id.clone(), bus);

                let bus_route = BusRoute {
                    id: format!("route_{}", n + 1),
                    name: route.to_string(),
                    description: None,
                    stops: Vec::new(),
                    created_at: now,
                    updated_at: now,
                };
                state.bus_routes.insert(bus_route.id.clone(), bus_route);
            }

            for (n, (name, grade, school, approval, parent_name, parent_phone)) in
                families.into_iter().enumerate()
            {
                let mut parent = User {
                    id: format!("parent_{}", n + 1),
                    name: parent_name.into(),
                    email: format!("parent{}@mybus.com", n + 1),
                    phone: parent_phone.into(),
                    user_type: UserType::Parent,
                    is_active: true,
                    children: Vec::new(),
                    permissions: None,
                    fcm_token: None,
                    created_at: now,
                    updated_at: now,
                };
                let student = Student {
                    id: format!("student_{}", n + 1),
                    name: name.into(),
                    parent_id: parent.id.clone(),
                    parent_name: parent_name.into(),
                    parent_phone: parent_phone.into(),
                    school_name: school.into(),
                    grade: grade.into(),
                    bus_route: buses[n].1.into(),
                    bus_id: None,
                    current_status: CurrentStatus::Home,
                    qr_code: format!("STU{:03}", n + 1),
                    is_active: true,
                    approval_status: approval,
                    approved_at: None,
                    rejected_at: None,
                    deleted_at: None,
                    created_at: now - Duration::days(n as i64 + 1),
                    updated_at: now,
                };
                parent.children.push(ChildRef::from_student(&student, now));
                state.users.insert(parent.id.clone(), parent);
                state.students.insert(student.id.clone(), student);
            }

            let complaints = [
                ("تأخر الحافلة", "الحافلة تأخرت 30 دقيقة صباح اليوم", "محمد علي أحمد", "timing", ComplaintPriority::High, ComplaintStatus::Pending),
                ("سلوك السائق", "السائق يقود بسرعة عالية", "عبدالله محمد", "driverBehavior", ComplaintPriority::Urgent, ComplaintStatus::InProgress),
                ("تغيير المسار", "طلب تعديل نقطة التوقف", "سعد خالد", "busService", ComplaintPriority::Low, ComplaintStatus::Resolved),
            ];
            for (n, (title, description, parent, kind, priority, status)) in complaints.into_iter().enumerate() {
                let complaint = Complaint {
                    id: format!("complaint_{}", n + 1),
                    title: title.into(),
                    description: description.into(),
                    parent_name: parent.into(),
                    parent_phone: String::new(),
                    student_name: None,
                    kind: kind.into(),
                    priority,
                    status,
                    admin_response: None,
                    response_date: None,
                    status_note: None,
                    assigned_to: None,
                    is_active: true,
                    created_at: now - Duration::hours(12 * (n as i64 + 1)),
                    updated_at: now,
                };
                state.complaints.insert(complaint.id.clone(), complaint);
            }
        }

        store
    }
}

fn sorted<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl DataSource for FixtureStore {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(id).cloned())
    }

    async fn find_credentials(
        &self,
        email: &str,
    ) -> Result<Option<(User, Option<String>)>, StoreError> {
        let state = self.state.read().await;
        let email = email.trim().to_lowercase();
        Ok(state
            .users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .map(|u| (u.clone(), state.passwords.get(&u.id).cloned())))
    }

    async fn insert_user(&self, user: &User, password_hash: Option<&str>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let email = user.email.to_lowercase();
        if state.users.contains_key(&user.id)
            || state.users.values().any(|u| u.email.to_lowercase() == email)
        {
            return Err(StoreError::Conflict(format!("user {}", user.email)));
        }
        if let Some(hash) = password_hash {
            state.passwords.insert(user.id.clone(), hash.to_string());
        }
        state.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_user_profile(&self, user: &User) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        state.user_write_blocked(&user.id)?;
        let Some(existing) = state.users.get_mut(&user.id) else {
            return Ok(false);
        };
        let children = std::mem::take(&mut existing.children);
        *existing = User { children, ..user.clone() };
        Ok(true)
    }

    async fn list_users(&self, user_type: UserType, active_only: bool) -> Result<Vec<User>, StoreError> {
        let state = self.state.read().await;
        let users = state
            .users
            .values()
            .filter(|u| u.user_type == user_type && (!active_only || u.is_active))
            .cloned()
            .collect();
        Ok(sorted(users, |u: &User| u.name.clone()))
    }

    async fn set_fcm_token(&self, user_id: &str, token: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        state.user_write_blocked(user_id)?;
        Ok(match state.users.get_mut(user_id) {
            Some(user) => {
                user.fcm_token = Some(token.to_string());
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn upsert_child_ref(&self, parent_id: &str, child: &ChildRef) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        state.user_write_blocked(parent_id)?;
        let Some(parent) = state.users.get_mut(parent_id) else {
            return Ok(false);
        };
        match parent.children.iter_mut().find(|c| c.id == child.id) {
            Some(existing) => {
                *existing = ChildRef { added_at: existing.added_at, ..child.clone() };
            }
            None => parent.children.push(child.clone()),
        }
        parent.updated_at = Utc::now();
        Ok(true)
    }

    async fn remove_child_ref(&self, parent_id: &str, student_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        state.user_write_blocked(parent_id)?;
        let Some(parent) = state.users.get_mut(parent_id) else {
            return Ok(false);
        };
        parent.children.retain(|c| c.id != student_id);
        parent.updated_at = Utc::now();
        Ok(true)
    }

    async fn get_student(&self, id: &str) -> Result<Option<Student>, StoreError> {
        Ok(self.state.read().await.students.get(id).cloned())
    }

    async fn find_student_by_qr(&self, qr_code: &str) -> Result<Option<Student>, StoreError> {
        let state = self.state.read().await;
        Ok(state.students.values().find(|s| s.qr_code == qr_code).cloned())
    }

    async fn list_students(
        &self,
        parent_id: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<Student>, StoreError> {
        let state = self.state.read().await;
        let students = state
            .students
            .values()
            .filter(|s| parent_id.map_or(true, |p| s.parent_id == p))
            .filter(|s| !active_only || s.is_active)
            .cloned()
            .collect();
        Ok(sorted(students, |s: &Student| s.name.clone()))
    }

    async fn insert_students(&self, students: &[Student]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for s in students {
            if state.students.contains_key(&s.id)
                || state.students.values().any(|existing| existing.qr_code == s.qr_code)
            {
                return Err(StoreError::Conflict(format!("student qr code {}", s.qr_code)));
            }
        }
        for s in students {
            state.students.insert(s.id.clone(), s.clone());
        }
        Ok(())
    }

    async fn update_student(&self, student: &Student) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if state
            .students
            .values()
            .any(|s| s.id != student.id && s.qr_code == student.qr_code)
        {
            return Err(StoreError::Conflict(format!("student qr code {}", student.qr_code)));
        }
        Ok(match state.students.get_mut(&student.id) {
            Some(existing) => {
                *existing = student.clone();
                true
            }
            None => false,
        })
    }

    async fn get_bus(&self, id: &str) -> Result<Option<Bus>, StoreError> {
        Ok(self.state.read().await.buses.get(id).cloned())
    }

    async fn list_buses(&self, active_only: bool) -> Result<Vec<Bus>, StoreError> {
        let state = self.state.read().await;
        let buses = state
            .buses
            .values()
            .filter(|b| !active_only || b.is_active)
            .cloned()
            .collect();
        Ok(sorted(buses, |b: &Bus| b.plate_number.clone()))
    }

    async fn insert_bus(&self, bus: &Bus) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.buses.contains_key(&bus.id) {
            return Err(StoreError::Conflict(format!("bus {}", bus.id)));
        }
        state.buses.insert(bus.id.clone(), bus.clone());
        Ok(())
    }

    async fn update_bus(&self, bus: &Bus) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(match state.buses.get_mut(&bus.id) {
            Some(existing) => {
                *existing = bus.clone();
                true
            }
            None => false,
        })
    }

    async fn list_trips(&self, limit: i64) -> Result<Vec<Trip>, StoreError> {
        let state = self.state.read().await;
        let mut trips = state.trips.clone();
        trips.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        trips.truncate(limit.max(0) as usize);
        Ok(trips)
    }

    async fn count_trips_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let state = self.state.read().await;
        Ok(state.trips.iter().filter(|t| t.timestamp >= since).count() as i64)
    }

    async fn get_bus_route(&self, id: &str) -> Result<Option<BusRoute>, StoreError> {
        Ok(self.state.read().await.bus_routes.get(id).cloned())
    }

    async fn list_bus_routes(&self) -> Result<Vec<BusRoute>, StoreError> {
        let state = self.state.read().await;
        let routes = state.bus_routes.values().cloned().collect();
        Ok(sorted(routes, |r: &BusRoute| r.name.clone()))
    }

    async fn insert_bus_route(&self, route: &BusRoute) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.bus_routes.contains_key(&route.id) {
            return Err(StoreError::Conflict(format!("bus route {}", route.id)));
        }
        state.bus_routes.insert(route.id.clone(), route.clone());
        Ok(())
    }

    async fn update_bus_route(&self, route: &BusRoute) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(match state.bus_routes.get_mut(&route.id) {
            Some(existing) => {
                *existing = route.clone();
                true
            }
            None => false,
        })
    }

    async fn delete_bus_route(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.state.write().await.bus_routes.remove(id).is_some())
    }

    async fn list_settings(&self) -> Result<Vec<SettingsEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .settings
            .iter()
            .map(|(category, values)| SettingsEntry {
                category: category.clone(),
                values: values.clone(),
            })
            .collect())
    }

    async fn merge_settings(&self, category: &str, values: &SettingsDoc) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let doc = state.settings.entry(category.to_string()).or_default();
        for (key, value) in values {
            doc.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn get_complaint(&self, id: &str) -> Result<Option<Complaint>, StoreError> {
        Ok(self.state.read().await.complaints.get(id).cloned())
    }

    async fn list_complaints(&self, active_only: bool) -> Result<Vec<Complaint>, StoreError> {
        let state = self.state.read().await;
        let mut complaints: Vec<Complaint> = state
            .complaints
            .values()
            .filter(|c| !active_only || c.is_active)
            .cloned()
            .collect();
        complaints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(complaints)
    }

    async fn insert_complaint(&self, complaint: &Complaint) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.complaints.contains_key(&complaint.id) {
            return Err(StoreError::Conflict(format!("complaint {}", complaint.id)));
        }
        state.complaints.insert(complaint.id.clone(), complaint.clone());
        Ok(())
    }

    async fn update_complaint(&self, complaint: &Complaint) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(match state.complaints.get_mut(&complaint.id) {
            Some(existing) => {
                *existing = complaint.clone();
                true
            }
            None => false,
        })
    }

    async fn get_notification(&self, id: &str) -> Result<Option<NotificationRecord>, StoreError> {
        Ok(self.state.read().await.notifications.get(id).cloned())
    }

    async fn list_notifications(
        &self,
        recipient_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<NotificationRecord> = state
            .notifications
            .values()
            .filter(|n| recipient_id.map_or(true, |r| n.recipient_id == r))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn insert_notifications(&self, records: &[NotificationRecord]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(dup) = records.iter().find(|r| state.notifications.contains_key(&r.id)) {
            return Err(StoreError::Conflict(format!("notification {}", dup.id)));
        }
        for r in records {
            state.notifications.insert(r.id.clone(), r.clone());
        }
        Ok(())
    }

    async fn mark_notification_read(
        &self,
        id: &str,
        reader: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(match state.notifications.get_mut(id) {
            Some(n) if !n.is_read => {
                n.is_read = true;
                n.read_at = Some(at);
                n.read_by = Some(reader.to_string());
                true
            }
            _ => false,
        })
    }

    async fn bump_notification_stats(
        &self,
        scope: &str,
        kind: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let stats = state.stats.entry(scope.to_string()).or_default();
        stats.total_notifications += 1;
        *stats.by_type.entry(kind.to_string()).or_insert(0) += 1;
        stats.last_notification_at = Some(at);
        Ok(())
    }

    async fn notification_stats(&self, scope: &str) -> Result<Option<NotificationStats>, StoreError> {
        Ok(self.state.read().await.stats.get(scope).cloned())
    }

    async fn insert_push_item(&self, item: &PushQueueItem) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.push_queue.contains_key(&item.id) {
            return Err(StoreError::Conflict(format!("fcm_queue {}", item.id)));
        }
        state.push_queue.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_push_item(&self, id: &str) -> Result<Option<PushQueueItem>, StoreError> {
        Ok(self.state.read().await.push_queue.get(id).cloned())
    }

    async fn complete_push_item(&self, id: &str, outcome: &QueueOutcome) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(match state.push_queue.get_mut(id) {
            Some(item) if item.status == QueueStatus::Queued => {
                item.apply(outcome);
                true
            }
            _ => false,
        })
    }

    async fn insert_email_item(&self, item: &EmailQueueItem) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.email_queue.contains_key(&item.id) {
            return Err(StoreError::Conflict(format!("email_queue {}", item.id)));
        }
        state.email_queue.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_email_item(&self, id: &str) -> Result<Option<EmailQueueItem>, StoreError> {
        Ok(self.state.read().await.email_queue.get(id).cloned())
    }

    async fn complete_email_item(&self, id: &str, outcome: &QueueOutcome) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(match state.email_queue.get_mut(id) {
            Some(item) if item.status == QueueStatus::Queued => {
                item.apply(outcome);
                true
            }
            _ => false,
        })
    }

    async fn queued_push_item_ids(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        let queued: Vec<&PushQueueItem> = state
            .push_queue
            .values()
            .filter(|i| i.status == QueueStatus::Queued)
            .collect();
        Ok(sorted(queued, |i: &&PushQueueItem| i.created_at)
            .into_iter()
            .map(|i| i.id.clone())
            .collect())
    }

    async fn queued_email_item_ids(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        let queued: Vec<&EmailQueueItem> = state
            .email_queue
            .values()
            .filter(|i| i.status == QueueStatus::Queued)
            .collect();
        Ok(sorted(queued, |i: &&EmailQueueItem| i.created_at)
            .into_iter()
            .map(|i| i.id.clone())
            .collect())
    }

    async fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.faults.contains(&Fault::AuditWrite) {
            return Err(StoreError::Unavailable("injected audit write failure".into()));
        }
        state.audit.push(record.clone());
        Ok(())
    }

    async fn expired_notification_ids(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .notifications
            .values()
            .filter(|n| n.timestamp < cutoff)
            .take(limit)
            .map(|n| n.id.clone())
            .collect())
    }

    async fn expired_push_item_ids(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .push_queue
            .values()
            .filter(|i| i.status == QueueStatus::Sent && i.sent_at.is_some_and(|at| at < cutoff))
            .take(limit)
            .map(|i| i.id.clone())
            .collect())
    }

    async fn delete_notifications(&self, ids: &[String]) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        state.delete_blocked()?;
        Ok(ids.iter().filter(|id| state.notifications.remove(*id).is_some()).count() as u64)
    }

    async fn delete_push_items(&self, ids: &[String]) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        state.delete_blocked()?;
        Ok(ids.iter().filter(|id| state.push_queue.remove(*id).is_some()).count() as u64)
    }
}
