//! In-memory campus store.
//!
//! Concurrent maps keyed by entity id. Every mutating method returns the
//! updated record so callers can publish it on the event bus.

use chrono::{Duration, NaiveDate, NaiveTime};
use dashmap::DashMap;

use campus_core::{
    new_entity_id, Appointment, AppointmentStatus, AvailabilityStatus, Broadcast,
    BroadcastAudience, CampusResult, DateOverride, EntityId, EntityType, Faculty, Notification,
    ScheduleSlot, StoreError, Timestamp, User, UserRole, ValidationError,
};

use crate::password::PasswordHash;

/// Fields supplied at registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub enrollment_no: Option<String>,
    pub department: Option<String>,
}

/// Fields supplied when a student books an appointment.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub student_id: EntityId,
    pub faculty_id: EntityId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub purpose: String,
}

/// Concurrent in-memory store for all campus entities.
#[derive(Debug, Default)]
pub struct CampusStore {
    users: DashMap<EntityId, User>,
    users_by_email: DashMap<String, EntityId>,
    passwords: DashMap<EntityId, PasswordHash>,
    faculties: DashMap<EntityId, Faculty>,
    faculty_by_user: DashMap<EntityId, EntityId>,
    appointments: DashMap<EntityId, Appointment>,
    broadcasts: DashMap<EntityId, Broadcast>,
    notifications: DashMap<EntityId, Notification>,
}

fn not_found(entity_type: EntityType, id: EntityId) -> StoreError {
    StoreError::NotFound { entity_type, id }
}

fn required(field: &str, value: &str) -> CampusResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        }
        .into());
    }
    Ok(())
}

impl CampusStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // USERS
    // ========================================================================

    /// Register a user. Faculty accounts also get a faculty profile.
    pub fn create_user(
        &self,
        new_user: NewUser,
        password: PasswordHash,
        now: Timestamp,
    ) -> CampusResult<User> {
        required("name", &new_user.name)?;
        required("email", &new_user.email)?;
        let email = new_user.email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(ValidationError::InvalidValue {
                field: "email".to_string(),
                reason: "must contain '@'".to_string(),
            }
            .into());
        }

        let user = User {
            id: new_entity_id(),
            name: new_user.name.trim().to_string(),
            email: email.clone(),
            role: new_user.role,
            image: None,
            enrollment_no: new_user.enrollment_no,
            department: new_user.department,
            created_at: now,
        };

        // Reserve the email atomically before touching the other maps.
        match self.users_by_email.entry(email.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(StoreError::AlreadyExists {
                    entity_type: EntityType::User,
                    key: email,
                }
                .into());
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(user.id);
            }
        }

        self.passwords.insert(user.id, password);
        self.users.insert(user.id, user.clone());

        if user.role == UserRole::Faculty {
            let mut faculty = Faculty::for_user(&user);
            faculty.availability.updated_at = now;
            self.faculty_by_user.insert(user.id, faculty.id);
            self.faculties.insert(faculty.id, faculty);
        }

        tracing::debug!(user_id = %user.id, role = %user.role, "User registered");
        Ok(user)
    }

    pub fn user(&self, id: EntityId) -> CampusResult<User> {
        self.users
            .get(&id)
            .map(|u| u.clone())
            .ok_or_else(|| not_found(EntityType::User, id).into())
    }

    /// Look up a user by email together with their password hash.
    pub fn credentials(&self, email: &str) -> Option<(User, PasswordHash)> {
        let id = *self.users_by_email.get(&email.trim().to_lowercase())?;
        let user = self.users.get(&id)?.clone();
        let hash = self.passwords.get(&id)?.clone();
        Some((user, hash))
    }

    // ========================================================================
    // FACULTY
    // ========================================================================

    /// All faculty profiles ordered by name.
    pub fn faculties(&self) -> Vec<Faculty> {
        let mut all: Vec<Faculty> = self.faculties.iter().map(|f| f.clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        all
    }

    pub fn faculty(&self, id: EntityId) -> CampusResult<Faculty> {
        self.faculties
            .get(&id)
            .map(|f| f.clone())
            .ok_or_else(|| not_found(EntityType::Faculty, id).into())
    }

    /// Faculty profile owned by `user_id`.
    pub fn faculty_for_user(&self, user_id: EntityId) -> CampusResult<Faculty> {
        let faculty_id = self
            .faculty_by_user
            .get(&user_id)
            .map(|id| *id)
            .ok_or(not_found(EntityType::Faculty, user_id))?;
        self.faculty(faculty_id)
    }

    fn update_faculty<F>(&self, faculty_id: EntityId, apply: F) -> CampusResult<Faculty>
    where
        F: FnOnce(&mut Faculty),
    {
        let mut entry = self
            .faculties
            .get_mut(&faculty_id)
            .ok_or(not_found(EntityType::Faculty, faculty_id))?;
        apply(&mut *entry);
        Ok(entry.clone())
    }

    pub fn update_availability(
        &self,
        faculty_id: EntityId,
        status: AvailabilityStatus,
        note: Option<String>,
        now: Timestamp,
    ) -> CampusResult<Faculty> {
        self.update_faculty(faculty_id, |faculty| {
            faculty.availability.status = status;
            faculty.availability.note = note;
            faculty.availability.updated_at = now;
        })
    }

    pub fn add_date_override(
        &self,
        faculty_id: EntityId,
        date_override: DateOverride,
        now: Timestamp,
    ) -> CampusResult<Faculty> {
        self.update_faculty(faculty_id, |faculty| {
            faculty.availability.upsert_override(date_override);
            faculty.availability.updated_at = now;
        })
    }

    /// Replace the weekly schedule slots. The schedule keeps its id.
    pub fn set_weekly_schedule(
        &self,
        faculty_id: EntityId,
        mut slots: Vec<ScheduleSlot>,
    ) -> CampusResult<Faculty> {
        if let Some(bad) = slots.iter().find(|s| s.start_time >= s.end_time) {
            return Err(ValidationError::InvalidValue {
                field: "slots".to_string(),
                reason: format!(
                    "slot on {:?} ends at {} before it starts at {}",
                    bad.day, bad.end_time, bad.start_time
                ),
            }
            .into());
        }
        slots.sort_by_key(|s| (s.day, s.start_time));
        self.update_faculty(faculty_id, |faculty| {
            faculty.weekly_schedule.slots = slots;
        })
    }

    // ========================================================================
    // APPOINTMENTS
    // ========================================================================

    pub fn book_appointment(
        &self,
        request: NewAppointment,
        now: Timestamp,
    ) -> CampusResult<Appointment> {
        required("purpose", &request.purpose)?;
        let faculty = self.faculty(request.faculty_id)?;

        if !faculty.is_bookable(request.date, request.start_time) {
            return Err(ValidationError::SlotUnavailable {
                reason: format!(
                    "{} is not available on {} at {}",
                    faculty.name, request.date, request.start_time
                ),
            }
            .into());
        }

        let clash = self.appointments.iter().any(|a| {
            a.faculty_id == request.faculty_id
                && a.date == request.date
                && a.start_time == request.start_time
                && !a.status.is_terminal()
        });
        if clash {
            return Err(ValidationError::SlotUnavailable {
                reason: "slot already booked".to_string(),
            }
            .into());
        }

        let appointment = Appointment {
            id: new_entity_id(),
            student_id: request.student_id,
            faculty_id: request.faculty_id,
            date: request.date,
            start_time: request.start_time,
            purpose: request.purpose.trim().to_string(),
            status: AppointmentStatus::Pending,
            created_at: now,
            reminder_sent: false,
        };
        self.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    pub fn appointment(&self, id: EntityId) -> CampusResult<Appointment> {
        self.appointments
            .get(&id)
            .map(|a| a.clone())
            .ok_or_else(|| not_found(EntityType::Appointment, id).into())
    }

    pub fn update_appointment_status(
        &self,
        id: EntityId,
        status: AppointmentStatus,
    ) -> CampusResult<Appointment> {
        let mut entry = self
            .appointments
            .get_mut(&id)
            .ok_or(not_found(EntityType::Appointment, id))?;
        if !entry.status.can_transition_to(status) {
            return Err(ValidationError::InvalidTransition {
                from: entry.status.to_string(),
                to: status.to_string(),
            }
            .into());
        }
        entry.status = status;
        Ok(entry.clone())
    }

    /// Appointments where `user_id` is the student or the faculty's user,
    /// soonest first.
    pub fn appointments_for_user(&self, user_id: EntityId) -> Vec<Appointment> {
        let faculty_id = self.faculty_by_user.get(&user_id).map(|id| *id);
        let mut found: Vec<Appointment> = self
            .appointments
            .iter()
            .filter(|a| a.student_id == user_id || Some(a.faculty_id) == faculty_id)
            .map(|a| a.clone())
            .collect();
        found.sort_by_key(|a| (a.date, a.start_time));
        found
    }

    /// Approved, not yet reminded appointments starting within `lead` of `now`.
    pub fn due_reminders(&self, now: Timestamp, lead: Duration) -> Vec<Appointment> {
        let horizon = now + lead;
        let mut due: Vec<Appointment> = self
            .appointments
            .iter()
            .filter(|a| {
                let starts_at = a.starts_at();
                a.status == AppointmentStatus::Approved
                    && !a.reminder_sent
                    && starts_at >= now
                    && starts_at <= horizon
            })
            .map(|a| a.clone())
            .collect();
        due.sort_by_key(|a| a.starts_at());
        due
    }

    /// Flag an appointment as reminded. Returns false if it already was.
    pub fn mark_reminded(&self, id: EntityId) -> CampusResult<bool> {
        let mut entry = self
            .appointments
            .get_mut(&id)
            .ok_or(not_found(EntityType::Appointment, id))?;
        if entry.reminder_sent {
            return Ok(false);
        }
        entry.reminder_sent = true;
        Ok(true)
    }

    // ========================================================================
    // BROADCASTS
    // ========================================================================

    pub fn create_broadcast(
        &self,
        author_id: EntityId,
        title: String,
        message: String,
        audience: BroadcastAudience,
        now: Timestamp,
    ) -> CampusResult<Broadcast> {
        required("title", &title)?;
        required("message", &message)?;
        let broadcast = Broadcast {
            id: new_entity_id(),
            title: title.trim().to_string(),
            message: message.trim().to_string(),
            audience,
            author_id,
            created_at: now,
        };
        self.broadcasts.insert(broadcast.id, broadcast.clone());
        Ok(broadcast)
    }

    /// Broadcasts visible to `role`, newest first. Anonymous callers only see
    /// broadcasts addressed to everyone.
    pub fn broadcasts_for(&self, role: Option<UserRole>) -> Vec<Broadcast> {
        let mut visible: Vec<Broadcast> = self
            .broadcasts
            .iter()
            .filter(|b| match role {
                Some(role) => b.audience.includes(role),
                None => b.audience == BroadcastAudience::All,
            })
            .map(|b| b.clone())
            .collect();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        visible
    }

    // ========================================================================
    // NOTIFICATIONS
    // ========================================================================

    pub fn push_notification(&self, notification: Notification) -> CampusResult<Notification> {
        if !self.users.contains_key(&notification.user_id) {
            return Err(not_found(EntityType::User, notification.user_id).into());
        }
        self.notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    /// Notifications for `user_id`, newest first.
    pub fn notifications_for(&self, user_id: EntityId) -> Vec<Notification> {
        let mut mine: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| n.clone())
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        mine
    }

    /// Mark a notification read. Only its owner may do so.
    pub fn mark_notification_read(
        &self,
        user_id: EntityId,
        id: EntityId,
    ) -> CampusResult<Notification> {
        let mut entry = self
            .notifications
            .get_mut(&id)
            .filter(|n| n.user_id == user_id)
            .ok_or(not_found(EntityType::Notification, id))?;
        entry.read = true;
        Ok(entry.clone())
    }
}
