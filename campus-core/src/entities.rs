//! Entity records held by the server store and mirrored by client types.

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{
    AppointmentStatus, AvailabilityStatus, BroadcastAudience, DayOfWeek, UserRole,
};
use crate::{new_entity_id, EntityId, Timestamp};

// ============================================================================
// USERS
// ============================================================================

/// A campus account (student, faculty member or administrator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: EntityId,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub image: Option<String>,
    pub enrollment_no: Option<String>,
    pub department: Option<String>,
    pub created_at: Timestamp,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: new_entity_id(),
            name: name.into(),
            email: email.into(),
            role,
            image: None,
            enrollment_no: None,
            department: None,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// FACULTY
// ============================================================================

/// One-day exception to the regular availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateOverride {
    pub date: NaiveDate,
    pub available: bool,
    pub note: Option<String>,
}

/// Current availability of a faculty member. Has no identity of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyAvailability {
    pub status: AvailabilityStatus,
    pub note: Option<String>,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub date_overrides: Vec<DateOverride>,
}

impl Default for FacultyAvailability {
    fn default() -> Self {
        Self {
            status: AvailabilityStatus::default(),
            note: None,
            updated_at: Utc::now(),
            date_overrides: Vec::new(),
        }
    }
}

impl FacultyAvailability {
    /// Insert or replace the override for `date_override.date`.
    pub fn upsert_override(&mut self, date_override: DateOverride) {
        match self
            .date_overrides
            .iter_mut()
            .find(|existing| existing.date == date_override.date)
        {
            Some(existing) => *existing = date_override,
            None => {
                self.date_overrides.push(date_override);
                self.date_overrides.sort_by_key(|o| o.date);
            }
        }
    }

    pub fn override_for(&self, date: NaiveDate) -> Option<&DateOverride> {
        self.date_overrides.iter().find(|o| o.date == date)
    }
}

/// A recurring weekly office-hours slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSlot {
    pub day: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl ScheduleSlot {
    pub fn contains(&self, day: DayOfWeek, time: NaiveTime) -> bool {
        self.day == day && self.start_time <= time && time < self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySchedule {
    pub id: EntityId,
    pub slots: Vec<ScheduleSlot>,
}

impl Default for WeeklySchedule {
    fn default() -> Self {
        Self {
            id: new_entity_id(),
            slots: Vec::new(),
        }
    }
}

/// Faculty profile linked to a user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Faculty {
    pub id: EntityId,
    pub user_id: EntityId,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub image: Option<String>,
    pub availability: FacultyAvailability,
    pub weekly_schedule: WeeklySchedule,
}

impl Faculty {
    pub fn for_user(user: &User) -> Self {
        Self {
            id: new_entity_id(),
            user_id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            department: user.department.clone(),
            designation: None,
            image: user.image.clone(),
            availability: FacultyAvailability::default(),
            weekly_schedule: WeeklySchedule::default(),
        }
    }

    /// Whether a booking at `date`/`time` is acceptable.
    ///
    /// A date override wins over the weekly schedule. Without a schedule the
    /// faculty is bookable whenever the live status accepts bookings.
    pub fn is_bookable(&self, date: NaiveDate, time: NaiveTime) -> bool {
        if let Some(date_override) = self.availability.override_for(date) {
            return date_override.available;
        }
        if self.weekly_schedule.slots.is_empty() {
            return self.availability.status.accepts_bookings();
        }
        let day = DayOfWeek::from(chrono::Datelike::weekday(&date));
        self.weekly_schedule
            .slots
            .iter()
            .any(|slot| slot.contains(day, time))
    }
}

// ============================================================================
// APPOINTMENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: EntityId,
    pub student_id: EntityId,
    pub faculty_id: EntityId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub purpose: String,
    pub status: AppointmentStatus,
    pub created_at: Timestamp,
    pub reminder_sent: bool,
}

impl Appointment {
    /// Start of the appointment, interpreted as UTC.
    pub fn starts_at(&self) -> Timestamp {
        Utc.from_utc_datetime(&self.date.and_time(self.start_time))
    }
}

// ============================================================================
// BROADCASTS & NOTIFICATIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast {
    pub id: EntityId,
    pub title: String,
    pub message: String,
    pub audience: BroadcastAudience,
    pub author_id: EntityId,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: EntityId,
    pub user_id: EntityId,
    pub title: String,
    pub body: String,
    pub created_at: Timestamp,
    pub read: bool,
}

impl Notification {
    pub fn new(user_id: EntityId, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: new_entity_id(),
            user_id,
            title: title.into(),
            body: body.into(),
            created_at: Utc::now(),
            read: false,
        }
    }
}
