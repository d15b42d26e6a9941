//! GraphQL object, enum and input types.
//!
//! Domain types from `campus-core` are mapped into GraphQL-facing types here.
//! Dates travel as `YYYY-MM-DD`, times as `HH:MM`, timestamps as RFC 3339.

use async_graphql::{Enum, InputObject, SimpleObject, ID};
use chrono::{NaiveDate, NaiveTime};

use campus_core::{
    Appointment, AppointmentStatus, AvailabilityStatus, Broadcast, BroadcastAudience,
    DateOverride, DayOfWeek, EntityId, Faculty, FacultyAvailability, Notification, ScheduleSlot,
    User, UserRole, WeeklySchedule,
};

use crate::error::{ApiError, ApiResult};

// ============================================================================
// ENUMS
// ============================================================================

/// Generates a GraphQL enum mirroring a core enum, with conversions both ways.
macro_rules! gql_enum {
    ($gql:ident, $core:ident, $name:literal, { $($variant:ident),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
        #[graphql(name = $name)]
        pub enum $gql {
            $($variant),+
        }

        impl From<$core> for $gql {
            fn from(value: $core) -> Self {
                match value {
                    $($core::$variant => $gql::$variant),+
                }
            }
        }

        impl From<$gql> for $core {
            fn from(value: $gql) -> Self {
                match value {
                    $($gql::$variant => $core::$variant),+
                }
            }
        }
    };
}

gql_enum!(GqlUserRole, UserRole, "UserRole", { Student, Faculty, Admin });
gql_enum!(GqlAvailabilityStatus, AvailabilityStatus, "AvailabilityStatus", {
    Available, Busy, InMeeting, OnLeave, Away,
});
gql_enum!(GqlAppointmentStatus, AppointmentStatus, "AppointmentStatus", {
    Pending, Approved, Rejected, Cancelled, Completed,
});
gql_enum!(GqlBroadcastAudience, BroadcastAudience, "BroadcastAudience", {
    All, Students, Faculty,
});
gql_enum!(GqlDayOfWeek, DayOfWeek, "DayOfWeek", {
    Monday, Tuesday, Wednesday, Thursday, Friday, Saturday, Sunday,
});

// ============================================================================
// SCALAR HELPERS
// ============================================================================

pub fn parse_id(field: &str, id: &ID) -> ApiResult<EntityId> {
    EntityId::parse_str(&id.0).map_err(|_| ApiError::invalid_format(field, "UUID"))
}

pub fn parse_date(field: &str, raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::invalid_format(field, "YYYY-MM-DD"))
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(field: &str, raw: &str) -> ApiResult<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| ApiError::invalid_format(field, "HH:MM"))
}

fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn gql_id(id: EntityId) -> ID {
    ID(id.to_string())
}

// ============================================================================
// OBJECTS
// ============================================================================

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "User")]
pub struct GqlUser {
    pub id: ID,
    pub name: String,
    pub email: String,
    pub role: GqlUserRole,
    pub image: Option<String>,
    pub enrollment_no: Option<String>,
    pub department: Option<String>,
    pub created_at: String,
}

impl From<User> for GqlUser {
    fn from(u: User) -> Self {
        Self {
            id: gql_id(u.id),
            name: u.name,
            email: u.email,
            role: u.role.into(),
            image: u.image,
            enrollment_no: u.enrollment_no,
            department: u.department,
            created_at: u.created_at.to_rfc3339(),
        }
    }
}

/// A one-day exception to the weekly schedule.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "DateOverride")]
pub struct GqlDateOverride {
    pub date: String,
    pub available: bool,
    pub note: Option<String>,
}

impl From<DateOverride> for GqlDateOverride {
    fn from(o: DateOverride) -> Self {
        Self {
            date: o.date.to_string(),
            available: o.available,
            note: o.note,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "FacultyAvailability")]
pub struct GqlFacultyAvailability {
    pub status: GqlAvailabilityStatus,
    pub note: Option<String>,
    pub updated_at: String,
    pub date_overrides: Vec<GqlDateOverride>,
}

impl From<FacultyAvailability> for GqlFacultyAvailability {
    fn from(a: FacultyAvailability) -> Self {
        Self {
            status: a.status.into(),
            note: a.note,
            updated_at: a.updated_at.to_rfc3339(),
            date_overrides: a.date_overrides.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "ScheduleSlot")]
pub struct GqlScheduleSlot {
    pub day: GqlDayOfWeek,
    pub start_time: String,
    pub end_time: String,
}

impl From<ScheduleSlot> for GqlScheduleSlot {
    fn from(s: ScheduleSlot) -> Self {
        Self {
            day: s.day.into(),
            start_time: format_time(s.start_time),
            end_time: format_time(s.end_time),
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "WeeklySchedule")]
pub struct GqlWeeklySchedule {
    pub id: ID,
    pub slots: Vec<GqlScheduleSlot>,
}

impl From<WeeklySchedule> for GqlWeeklySchedule {
    fn from(w: WeeklySchedule) -> Self {
        Self {
            id: gql_id(w.id),
            slots: w.slots.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Faculty")]
pub struct GqlFaculty {
    pub id: ID,
    pub user_id: ID,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub image: Option<String>,
    pub availability: GqlFacultyAvailability,
    pub weekly_schedule: GqlWeeklySchedule,
}

impl From<Faculty> for GqlFaculty {
    fn from(f: Faculty) -> Self {
        Self {
            id: gql_id(f.id),
            user_id: gql_id(f.user_id),
            name: f.name,
            email: f.email,
            department: f.department,
            designation: f.designation,
            image: f.image,
            availability: f.availability.into(),
            weekly_schedule: f.weekly_schedule.into(),
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Appointment")]
pub struct GqlAppointment {
    pub id: ID,
    pub student_id: ID,
    pub faculty_id: ID,
    pub date: String,
    pub start_time: String,
    pub purpose: String,
    pub status: GqlAppointmentStatus,
    pub created_at: String,
    pub reminder_sent: bool,
}

impl From<Appointment> for GqlAppointment {
    fn from(a: Appointment) -> Self {
        Self {
            id: gql_id(a.id),
            student_id: gql_id(a.student_id),
            faculty_id: gql_id(a.faculty_id),
            date: a.date.to_string(),
            start_time: format_time(a.start_time),
            purpose: a.purpose,
            status: a.status.into(),
            created_at: a.created_at.to_rfc3339(),
            reminder_sent: a.reminder_sent,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Broadcast")]
pub struct GqlBroadcast {
    pub id: ID,
    pub title: String,
    pub message: String,
    pub audience: GqlBroadcastAudience,
    pub author_id: ID,
    pub created_at: String,
}

impl From<Broadcast> for GqlBroadcast {
    fn from(b: Broadcast) -> Self {
        Self {
            id: gql_id(b.id),
            title: b.title,
            message: b.message,
            audience: b.audience.into(),
            author_id: gql_id(b.author_id),
            created_at: b.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Notification")]
pub struct GqlNotification {
    pub id: ID,
    pub user_id: ID,
    pub title: String,
    pub body: String,
    pub created_at: String,
    pub read: bool,
}

impl From<Notification> for GqlNotification {
    fn from(n: Notification) -> Self {
        Self {
            id: gql_id(n.id),
            user_id: gql_id(n.user_id),
            title: n.title,
            body: n.body,
            created_at: n.created_at.to_rfc3339(),
            read: n.read,
        }
    }
}

/// Issued token plus the account it belongs to.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "AuthPayload")]
pub struct GqlAuthPayload {
    pub token: String,
    pub user: GqlUser,
}

// ============================================================================
// INPUTS
// ============================================================================

#[derive(Debug, Clone, InputObject)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<GqlUserRole>,
    pub enrollment_no: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, InputObject)]
pub struct ScheduleSlotInput {
    pub day: GqlDayOfWeek,
    pub start_time: String,
    pub end_time: String,
}

impl ScheduleSlotInput {
    pub fn into_slot(self) -> ApiResult<ScheduleSlot> {
        Ok(ScheduleSlot {
            day: self.day.into(),
            start_time: parse_time("startTime", &self.start_time)?,
            end_time: parse_time("endTime", &self.end_time)?,
        })
    }
}

#[derive(Debug, Clone, InputObject)]
pub struct BookAppointmentInput {
    pub faculty_id: ID,
    pub date: String,
    pub start_time: String,
    pub purpose: String,
}
