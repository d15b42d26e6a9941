//! SmartCampus Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - Proptest generators for domain types
//! - Fixtures for common scenarios, including GraphQL response payloads
//! - Assertions for campus error variants

pub use campus_core::{
    Appointment, AppointmentStatus, AvailabilityStatus, Broadcast, BroadcastAudience,
    CampusError, CampusResult, DateOverride, DayOfWeek, EntityId, EntityType, Faculty,
    FacultyAvailability, Notification, ScheduleSlot, StoreError, Timestamp, User, UserRole,
    ValidationError, WeeklySchedule,
};

use chrono::{NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

pub mod generators {
    //! Proptest strategies for SmartCampus domain types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Timestamps between 2020 and 2030, whole seconds.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_date() -> impl Strategy<Value = NaiveDate> {
        (2024i32..2030, 1u32..=12, 1u32..=28)
            .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default())
    }

    /// Times on a quarter-hour grid.
    pub fn arb_time() -> impl Strategy<Value = NaiveTime> {
        (0u32..24, prop_oneof![Just(0u32), Just(15), Just(30), Just(45)])
            .prop_map(|(h, m)| NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default())
    }

    pub fn arb_user_role() -> impl Strategy<Value = UserRole> {
        prop_oneof![
            Just(UserRole::Student),
            Just(UserRole::Faculty),
            Just(UserRole::Admin),
        ]
    }

    pub fn arb_availability_status() -> impl Strategy<Value = AvailabilityStatus> {
        prop_oneof![
            Just(AvailabilityStatus::Available),
            Just(AvailabilityStatus::Busy),
            Just(AvailabilityStatus::InMeeting),
            Just(AvailabilityStatus::OnLeave),
            Just(AvailabilityStatus::Away),
        ]
    }

    pub fn arb_appointment_status() -> impl Strategy<Value = AppointmentStatus> {
        prop_oneof![
            Just(AppointmentStatus::Pending),
            Just(AppointmentStatus::Approved),
            Just(AppointmentStatus::Rejected),
            Just(AppointmentStatus::Cancelled),
            Just(AppointmentStatus::Completed),
        ]
    }

    pub fn arb_day_of_week() -> impl Strategy<Value = DayOfWeek> {
        prop_oneof![
            Just(DayOfWeek::Monday),
            Just(DayOfWeek::Tuesday),
            Just(DayOfWeek::Wednesday),
            Just(DayOfWeek::Thursday),
            Just(DayOfWeek::Friday),
            Just(DayOfWeek::Saturday),
            Just(DayOfWeek::Sunday),
        ]
    }

    /// Slots that start before they end, within one day.
    pub fn arb_schedule_slot() -> impl Strategy<Value = ScheduleSlot> {
        (arb_day_of_week(), 0u32..23, 1u32..4).prop_map(|(day, start, hours)| ScheduleSlot {
            day,
            start_time: NaiveTime::from_hms_opt(start, 0, 0).unwrap_or_default(),
            end_time: NaiveTime::from_hms_opt((start + hours).min(23), 59, 0)
                .unwrap_or_default(),
        })
    }

    pub fn arb_date_override() -> impl Strategy<Value = DateOverride> {
        (arb_date(), any::<bool>(), proptest::option::of("[a-z ]{1,24}")).prop_map(
            |(date, available, note)| DateOverride {
                date,
                available,
                note,
            },
        )
    }

    pub fn arb_email() -> impl Strategy<Value = String> {
        "[a-z]{1,12}@[a-z]{2,8}\\.edu"
    }

    pub fn arb_user() -> impl Strategy<Value = User> {
        ("[A-Z][a-z]{1,10}", arb_email(), arb_user_role())
            .prop_map(|(name, email, role)| User::new(name, email, role))
    }

    pub fn arb_faculty() -> impl Strategy<Value = Faculty> {
        (
            "[A-Z][a-z]{1,10}",
            arb_email(),
            arb_availability_status(),
            prop::collection::vec(arb_schedule_slot(), 0..4),
        )
            .prop_map(|(name, email, status, slots)| {
                let user = User::new(name, email, UserRole::Faculty);
                let mut faculty = Faculty::for_user(&user);
                faculty.availability.status = status;
                faculty.weekly_schedule.slots = slots;
                faculty
            })
    }
}

pub mod fixtures {
    //! Ready-made entities and GraphQL payloads.

    use super::*;
    use serde_json::{json, Value};

    /// Faculty profile with a Monday 10:00-12:00 office-hours slot.
    pub fn faculty_with_office_hours(user: &User) -> Faculty {
        let mut faculty = Faculty::for_user(user);
        faculty.designation = Some("Associate Professor".to_string());
        faculty.weekly_schedule.slots = vec![ScheduleSlot {
            day: DayOfWeek::Monday,
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default(),
            end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default(),
        }];
        faculty
    }

    /// A `Faculty` object as the server returns it in a GraphQL response.
    pub fn faculty_json(id: &str, name: &str, status: &str) -> Value {
        json!({
            "__typename": "Faculty",
            "id": id,
            "name": name,
            "department": "Computer Engineering",
            "availability": {
                "__typename": "FacultyAvailability",
                "status": status,
                "note": null,
                "dateOverrides": []
            },
            "weeklySchedule": {
                "__typename": "WeeklySchedule",
                "id": format!("ws-{}", id),
                "slots": [
                    { "__typename": "ScheduleSlot", "day": "MONDAY", "startTime": "10:00", "endTime": "12:00" }
                ]
            }
        })
    }

    pub fn broadcast_json(id: &str, title: &str) -> Value {
        json!({
            "__typename": "Broadcast",
            "id": id,
            "title": title,
            "message": "Campus announcement",
            "audience": "ALL",
            "createdAt": "2025-03-03T09:00:00+00:00"
        })
    }
}

pub mod assertions {
    //! Assertions for campus error variants.

    use super::*;

    pub fn assert_not_found<T: std::fmt::Debug>(result: &CampusResult<T>, entity_type: EntityType) {
        match result {
            Err(CampusError::Store(StoreError::NotFound {
                entity_type: actual, ..
            })) => assert_eq!(*actual, entity_type),
            other => panic!("expected NotFound({:?}), got {:?}", entity_type, other),
        }
    }

    pub fn assert_validation_error<T: std::fmt::Debug>(result: &CampusResult<T>) {
        assert!(
            matches!(result, Err(CampusError::Validation(_))),
            "expected validation error, got {:?}",
            result
        );
    }
}
