//! Enumerations shared by the server and the client.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of an account on campus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[default]
    Student,
    Faculty,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Faculty => "faculty",
            UserRole::Admin => "admin",
        }
    }

    /// Faculty and admins may publish broadcasts.
    pub fn can_broadcast(&self) -> bool {
        matches!(self, UserRole::Faculty | UserRole::Admin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(UserRole::Student),
            "faculty" => Ok(UserRole::Faculty),
            "admin" => Ok(UserRole::Admin),
            _ => Err(ParseEnumError {
                kind: "UserRole",
                value: s.to_string(),
            }),
        }
    }
}

/// Live availability status shown on a faculty card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityStatus {
    #[default]
    Available,
    Busy,
    InMeeting,
    OnLeave,
    Away,
}

impl AvailabilityStatus {
    /// Whether students can book a slot while the faculty is in this state.
    pub fn accepts_bookings(&self) -> bool {
        matches!(self, AvailabilityStatus::Available | AvailabilityStatus::Busy)
    }
}

impl FromStr for AvailabilityStatus {
    type Err = ParseEnumError;

    /// Accepts `busy`, `BUSY`, `in-meeting`, `IN_MEETING` and similar.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "AVAILABLE" => Ok(AvailabilityStatus::Available),
            "BUSY" => Ok(AvailabilityStatus::Busy),
            "IN_MEETING" => Ok(AvailabilityStatus::InMeeting),
            "ON_LEAVE" => Ok(AvailabilityStatus::OnLeave),
            "AWAY" => Ok(AvailabilityStatus::Away),
            _ => Err(ParseEnumError {
                kind: "AvailabilityStatus",
                value: s.to_string(),
            }),
        }
    }
}

/// Lifecycle of an appointment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Allowed status transitions.
    ///
    /// Pending can be approved, rejected or cancelled; an approved appointment
    /// can still be cancelled or completed. Everything else is terminal.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Approved, Cancelled)
                | (Approved, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Rejected | AppointmentStatus::Cancelled | AppointmentStatus::Completed
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Who a broadcast is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BroadcastAudience {
    #[default]
    All,
    Students,
    Faculty,
}

impl BroadcastAudience {
    pub fn includes(&self, role: UserRole) -> bool {
        match self {
            BroadcastAudience::All => true,
            BroadcastAudience::Students => role == UserRole::Student,
            BroadcastAudience::Faculty => matches!(role, UserRole::Faculty | UserRole::Admin),
        }
    }
}

/// Day of the week for recurring schedule slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl From<chrono::Weekday> for DayOfWeek {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => DayOfWeek::Monday,
            chrono::Weekday::Tue => DayOfWeek::Tuesday,
            chrono::Weekday::Wed => DayOfWeek::Wednesday,
            chrono::Weekday::Thu => DayOfWeek::Thursday,
            chrono::Weekday::Fri => DayOfWeek::Friday,
            chrono::Weekday::Sat => DayOfWeek::Saturday,
            chrono::Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

/// Error when parsing an unknown enum string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appointment_transitions() {
        use AppointmentStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Approved.can_transition_to(Completed));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(AppointmentStatus::Rejected.is_terminal());
        assert!(!AppointmentStatus::Approved.is_terminal());
    }

    #[test]
    fn test_availability_status_parse() {
        assert_eq!("busy".parse(), Ok(AvailabilityStatus::Busy));
        assert_eq!("on-leave".parse(), Ok(AvailabilityStatus::OnLeave));
        assert_eq!("IN_MEETING".parse(), Ok(AvailabilityStatus::InMeeting));
        assert!("asleep".parse::<AvailabilityStatus>().is_err());
    }

    #[test]
    fn test_user_role_parse() {
        assert_eq!("Faculty".parse::<UserRole>(), Ok(UserRole::Faculty));
        assert!("janitor".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_audience_includes() {
        assert!(BroadcastAudience::All.includes(UserRole::Student));
        assert!(BroadcastAudience::Students.includes(UserRole::Student));
        assert!(!BroadcastAudience::Students.includes(UserRole::Faculty));
        assert!(BroadcastAudience::Faculty.includes(UserRole::Admin));
    }

    #[test]
    fn test_weekday_conversion() {
        assert_eq!(DayOfWeek::from(chrono::Weekday::Wed), DayOfWeek::Wednesday);
    }
}
