//! Operation documents for the SmartCampus schema.

use campus_core::{AvailabilityStatus, BroadcastAudience, UserRole};
use serde_json::json;

use crate::error::ClientResult;
use crate::operation::Operation;

pub const ME: &str = r#"
query Me {
  me { id name email role image enrollmentNo department }
}
"#;

pub const FACULTIES: &str = r#"
query Faculties {
  faculties {
    id
    name
    email
    department
    designation
    image
    availability { status note updatedAt dateOverrides { date available note } }
  }
}
"#;

pub const FACULTY: &str = r#"
query Faculty($id: ID!) {
  faculty(id: $id) {
    id
    name
    availability { status note updatedAt }
    weeklySchedule { id slots { day startTime endTime } }
  }
}
"#;

pub const BROADCASTS: &str = r#"
query Broadcasts {
  broadcasts { id title message audience authorId createdAt }
}
"#;

pub const MY_APPOINTMENTS: &str = r#"
query MyAppointments {
  myAppointments { id studentId facultyId date startTime purpose status createdAt }
}
"#;

pub const REGISTER: &str = r#"
mutation Register($input: RegisterInput!) {
  register(input: $input) { token user { id name email role } }
}
"#;

pub const LOGIN: &str = r#"
mutation Login($email: String!, $password: String!) {
  login(email: $email, password: $password) { token user { id name email role } }
}
"#;

pub const UPDATE_AVAILABILITY: &str = r#"
mutation UpdateAvailability($status: AvailabilityStatus!, $note: String) {
  updateAvailability(status: $status, note: $note) {
    id
    availability { status note updatedAt }
  }
}
"#;

pub const CREATE_BROADCAST: &str = r#"
mutation CreateBroadcast($title: String!, $message: String!, $audience: BroadcastAudience) {
  createBroadcast(title: $title, message: $message, audience: $audience) {
    id title message audience authorId createdAt
  }
}
"#;

pub const BROADCAST_CREATED: &str = r#"
subscription BroadcastCreated {
  broadcastCreated { id title message audience authorId createdAt }
}
"#;

pub const AVAILABILITY_UPDATED: &str = r#"
subscription AvailabilityUpdated($facultyId: ID) {
  availabilityUpdated(facultyId: $facultyId) {
    id
    availability { status note updatedAt }
  }
}
"#;

pub const NOTIFICATION_RECEIVED: &str = r#"
subscription NotificationReceived {
  notificationReceived { id title body createdAt read }
}
"#;

pub fn me() -> ClientResult<Operation> {
    Operation::new(ME)
}

pub fn faculties() -> ClientResult<Operation> {
    Operation::new(FACULTIES)
}

pub fn faculty(id: &str) -> ClientResult<Operation> {
    Ok(Operation::new(FACULTY)?.variable("id", id))
}

pub fn broadcasts() -> ClientResult<Operation> {
    Operation::new(BROADCASTS)
}

pub fn my_appointments() -> ClientResult<Operation> {
    Operation::new(MY_APPOINTMENTS)
}

pub fn register(name: &str, email: &str, password: &str, role: UserRole) -> ClientResult<Operation> {
    Ok(Operation::new(REGISTER)?.variable(
        "input",
        json!({ "name": name, "email": email, "password": password, "role": role }),
    ))
}

pub fn login(email: &str, password: &str) -> ClientResult<Operation> {
    Ok(Operation::new(LOGIN)?
        .variable("email", email)
        .variable("password", password))
}

pub fn update_availability(
    status: AvailabilityStatus,
    note: Option<&str>,
) -> ClientResult<Operation> {
    Ok(Operation::new(UPDATE_AVAILABILITY)?.with_variables(json!({
        "status": status,
        "note": note,
    })))
}

pub fn create_broadcast(
    title: &str,
    message: &str,
    audience: BroadcastAudience,
) -> ClientResult<Operation> {
    Ok(Operation::new(CREATE_BROADCAST)?.with_variables(json!({
        "title": title,
        "message": message,
        "audience": audience,
    })))
}

pub fn broadcast_created() -> ClientResult<Operation> {
    Operation::new(BROADCAST_CREATED)
}

pub fn availability_updated(faculty_id: Option<&str>) -> ClientResult<Operation> {
    Ok(Operation::new(AVAILABILITY_UPDATED)?.variable("facultyId", faculty_id))
}

pub fn notification_received() -> ClientResult<Operation> {
    Operation::new(NOTIFICATION_RECEIVED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationKind;

    #[test]
    fn test_documents_parse_with_expected_kinds() {
        let cases = [
            (me(), OperationKind::Query),
            (faculties(), OperationKind::Query),
            (faculty("f1"), OperationKind::Query),
            (broadcasts(), OperationKind::Query),
            (my_appointments(), OperationKind::Query),
            (login("a@b.c", "pw"), OperationKind::Mutation),
            (
                register("A", "a@b.c", "pw", UserRole::Student),
                OperationKind::Mutation,
            ),
            (
                update_availability(AvailabilityStatus::Busy, Some("Lab")),
                OperationKind::Mutation,
            ),
            (
                create_broadcast("T", "M", BroadcastAudience::All),
                OperationKind::Mutation,
            ),
            (broadcast_created(), OperationKind::Subscription),
            (availability_updated(None), OperationKind::Subscription),
            (notification_received(), OperationKind::Subscription),
        ];
        for (operation, kind) in cases {
            assert_eq!(operation.expect("document parses").kind(), kind);
        }
    }

    #[test]
    fn test_enum_variables_use_schema_names() {
        let op = update_availability(AvailabilityStatus::OnLeave, None).expect("parse");
        assert_eq!(op.variables()["status"], "ON_LEAVE");
        assert!(op.variables()["note"].is_null());

        let op = register("A", "a@b.c", "pw", UserRole::Faculty).expect("parse");
        assert_eq!(op.variables()["input"]["role"], "FACULTY");
    }
}
