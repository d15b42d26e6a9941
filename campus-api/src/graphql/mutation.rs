use std::sync::Arc;

use async_graphql::{Context, Object, Result as GqlResult, ID};
use chrono::Utc;

use campus_core::{
    AppointmentStatus, DateOverride, EntityId, Notification, UserRole,
};

use super::types::{
    parse_date, parse_id, parse_time, BookAppointmentInput, GqlAppointment,
    GqlAppointmentStatus, GqlAuthPayload, GqlAvailabilityStatus, GqlBroadcast,
    GqlBroadcastAudience, GqlFaculty, GqlNotification, RegisterInput, ScheduleSlotInput,
};
use super::{auth_context, events, store};
use crate::auth::{generate_jwt_token, AuthConfig, Principal};
use crate::error::{ApiError, IntoGqlResult};
use crate::events::{deliver_notification, CampusEvent, EventBus};
use crate::password::PasswordHash;
use crate::store::{CampusStore, NewAppointment, NewUser};

pub struct MutationRoot;

/// Notify a user, logging instead of failing the mutation on error.
fn notify(store: &CampusStore, bus: &EventBus, user_id: EntityId, title: &str, body: String) {
    if let Err(e) = deliver_notification(store, bus, Notification::new(user_id, title, body)) {
        tracing::warn!(user_id = %user_id, error = %e, "Failed to deliver notification");
    }
}

fn issue(ctx: &Context<'_>, user: campus_core::User) -> GqlResult<GqlAuthPayload> {
    let config = ctx.data::<Arc<AuthConfig>>()?;
    let token = generate_jwt_token(config, &user).into_gql()?;
    Ok(GqlAuthPayload {
        token,
        user: user.into(),
    })
}

fn faculty_principal<'a>(ctx: &'a Context<'_>) -> GqlResult<&'a Principal> {
    auth_context(ctx)
        .require_role(&[UserRole::Faculty])
        .into_gql()
}

#[Object]
impl MutationRoot {
    /// Create an account and sign it in.
    async fn register(&self, ctx: &Context<'_>, input: RegisterInput) -> GqlResult<GqlAuthPayload> {
        let role: UserRole = input.role.map(Into::into).unwrap_or_default();
        if role == UserRole::Admin {
            return Err(ApiError::forbidden("Admin accounts cannot self-register").into_graphql());
        }
        let password = PasswordHash::create(&input.password).into_gql()?;
        let user = store(ctx)?
            .create_user(
                NewUser {
                    name: input.name,
                    email: input.email,
                    role,
                    enrollment_no: input.enrollment_no,
                    department: input.department,
                },
                password,
                Utc::now(),
            )
            .into_gql()?;
        issue(ctx, user)
    }

    async fn login(
        &self,
        ctx: &Context<'_>,
        email: String,
        password: String,
    ) -> GqlResult<GqlAuthPayload> {
        let Some((user, hash)) = store(ctx)?.credentials(&email) else {
            return Err(ApiError::invalid_credentials().into_graphql());
        };
        if !hash.verify(&password) {
            tracing::debug!(user_id = %user.id, "Password mismatch");
            return Err(ApiError::invalid_credentials().into_graphql());
        }
        issue(ctx, user)
    }

    /// Set the caller's current availability status.
    async fn update_availability(
        &self,
        ctx: &Context<'_>,
        status: GqlAvailabilityStatus,
        note: Option<String>,
    ) -> GqlResult<GqlFaculty> {
        let principal = faculty_principal(ctx)?;
        let store = store(ctx)?;
        let faculty = store.faculty_for_user(principal.user_id).into_gql()?;
        let faculty = store
            .update_availability(faculty.id, status.into(), note, Utc::now())
            .into_gql()?;
        events(ctx)?.publish(CampusEvent::AvailabilityUpdated {
            faculty: faculty.clone(),
        });
        Ok(faculty.into())
    }

    /// Mark a single date available or unavailable, replacing any earlier
    /// override for that date.
    async fn add_date_override(
        &self,
        ctx: &Context<'_>,
        date: String,
        available: bool,
        note: Option<String>,
    ) -> GqlResult<GqlFaculty> {
        let principal = faculty_principal(ctx)?;
        let date = parse_date("date", &date).into_gql()?;
        let store = store(ctx)?;
        let faculty = store.faculty_for_user(principal.user_id).into_gql()?;
        let faculty = store
            .add_date_override(
                faculty.id,
                DateOverride {
                    date,
                    available,
                    note,
                },
                Utc::now(),
            )
            .into_gql()?;
        events(ctx)?.publish(CampusEvent::AvailabilityUpdated {
            faculty: faculty.clone(),
        });
        Ok(faculty.into())
    }

    async fn set_weekly_schedule(
        &self,
        ctx: &Context<'_>,
        slots: Vec<ScheduleSlotInput>,
    ) -> GqlResult<GqlFaculty> {
        let principal = faculty_principal(ctx)?;
        let slots = slots
            .into_iter()
            .map(ScheduleSlotInput::into_slot)
            .collect::<Result<Vec<_>, _>>()
            .into_gql()?;
        let store = store(ctx)?;
        let faculty = store.faculty_for_user(principal.user_id).into_gql()?;
        let faculty = store.set_weekly_schedule(faculty.id, slots).into_gql()?;
        events(ctx)?.publish(CampusEvent::AvailabilityUpdated {
            faculty: faculty.clone(),
        });
        Ok(faculty.into())
    }

    /// Request an appointment with a faculty member.
    async fn book_appointment(
        &self,
        ctx: &Context<'_>,
        input: BookAppointmentInput,
    ) -> GqlResult<GqlAppointment> {
        let principal = auth_context(ctx)
            .require_role(&[UserRole::Student])
            .into_gql()?;
        let request = NewAppointment {
            student_id: principal.user_id,
            faculty_id: parse_id("facultyId", &input.faculty_id).into_gql()?,
            date: parse_date("date", &input.date).into_gql()?,
            start_time: parse_time("startTime", &input.start_time).into_gql()?,
            purpose: input.purpose,
        };
        let store = store(ctx)?;
        let bus = events(ctx)?;
        let appointment = store.book_appointment(request, Utc::now()).into_gql()?;
        let faculty = store.faculty(appointment.faculty_id).into_gql()?;

        bus.publish(CampusEvent::AppointmentUpdated {
            appointment: appointment.clone(),
        });
        notify(
            store,
            bus,
            faculty.user_id,
            "New appointment request",
            format!(
                "{} requested {} at {}: {}",
                principal.email,
                appointment.date,
                appointment.start_time.format("%H:%M"),
                appointment.purpose
            ),
        );
        Ok(appointment.into())
    }

    /// Move an appointment through its lifecycle.
    ///
    /// The hosting faculty approves, rejects or completes; the student may
    /// cancel. Admins may do either.
    async fn update_appointment_status(
        &self,
        ctx: &Context<'_>,
        id: ID,
        status: GqlAppointmentStatus,
    ) -> GqlResult<GqlAppointment> {
        let principal = auth_context(ctx).require().into_gql()?;
        let id = parse_id("id", &id).into_gql()?;
        let status: AppointmentStatus = status.into();
        let store = store(ctx)?;
        let bus = events(ctx)?;

        let current = store.appointment(id).into_gql()?;
        let faculty = store.faculty(current.faculty_id).into_gql()?;
        let is_host = faculty.user_id == principal.user_id;
        let is_student = current.student_id == principal.user_id;
        let allowed = match principal.role {
            UserRole::Admin => true,
            _ if status == AppointmentStatus::Cancelled => is_host || is_student,
            _ => is_host,
        };
        if !allowed {
            return Err(
                ApiError::forbidden("Not permitted to change this appointment").into_graphql(),
            );
        }

        let appointment = store.update_appointment_status(id, status).into_gql()?;
        bus.publish(CampusEvent::AppointmentUpdated {
            appointment: appointment.clone(),
        });

        let counterpart = if is_student {
            faculty.user_id
        } else {
            appointment.student_id
        };
        notify(
            store,
            bus,
            counterpart,
            "Appointment updated",
            format!(
                "Appointment on {} at {} is now {}",
                appointment.date,
                appointment.start_time.format("%H:%M"),
                appointment.status
            ),
        );
        Ok(appointment.into())
    }

    /// Post an announcement. Faculty and admins only.
    async fn create_broadcast(
        &self,
        ctx: &Context<'_>,
        title: String,
        message: String,
        audience: Option<GqlBroadcastAudience>,
    ) -> GqlResult<GqlBroadcast> {
        let principal = auth_context(ctx)
            .require_role(&[UserRole::Faculty, UserRole::Admin])
            .into_gql()?;
        let audience = audience.map(Into::into).unwrap_or_default();
        let broadcast = store(ctx)?
            .create_broadcast(principal.user_id, title, message, audience, Utc::now())
            .into_gql()?;
        events(ctx)?.publish(CampusEvent::BroadcastCreated {
            broadcast: broadcast.clone(),
        });
        Ok(broadcast.into())
    }

    async fn mark_notification_read(&self, ctx: &Context<'_>, id: ID) -> GqlResult<GqlNotification> {
        let principal = auth_context(ctx).require().into_gql()?;
        let id = parse_id("id", &id).into_gql()?;
        let notification = store(ctx)?
            .mark_notification_read(principal.user_id, id)
            .into_gql()?;
        Ok(notification.into())
    }
}
