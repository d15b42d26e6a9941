use std::sync::Arc;

use async_graphql::{Context, Result as GqlResult, Subscription, ID};
use futures_util::future::ready;
use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use campus_core::{Appointment, BroadcastAudience, UserRole};

use super::types::{parse_id, GqlAppointment, GqlBroadcast, GqlFaculty, GqlNotification};
use super::{auth_context, events, store};
use crate::auth::Principal;
use crate::error::IntoGqlResult;
use crate::events::CampusEvent;
use crate::store::CampusStore;

pub struct SubscriptionRoot;

/// Live events from the bus. Lagged subscribers skip ahead with a warning.
fn event_stream(ctx: &Context<'_>) -> GqlResult<impl Stream<Item = CampusEvent> + Send + 'static> {
    let rx = events(ctx)?.subscribe();
    Ok(BroadcastStream::new(rx).filter_map(|item| {
        ready(match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Subscriber lagged behind the event bus");
                None
            }
        })
    }))
}

fn involves(store: &CampusStore, principal: &Principal, appointment: &Appointment) -> bool {
    if principal.role == UserRole::Admin || appointment.student_id == principal.user_id {
        return true;
    }
    store
        .faculty(appointment.faculty_id)
        .map(|f| f.user_id == principal.user_id)
        .unwrap_or(false)
}

#[Subscription]
impl SubscriptionRoot {
    /// New broadcasts addressed to the caller.
    async fn broadcast_created(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<impl Stream<Item = GqlBroadcast>> {
        let role = auth_context(ctx).role();
        Ok(event_stream(ctx)?.filter_map(move |event| {
            ready(match event {
                CampusEvent::BroadcastCreated { broadcast } => {
                    let visible = match role {
                        Some(role) => broadcast.audience.includes(role),
                        None => broadcast.audience == BroadcastAudience::All,
                    };
                    visible.then(|| GqlBroadcast::from(broadcast))
                }
                _ => None,
            })
        }))
    }

    /// Availability changes, optionally for a single faculty member.
    async fn availability_updated(
        &self,
        ctx: &Context<'_>,
        faculty_id: Option<ID>,
    ) -> async_graphql::Result<impl Stream<Item = GqlFaculty>> {
        let faculty_id = faculty_id
            .map(|id| parse_id("facultyId", &id))
            .transpose()
            .into_gql()?;
        Ok(event_stream(ctx)?.filter_map(move |event| {
            ready(match event {
                CampusEvent::AvailabilityUpdated { faculty }
                    if faculty_id.map_or(true, |id| id == faculty.id) =>
                {
                    Some(GqlFaculty::from(faculty))
                }
                _ => None,
            })
        }))
    }

    /// Appointments the caller booked or hosts.
    async fn appointment_updated(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<impl Stream<Item = GqlAppointment>> {
        let principal = auth_context(ctx).require().into_gql()?.clone();
        let store = Arc::clone(store(ctx)?);
        Ok(event_stream(ctx)?.filter_map(move |event| {
            ready(match event {
                CampusEvent::AppointmentUpdated { appointment }
                    if involves(&store, &principal, &appointment) =>
                {
                    Some(GqlAppointment::from(appointment))
                }
                _ => None,
            })
        }))
    }

    /// Notifications delivered to the caller.
    async fn notification_received(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<impl Stream<Item = GqlNotification>> {
        let user_id = auth_context(ctx).require().into_gql()?.user_id;
        Ok(event_stream(ctx)?.filter_map(move |event| {
            ready(match event {
                CampusEvent::NotificationCreated { notification }
                    if notification.user_id == user_id =>
                {
                    Some(GqlNotification::from(notification))
                }
                _ => None,
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::auth::{AuthConfig, AuthContext, Principal};
    use crate::events::{CampusEvent, EventBus};
    use crate::graphql::build_schema;
    use crate::store::CampusStore;
    use async_graphql::Request;
    use campus_core::{Broadcast, BroadcastAudience, Faculty, Notification, User, UserRole};
    use futures_util::StreamExt;
    use std::sync::Arc;
    use uuid::Uuid;

    fn broadcast(audience: BroadcastAudience, title: &str) -> Broadcast {
        Broadcast {
            id: Uuid::now_v7(),
            title: title.to_string(),
            message: "m".to_string(),
            audience,
            author_id: Uuid::now_v7(),
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_anonymous_broadcast_subscription_sees_public_only() {
        let bus = EventBus::new(16);
        let schema = build_schema(
            Arc::new(CampusStore::new()),
            bus.clone(),
            Arc::new(AuthConfig::default()),
        );
        let mut stream = schema.execute_stream("subscription { broadcastCreated { title } }");

        // The subscription registers with the bus on first poll.
        let first = tokio::spawn(async move { stream.next().await });
        while bus.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }
        bus.publish(CampusEvent::BroadcastCreated {
            broadcast: broadcast(BroadcastAudience::Students, "students only"),
        });
        bus.publish(CampusEvent::BroadcastCreated {
            broadcast: broadcast(BroadcastAudience::All, "everyone"),
        });

        let response = first.await.expect("join").expect("one response");
        let data = response.data.into_json().expect("json");
        assert_eq!(data["broadcastCreated"]["title"], "everyone");
    }

    #[tokio::test]
    async fn test_notification_subscription_requires_auth() {
        let schema = build_schema(
            Arc::new(CampusStore::new()),
            EventBus::new(16),
            Arc::new(AuthConfig::default()),
        );
        let mut stream =
            schema.execute_stream("subscription { notificationReceived { title } }");
        let response = stream.next().await.expect("error response");
        assert_eq!(response.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_notification_subscription_filters_by_user() {
        let bus = EventBus::new(16);
        let schema = build_schema(
            Arc::new(CampusStore::new()),
            bus.clone(),
            Arc::new(AuthConfig::default()),
        );
        let me = Uuid::now_v7();
        let auth = AuthContext::authenticated(Principal {
            user_id: me,
            email: "me@campus.edu".to_string(),
            role: UserRole::Student,
        });
        let mut stream = schema.execute_stream(
            Request::new("subscription { notificationReceived { title } }").data(auth),
        );

        let first = tokio::spawn(async move { stream.next().await });
        while bus.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }
        bus.publish(CampusEvent::NotificationCreated {
            notification: Notification::new(Uuid::now_v7(), "someone else", "x"),
        });
        bus.publish(CampusEvent::NotificationCreated {
            notification: Notification::new(me, "mine", "x"),
        });

        let response = first.await.expect("join").expect("one response");
        let data = response.data.into_json().expect("json");
        assert_eq!(data["notificationReceived"]["title"], "mine");
    }

    #[tokio::test]
    async fn test_availability_subscription_filters_by_faculty() {
        let bus = EventBus::new(16);
        let schema = build_schema(
            Arc::new(CampusStore::new()),
            bus.clone(),
            Arc::new(AuthConfig::default()),
        );
        let watched = Faculty::for_user(&User::new("Prof. Rao", "rao@campus.edu", UserRole::Faculty));
        let other = Faculty::for_user(&User::new("Prof. Iyer", "iyer@campus.edu", UserRole::Faculty));
        let query = format!(
            r#"subscription {{ availabilityUpdated(facultyId: "{}") {{ name }} }}"#,
            watched.id
        );
        let mut stream = schema.execute_stream(query);

        let first = tokio::spawn(async move { stream.next().await });
        while bus.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }
        bus.publish(CampusEvent::AvailabilityUpdated { faculty: other });
        bus.publish(CampusEvent::AvailabilityUpdated { faculty: watched });

        let response = first.await.expect("join").expect("one response");
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.into_json().expect("json");
        assert_eq!(data["availabilityUpdated"]["name"], "Prof. Rao");
    }
}
