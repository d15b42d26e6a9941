//! Domain Event Bus
//!
//! Mutations publish a [`CampusEvent`] after the store accepts the change.
//! GraphQL subscriptions subscribe to the bus and filter for the events
//! their caller is allowed to see.

use campus_core::{Appointment, Broadcast, CampusResult, Faculty, Notification};
use tokio::sync::broadcast;
use tracing::debug;

use crate::store::CampusStore;

/// Events produced by successful mutations and by the notification job.
#[derive(Debug, Clone, PartialEq)]
pub enum CampusEvent {
    /// A new broadcast announcement was posted.
    BroadcastCreated { broadcast: Broadcast },

    /// A faculty member changed status, overrides or weekly schedule.
    AvailabilityUpdated { faculty: Faculty },

    /// An appointment was booked or changed status.
    AppointmentUpdated { appointment: Appointment },

    /// A notification was delivered to a user.
    NotificationCreated { notification: Notification },
}

impl CampusEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            CampusEvent::BroadcastCreated { .. } => "BroadcastCreated",
            CampusEvent::AvailabilityUpdated { .. } => "AvailabilityUpdated",
            CampusEvent::AppointmentUpdated { .. } => "AppointmentUpdated",
            CampusEvent::NotificationCreated { .. } => "NotificationCreated",
        }
    }
}

/// Fan-out channel shared by mutations, the job and subscriptions.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CampusEvent>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Dropped silently when nobody is subscribed.
    pub fn publish(&self, event: CampusEvent) {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!(event_type, receivers, "Published event");
            }
            Err(_) => {
                debug!(event_type, "No subscribers for event");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CampusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Store a notification and push it to live subscribers.
pub fn deliver_notification(
    store: &CampusStore,
    events: &EventBus,
    notification: Notification,
) -> CampusResult<Notification> {
    let stored = store.push_notification(notification)?;
    events.publish(CampusEvent::NotificationCreated {
        notification: stored.clone(),
    });
    Ok(stored)
}
