//! Appointment Reminder Job
//!
//! Every two minutes, finds approved appointments starting within the
//! reminder lead window that have not been reminded yet, and notifies both
//! the student and the hosting faculty member.
//!
//! An appointment is flagged `reminder_sent` only after both notifications
//! are delivered. If either send fails the appointment stays due and the
//! next run retries it, so delivery is at-least-once.
//!
//! # Configuration
//!
//! - `CAMPUS_NOTIFICATION_CHECK_ENABLED`: "false" disables the job (default: true)
//! - `CAMPUS_REMINDER_LEAD_MINUTES`: reminder lead time (default: 30)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use campus_core::{Appointment, CampusResult, Notification};

use super::scheduler::{MinuteSchedule, ScheduledTask};
use crate::constants::{DEFAULT_REMINDER_LEAD_MINUTES, NOTIFICATION_CHECK_EVERY_MINUTES};
use crate::events::{deliver_notification, EventBus};
use crate::store::CampusStore;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub enabled: bool,

    /// How long before the start time a reminder goes out.
    pub lead: Duration,

    pub every_minutes: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lead: Duration::minutes(DEFAULT_REMINDER_LEAD_MINUTES),
            every_minutes: NOTIFICATION_CHECK_EVERY_MINUTES,
        }
    }
}

impl NotificationConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let enabled = std::env::var("CAMPUS_NOTIFICATION_CHECK_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.enabled);
        let lead = std::env::var("CAMPUS_REMINDER_LEAD_MINUTES")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|m| *m > 0)
            .map(Duration::minutes)
            .unwrap_or(defaults.lead);
        Self {
            enabled,
            lead,
            every_minutes: defaults.every_minutes,
        }
    }
}

// ============================================================================
// SINK
// ============================================================================

/// Destination for reminder notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: Notification) -> CampusResult<()>;
}

/// Stores the notification and pushes it to live subscribers.
#[derive(Debug, Clone)]
pub struct StoreSink {
    store: Arc<CampusStore>,
    events: EventBus,
}

impl StoreSink {
    pub fn new(store: Arc<CampusStore>, events: EventBus) -> Self {
        Self { store, events }
    }
}

#[async_trait]
impl NotificationSink for StoreSink {
    async fn send(&self, notification: Notification) -> CampusResult<()> {
        deliver_notification(&self.store, &self.events, notification).map(|_| ())
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct NotificationMetrics {
    /// Completed check runs
    pub runs: AtomicU64,

    /// Appointments fully reminded
    pub reminders_sent: AtomicU64,

    /// Individual notifications delivered
    pub notifications_sent: AtomicU64,

    /// Appointments left for retry after a failed send or lookup
    pub failures: AtomicU64,
}

impl NotificationMetrics {
    pub fn snapshot(&self) -> NotificationSnapshot {
        NotificationSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            reminders_sent: self.reminders_sent.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationSnapshot {
    pub runs: u64,
    pub reminders_sent: u64,
    pub notifications_sent: u64,
    pub failures: u64,
}

// ============================================================================
// TASK
// ============================================================================

pub struct NotificationCheck {
    store: Arc<CampusStore>,
    sink: Arc<dyn NotificationSink>,
    config: NotificationConfig,
    metrics: Arc<NotificationMetrics>,
}

impl NotificationCheck {
    pub fn new(
        store: Arc<CampusStore>,
        sink: Arc<dyn NotificationSink>,
        config: NotificationConfig,
    ) -> Self {
        Self {
            store,
            sink,
            config,
            metrics: Arc::new(NotificationMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<NotificationMetrics> {
        Arc::clone(&self.metrics)
    }

    /// One pass over due appointments. Returns how many were fully reminded.
    pub async fn check_and_notify(&self, now: DateTime<Utc>) -> u64 {
        self.metrics.runs.fetch_add(1, Ordering::Relaxed);
        let due = self.store.due_reminders(now, self.config.lead);
        let mut reminded = 0u64;

        for appointment in due {
            if self.remind(&appointment).await {
                reminded += 1;
            } else {
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        if reminded > 0 {
            tracing::info!(reminded, at = %now, "Appointment reminders sent");
        } else {
            tracing::trace!(at = %now, "No appointment reminders due");
        }
        reminded
    }

    async fn remind(&self, appointment: &Appointment) -> bool {
        let faculty = match self.store.faculty(appointment.faculty_id) {
            Ok(faculty) => faculty,
            Err(e) => {
                tracing::error!(
                    appointment_id = %appointment.id,
                    error = %e,
                    "Cannot resolve faculty for reminder"
                );
                return false;
            }
        };

        let when = format!(
            "{} at {}",
            appointment.date,
            appointment.start_time.format("%H:%M")
        );
        let to_student = Notification::new(
            appointment.student_id,
            "Upcoming appointment",
            format!("Your appointment with {} starts {}", faculty.name, when),
        );
        let to_faculty = Notification::new(
            faculty.user_id,
            "Upcoming appointment",
            format!("Appointment \"{}\" starts {}", appointment.purpose, when),
        );

        let mut delivered = true;
        for notification in [to_student, to_faculty] {
            let user_id = notification.user_id;
            match self.sink.send(notification).await {
                Ok(()) => {
                    self.metrics
                        .notifications_sent
                        .fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::warn!(
                        appointment_id = %appointment.id,
                        user_id = %user_id,
                        error = %e,
                        "Reminder delivery failed, will retry next run"
                    );
                    delivered = false;
                }
            }
        }
        if !delivered {
            return false;
        }

        match self.store.mark_reminded(appointment.id) {
            Ok(true) => {
                self.metrics.reminders_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Ok(false) => {
                // A concurrent run got there first.
                tracing::debug!(appointment_id = %appointment.id, "Already reminded");
                true
            }
            Err(e) => {
                tracing::error!(appointment_id = %appointment.id, error = %e, "Failed to mark reminded");
                false
            }
        }
    }
}

#[async_trait]
impl ScheduledTask for NotificationCheck {
    fn name(&self) -> &'static str {
        "notification_check"
    }

    fn schedule(&self) -> MinuteSchedule {
        MinuteSchedule::every(self.config.every_minutes)
    }

    async fn run(&self, at: DateTime<Utc>) {
        self.check_and_notify(at).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::PasswordHash;
    use crate::store::{NewAppointment, NewUser};
    use campus_core::{AppointmentStatus, StoreError, User, UserRole};
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn register(store: &CampusStore, email: &str, role: UserRole) -> User {
        store
            .create_user(
                NewUser {
                    name: email.to_string(),
                    email: email.to_string(),
                    role,
                    enrollment_no: None,
                    department: None,
                },
                PasswordHash::create("password123").expect("hash"),
                now(),
            )
            .expect("registered")
    }

    /// Store with one approved appointment at 09:20, returning the user ids.
    fn seeded() -> (Arc<CampusStore>, User, User) {
        let store = Arc::new(CampusStore::new());
        let student = register(&store, "s@campus.edu", UserRole::Student);
        let prof = register(&store, "p@campus.edu", UserRole::Faculty);
        let faculty = store.faculty_for_user(prof.id).expect("faculty");
        let appointment = store
            .book_appointment(
                NewAppointment {
                    student_id: student.id,
                    faculty_id: faculty.id,
                    date: NaiveDate::from_ymd_opt(2025, 3, 3).expect("date"),
                    start_time: NaiveTime::from_hms_opt(9, 20, 0).expect("time"),
                    purpose: "Viva prep".to_string(),
                },
                now(),
            )
            .expect("booked");
        store
            .update_appointment_status(appointment.id, AppointmentStatus::Approved)
            .expect("approved");
        (store, student, prof)
    }

    /// Records sends and can be told to fail.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Notification>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(&self, notification: Notification) -> CampusResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable {
                    reason: "sink offline".to_string(),
                }
                .into());
            }
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(notification);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reminds_both_parties_once() {
        let (store, student, prof) = seeded();
        let sink = Arc::new(RecordingSink::default());
        let job = NotificationCheck::new(store, sink.clone(), NotificationConfig::default());

        assert_eq!(job.check_and_notify(now()).await, 1);
        assert_eq!(job.check_and_notify(now() + Duration::minutes(2)).await, 0);

        let sent = sink.sent.lock().expect("lock");
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().any(|n| n.user_id == student.id));
        assert!(sent.iter().any(|n| n.user_id == prof.id));

        let snapshot = job.metrics().snapshot();
        assert_eq!(snapshot.runs, 2);
        assert_eq!(snapshot.reminders_sent, 1);
        assert_eq!(snapshot.notifications_sent, 2);
        assert_eq!(snapshot.failures, 0);
    }

    #[tokio::test]
    async fn test_failed_send_is_retried_next_run() {
        let (store, _, _) = seeded();
        let sink = Arc::new(RecordingSink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let job = NotificationCheck::new(store, sink.clone(), NotificationConfig::default());

        assert_eq!(job.check_and_notify(now()).await, 0);
        assert_eq!(job.metrics().snapshot().failures, 1);

        sink.fail.store(false, Ordering::SeqCst);
        assert_eq!(job.check_and_notify(now() + Duration::minutes(2)).await, 1);
    }

    #[tokio::test]
    async fn test_outside_lead_window_is_not_reminded() {
        let (store, _, _) = seeded();
        let sink = Arc::new(RecordingSink::default());
        let config = NotificationConfig {
            lead: Duration::minutes(10),
            ..Default::default()
        };
        let job = NotificationCheck::new(store, sink, config);
        assert_eq!(job.check_and_notify(now()).await, 0);
        assert_eq!(job.check_and_notify(now() + Duration::minutes(10)).await, 1);
    }

    #[tokio::test]
    async fn test_store_sink_publishes() {
        let (store, student, _) = seeded();
        let events = EventBus::new(8);
        let mut rx = events.subscribe();
        let sink = StoreSink::new(store.clone(), events);

        sink.send(Notification::new(student.id, "t", "b"))
            .await
            .expect("delivered");
        assert_eq!(store.notifications_for(student.id).len(), 1);
        assert!(rx.try_recv().is_ok());
    }
}
