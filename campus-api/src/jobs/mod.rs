//! Background Jobs for the SmartCampus API
//!
//! - `scheduler`: wall-clock schedules and the task runner
//! - `notification_check`: appointment reminders every two minutes
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let handle = spawn_notification_job(store, events, NotificationConfig::from_env(), shutdown_rx);
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod notification_check;
pub mod scheduler;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::events::EventBus;
use crate::store::CampusStore;

pub use notification_check::{
    NotificationCheck, NotificationConfig, NotificationMetrics, NotificationSink,
    NotificationSnapshot, StoreSink,
};
pub use scheduler::{run_scheduled, Clock, ManualClock, MinuteSchedule, ScheduledTask, SystemClock};

/// Spawn the reminder job on the system clock. `None` when disabled.
pub fn spawn_notification_job(
    store: Arc<CampusStore>,
    events: EventBus,
    config: NotificationConfig,
    shutdown_rx: watch::Receiver<bool>,
) -> Option<JoinHandle<u64>> {
    if !config.enabled {
        tracing::info!("Notification check disabled");
        return None;
    }
    let sink = Arc::new(StoreSink::new(store.clone(), events));
    let task = Arc::new(NotificationCheck::new(store, sink, config));
    Some(tokio::spawn(run_scheduled(
        task,
        Arc::new(SystemClock),
        shutdown_rx,
    )))
}
