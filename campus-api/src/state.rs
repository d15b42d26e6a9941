//! Shared application state for Axum routers.

use std::sync::Arc;

use crate::auth::AuthConfig;
use crate::events::EventBus;
use crate::graphql::{build_schema, CampusSchema};
use crate::store::CampusStore;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CampusStore>,
    /// Domain events feeding GraphQL subscriptions and the notification job.
    pub events: EventBus,
    pub auth: Arc<AuthConfig>,
    pub schema: CampusSchema,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire the store, bus and schema together.
    pub fn new(store: Arc<CampusStore>, events: EventBus, auth: Arc<AuthConfig>) -> Self {
        let schema = build_schema(store.clone(), events.clone(), auth.clone());
        Self {
            store,
            events,
            auth,
            schema,
            start_time: std::time::Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<CampusStore>, store);
crate::impl_from_ref!(EventBus, events);
crate::impl_from_ref!(Arc<AuthConfig>, auth);
crate::impl_from_ref!(CampusSchema, schema);
crate::impl_from_ref!(std::time::Instant, start_time);
