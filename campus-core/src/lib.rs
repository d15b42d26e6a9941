//! SmartCampus Core - Domain Types
//!
//! Pure data structures shared by the API server and the typed client.
//! This crate contains no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod entities;
pub mod enums;
pub mod error;

pub use entities::*;
pub use enums::*;
pub use error::{CampusError, CampusResult, StoreError, ValidationError};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Entity type discriminator used in errors and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    User,
    Faculty,
    Appointment,
    Broadcast,
    Notification,
}
