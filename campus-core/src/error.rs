//! Error types for SmartCampus operations

use crate::EntityType;
use thiserror::Error;
use uuid::Uuid;

/// Store layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("{entity_type:?} already exists: {key}")]
    AlreadyExists { entity_type: EntityType, key: String },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Slot not available: {reason}")]
    SlotUnavailable { reason: String },
}

/// Master error type for all SmartCampus errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CampusError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Result type alias for SmartCampus operations.
pub type CampusResult<T> = Result<T, CampusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display_not_found() {
        let err = StoreError::NotFound {
            entity_type: EntityType::Faculty,
            id: Uuid::nil(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Entity not found"));
        assert!(msg.contains("Faculty"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_validation_error_display_transition() {
        let err = ValidationError::InvalidTransition {
            from: "Rejected".to_string(),
            to: "Approved".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition from Rejected to Approved"
        );
    }

    #[test]
    fn test_campus_error_from_conversions() {
        let store = CampusError::from(StoreError::Unavailable {
            reason: "closed".to_string(),
        });
        assert!(matches!(store, CampusError::Store(_)));

        let validation = CampusError::from(ValidationError::RequiredFieldMissing {
            field: "title".to_string(),
        });
        assert!(matches!(validation, CampusError::Validation(_)));
    }
}
