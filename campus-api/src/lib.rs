//! SmartCampus API - GraphQL over HTTP and WebSocket
//!
//! Serves faculty availability, appointment booking, broadcasts and
//! notifications through an async-graphql schema mounted on Axum, backed by
//! an in-memory store and a broadcast event bus. A background job sends
//! appointment reminders every two minutes.

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod graphql;
pub mod jobs;
pub mod macros;
pub mod middleware;
pub mod password;
pub mod routes;
pub mod state;
pub mod store;
pub mod telemetry;

// Re-export commonly used types
pub use auth::{
    bearer_token, decode_connection_params, decode_principal, generate_jwt_token,
    validate_jwt_token, AuthConfig, AuthContext, Claims, Principal,
};
pub use config::ServerConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use events::{CampusEvent, EventBus};
pub use graphql::{build_schema, CampusSchema};
pub use routes::create_router;
pub use state::AppState;
pub use store::CampusStore;
