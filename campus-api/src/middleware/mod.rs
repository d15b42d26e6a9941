//! Middleware modules for the SmartCampus API
//!
//! - `auth`: bearer token decoding into request extensions

mod auth;

pub use auth::{auth_middleware, AuthExtractor, AuthMiddlewareError, AuthMiddlewareState};
