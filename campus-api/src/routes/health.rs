//! Health Check Endpoints
//!
//! - GET / : service banner
//! - GET /api/health : liveness check
//!
//! No authentication required.

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /
pub async fn banner() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(BannerResponse {
            message: "SmartCampus backend is running".to_string(),
        }),
    )
}

/// GET /api/health
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(banner))
        .route("/api/health", get(health))
}
