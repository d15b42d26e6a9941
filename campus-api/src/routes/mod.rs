//! HTTP Routes Module
//!
//! - GraphQL over HTTP and WebSocket at `/graphql`
//! - Health checks at `/` and `/api/health` (public)
//! - CORS for the browser front-end

pub mod graphql;
pub mod health;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::middleware::{auth_middleware, AuthMiddlewareState};
use crate::state::AppState;

pub use graphql::create_router as graphql_router;
pub use health::create_router as health_router;

/// Build the CORS layer from configuration.
///
/// Credentials are only allowed together with an explicit origin list.
pub fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any).allow_headers(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: allowing configured origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        let cors = cors
            .allow_origin(origins)
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);
        if config.cors_allow_credentials {
            cors.allow_credentials(true)
        } else {
            cors
        }
    }
}

/// Create the complete router: health, GraphQL, auth decoding, CORS and
/// request tracing.
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let auth_state = AuthMiddlewareState::new(state.auth.clone());

    let graphql = graphql::create_router()
        .layer(from_fn_with_state(auth_state, auth_middleware));

    Router::new()
        .merge(health::create_router())
        .merge(graphql)
        .layer(build_cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::events::EventBus;
    use crate::store::CampusStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = AppState::new(
            Arc::new(CampusStore::new()),
            EventBus::new(8),
            Arc::new(AuthConfig::default()),
        );
        create_router(state, &ServerConfig::default())
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_frontend_origin() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/graphql")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:3000")
        );
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .and_then(|v| v.to_str().ok()),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_banner_route() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(json["message"], "SmartCampus backend is running");
    }
}
