//! Axum middleware that resolves the caller's identity.
//!
//! The `Authorization: Bearer <token>` header is decoded into an
//! [`AuthContext`] and stored in request extensions. A missing or invalid
//! token yields an anonymous context; access rules live in the resolvers.

use crate::auth::{decode_principal, AuthConfig, AuthContext};
use crate::error::ApiError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Shared state for the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthMiddlewareState {
    pub auth_config: Arc<AuthConfig>,
}

impl AuthMiddlewareState {
    pub fn new(auth_config: Arc<AuthConfig>) -> Self {
        Self { auth_config }
    }
}

/// Decode the bearer token and attach the resulting [`AuthContext`].
///
/// ```ignore
/// use axum::{middleware, Router};
/// use campus_api::middleware::{auth_middleware, AuthMiddlewareState};
///
/// let app = Router::new()
///     .route("/graphql", axum::routing::post(|| async { "OK" }))
///     .layer(middleware::from_fn_with_state(auth_state, auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let auth_context = decode_principal(&state.auth_config, authorization);
    if let Some(principal) = &auth_context.principal {
        tracing::debug!(user_id = %principal.user_id, role = %principal.role, "Authenticated request");
    }

    request.extensions_mut().insert(auth_context);
    next.run(request).await
}

/// Error wrapper for extractor failures.
#[derive(Debug)]
pub struct AuthMiddlewareError(pub ApiError);

impl IntoResponse for AuthMiddlewareError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

/// Typed extractor for the [`AuthContext`] injected by [`auth_middleware`].
///
/// Fails with 500 when the middleware was not applied to the route.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = AuthMiddlewareError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthExtractor)
            .ok_or_else(|| {
                AuthMiddlewareError(ApiError::internal_error(
                    "AuthContext not found in request extensions. \
                     Ensure auth_middleware is applied to this route.",
                ))
            })
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
