//! Property-based tests for bearer token handling.
//!
//! The auth middleware never rejects a request: whatever arrives in the
//! `Authorization` header, the request reaches the handler, and only a
//! token signed with the server secret yields an authenticated context.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware,
    routing::get,
    Router,
};
use campus_api::{
    bearer_token, decode_principal, generate_jwt_token,
    middleware::{auth_middleware, AuthExtractor, AuthMiddlewareState},
    AuthConfig,
};
use campus_test_utils::generators::arb_user;
use proptest::prelude::*;
use std::sync::Arc;
use tower::ServiceExt;

fn test_auth_config() -> AuthConfig {
    AuthConfig::with_secret("property-test-secret-abcdefghijklmnop").expect("valid secret")
}

fn test_app() -> Router {
    let state = AuthMiddlewareState::new(Arc::new(test_auth_config()));
    Router::new()
        .route(
            "/whoami",
            get(|AuthExtractor(auth): AuthExtractor| async move {
                if auth.is_authenticated() {
                    "authenticated"
                } else {
                    "anonymous"
                }
            }),
        )
        .layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

async fn whoami(authorization: Option<String>) -> (StatusCode, String) {
    let mut builder = Request::builder().uri("/whoami");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    let response = test_app()
        .oneshot(builder.body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_bearer_token_extracts_trimmed_token(token in "[A-Za-z0-9._-]{1,64}", pad in " {0,3}") {
        let value = format!("{}Bearer {}{}", pad, token, pad);
        prop_assert_eq!(bearer_token(&value), Some(token.as_str()));
    }

    #[test]
    fn prop_non_bearer_schemes_are_ignored(scheme in "(Basic|Token|Digest)", token in "[A-Za-z0-9]{1,32}") {
        let value = format!("{} {}", scheme, token);
        prop_assert_eq!(bearer_token(&value), None);
    }

    #[test]
    fn prop_garbage_headers_never_authenticate(value in "[ -~]{0,80}") {
        let config = test_auth_config();
        prop_assert!(!decode_principal(&config, Some(&value)).is_authenticated());

        let (status, body) = runtime().block_on(whoami(Some(value)));
        prop_assert_eq!(status, StatusCode::OK);
        prop_assert_eq!(body, "anonymous");
    }

    #[test]
    fn prop_issued_tokens_authenticate(user in arb_user()) {
        let config = test_auth_config();
        let token = generate_jwt_token(&config, &user).expect("token");

        let context = decode_principal(&config, Some(&format!("Bearer {}", token)));
        let principal = context.require().expect("authenticated");
        prop_assert_eq!(principal.user_id, user.id);
        prop_assert_eq!(principal.role, user.role);

        let (status, body) = runtime().block_on(whoami(Some(format!("Bearer {}", token))));
        prop_assert_eq!(status, StatusCode::OK);
        prop_assert_eq!(body, "authenticated");
    }

    #[test]
    fn prop_tokens_from_another_secret_are_rejected(user in arb_user()) {
        let foreign = AuthConfig::with_secret("some-other-secret-0000000000000000").expect("secret");
        let token = generate_jwt_token(&foreign, &user).expect("token");
        let context = decode_principal(&test_auth_config(), Some(&format!("Bearer {}", token)));
        prop_assert!(!context.is_authenticated());
    }
}

#[tokio::test]
async fn missing_header_is_anonymous() {
    let (status, body) = whoami(None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "anonymous");
}
