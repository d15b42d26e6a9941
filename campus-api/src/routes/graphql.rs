//! GraphQL Routes
//!
//! - POST /graphql: queries and mutations over HTTP
//! - GET /graphql: WebSocket upgrade for subscriptions
//!   (`graphql-transport-ws` and legacy `graphql-ws`)

use std::sync::Arc;

use async_graphql::Data;
use async_graphql_axum::{
    GraphQLProtocol, GraphQLRequest, GraphQLResponse, GraphQLWebSocket,
};
use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
    routing::post,
    Router,
};

use crate::auth::{decode_connection_params, AuthConfig};
use crate::graphql::CampusSchema;
use crate::middleware::AuthExtractor;
use crate::state::AppState;

/// Execute a query or mutation with the caller's auth context.
pub async fn graphql_handler(
    State(schema): State<CampusSchema>,
    AuthExtractor(auth): AuthExtractor,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let request = req.into_inner().data(auth);
    schema.execute(request).await.into()
}

/// Upgrade to a GraphQL WebSocket. Credentials arrive in `connection_init`.
pub async fn graphql_ws_handler(
    State(schema): State<CampusSchema>,
    State(auth_config): State<Arc<AuthConfig>>,
    protocol: GraphQLProtocol,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade
        .protocols(async_graphql::http::ALL_WEBSOCKET_PROTOCOLS)
        .on_upgrade(move |stream| {
            GraphQLWebSocket::new(stream, schema, protocol)
                .on_connection_init(move |params| async move {
                    let auth = decode_connection_params(&auth_config, &params);
                    tracing::debug!(
                        authenticated = auth.is_authenticated(),
                        "GraphQL WebSocket connection initialised"
                    );
                    let mut data = Data::default();
                    data.insert(auth);
                    Ok(data)
                })
                .serve()
        })
}

/// Create the GraphQL router.
pub fn create_router() -> Router<AppState> {
    Router::new().route("/graphql", post(graphql_handler).get(graphql_ws_handler))
}
