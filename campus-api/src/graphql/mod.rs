//! GraphQL Schema
//!
//! Query, mutation and subscription roots over the in-memory store. Shared
//! services (store, event bus, auth config) are schema data; the caller's
//! [`AuthContext`] is request data attached by the HTTP handler or by the
//! WebSocket `connection_init` callback.

mod mutation;
mod query;
mod subscription;
pub mod types;

use std::sync::Arc;

use async_graphql::{Context, Schema};

use crate::auth::{AuthConfig, AuthContext, Principal};
use crate::error::IntoGqlResult;
use crate::events::EventBus;
use crate::store::CampusStore;

pub use mutation::MutationRoot;
pub use query::QueryRoot;
pub use subscription::SubscriptionRoot;

/// The GraphQL schema type.
pub type CampusSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

/// Build the schema with its shared services.
pub fn build_schema(
    store: Arc<CampusStore>,
    events: EventBus,
    auth: Arc<AuthConfig>,
) -> CampusSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(store)
        .data(events)
        .data(auth)
        .finish()
}

static ANONYMOUS: AuthContext = AuthContext { principal: None };

/// The caller's auth context. Requests without one are anonymous.
pub(crate) fn auth_context<'a>(ctx: &'a Context<'_>) -> &'a AuthContext {
    ctx.data_opt::<AuthContext>().unwrap_or(&ANONYMOUS)
}

/// The caller's principal for a nullable field. Anonymous callers get an
/// error recorded at this field's path and the field resolves to null, so
/// sibling fields keep their data.
pub(crate) fn principal_or_null<'a>(ctx: &'a Context<'_>) -> Option<&'a Principal> {
    match auth_context(ctx).require().into_gql() {
        Ok(principal) => Some(principal),
        Err(err) => {
            ctx.add_error(ctx.set_error_path(err.into_server_error(ctx.item.pos)));
            None
        }
    }
}

pub(crate) fn store<'a>(ctx: &'a Context<'_>) -> async_graphql::Result<&'a Arc<CampusStore>> {
    ctx.data::<Arc<CampusStore>>()
}

pub(crate) fn events<'a>(ctx: &'a Context<'_>) -> async_graphql::Result<&'a EventBus> {
    ctx.data::<EventBus>()
}
