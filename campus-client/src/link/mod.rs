//! The operation pipeline.
//!
//! A [`Link`] takes an [`Operation`] and returns a stream of results. Links
//! compose: the client's chain is
//!
//! ```text
//! ErrorLink -> SplitLink -+-> WebSocketLink            (subscriptions)
//!                         +-> AuthLink -> HttpLink     (queries, mutations)
//! ```
//!
//! Queries and mutations yield one result; subscriptions yield one per event.

mod auth;
mod error;
mod http;
mod split;
mod ws;

use futures_util::stream::BoxStream;

use crate::error::TransportError;
use crate::operation::{GraphqlResponse, Operation};

pub use auth::{authorization_value, connection_params, AuthLink};
pub use error::{ErrorLink, ObservedError};
pub use http::HttpLink;
pub use split::SplitLink;
pub use ws::WebSocketLink;

pub type ResponseStream = BoxStream<'static, Result<GraphqlResponse, TransportError>>;

pub trait Link: Send + Sync {
    fn request(&self, operation: Operation) -> ResponseStream;
}
