//! SmartCampus GraphQL client.
//!
//! Operations travel through a link chain: errors are observed, then
//! subscriptions are split off to a shared `graphql-transport-ws`
//! connection while queries and mutations get a bearer token and go over
//! HTTP. Every result is normalized into an [`InMemoryCache`] governed by
//! per-type policies.

pub mod cache;
pub mod client;
pub mod config;
pub mod documents;
pub mod error;
pub mod link;
pub mod operation;
pub mod storage;
pub mod subscription;

pub use cache::{InMemoryCache, TypePolicies};
pub use client::{CampusClient, ErrorPolicy, FetchPolicy, QueryOptions, QueryResult, ResultSource};
pub use config::{ClientConfig, WebSocketConfig};
pub use error::{ClientError, ClientResult, GraphqlError, TransportError};
pub use operation::{GraphqlResponse, Operation, OperationKind};
pub use storage::{LocalStorage, MemoryTokenStore, TokenStore};
pub use subscription::{ConnectionState, SubscriptionClient};
