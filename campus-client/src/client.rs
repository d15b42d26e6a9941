//! The client facade: link chain plus normalized cache.

use std::sync::Arc;

use futures_util::stream::{BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::cache::InMemoryCache;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, GraphqlError, TransportError};
use crate::link::{AuthLink, ErrorLink, HttpLink, Link, SplitLink, WebSocketLink};
use crate::operation::{GraphqlResponse, Operation, OperationKind};
use crate::storage::{LocalStorage, TokenStore};
use crate::subscription::{ConnectionState, SubscriptionClient};

/// Where a query's data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Cached data when complete, otherwise the network.
    #[default]
    CacheFirst,
    /// Cached data first, then the network result.
    CacheAndNetwork,
    /// Always the network; the result is cached.
    NetworkOnly,
    /// Never the network.
    CacheOnly,
    /// Always the network; the result is not cached.
    NoCache,
}

/// What happens to GraphQL errors in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Errors are returned alongside whatever data arrived.
    #[default]
    All,
    /// Any error fails the operation and nothing is cached.
    None,
    /// Errors are dropped; the data is returned.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    pub fetch_policy: FetchPolicy,
    pub error_policy: ErrorPolicy,
}

impl QueryOptions {
    pub fn fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
    Cache,
    Network,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub data: Option<Value>,
    pub errors: Vec<GraphqlError>,
    pub source: ResultSource,
}

impl QueryResult {
    fn cached(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
            source: ResultSource::Cache,
        }
    }

    /// Deserialize the data, or one field of it when `field` is given.
    pub fn data_as<T: DeserializeOwned>(&self, field: Option<&str>) -> ClientResult<T> {
        let data = self.data.as_ref().ok_or(ClientError::NoData)?;
        let value = match field {
            Some(field) => data.get(field).cloned().unwrap_or(Value::Null),
            None => data.clone(),
        };
        Ok(serde_json::from_value(value)?)
    }
}

pub type ResultStream = BoxStream<'static, ClientResult<QueryResult>>;

/// SmartCampus GraphQL client. Cheap to clone; clones share the cache and
/// the subscription connection.
#[derive(Clone)]
pub struct CampusClient {
    cache: Arc<InMemoryCache>,
    link: Arc<dyn Link>,
    tokens: Arc<dyn TokenStore>,
    subscriptions: Option<SubscriptionClient>,
}

impl std::fmt::Debug for CampusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampusClient")
            .field("cache", &self.cache)
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

impl CampusClient {
    /// Build the full link chain for `config`.
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> ClientResult<Self> {
        config.validate()?;

        let http: Arc<dyn Link> = Arc::new(HttpLink::new(
            config.http_url.clone(),
            config.request_timeout(),
        )?);
        let subscriptions = SubscriptionClient::new(
            config.ws_url.clone(),
            tokens.clone(),
            config.websocket.clone(),
        );
        let split = SplitLink::by_kind(
            Arc::new(WebSocketLink::new(subscriptions.clone())),
            Arc::new(AuthLink::new(tokens.clone(), http)),
        );
        let link = Arc::new(ErrorLink::new(Arc::new(split)));

        tracing::debug!(
            http_url = %config.http_url,
            ws_url = %config.ws_url,
            "Campus client configured"
        );

        Ok(Self {
            cache: Arc::new(InMemoryCache::default()),
            link,
            tokens,
            subscriptions: Some(subscriptions),
        })
    }

    /// Build a client whose token lives in the configured storage file.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let tokens = Arc::new(LocalStorage::new(config.storage_path.clone()));
        Self::new(config, tokens)
    }

    /// A client over an arbitrary link, without a subscription connection.
    pub fn with_link(
        link: Arc<dyn Link>,
        cache: Arc<InMemoryCache>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            cache,
            link,
            tokens,
            subscriptions: None,
        }
    }

    pub fn cache(&self) -> &Arc<InMemoryCache> {
        &self.cache
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.subscriptions.as_ref().map(SubscriptionClient::state)
    }

    pub fn watch_connection(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.subscriptions.as_ref().map(SubscriptionClient::watch_state)
    }

    /// Store the token used by later requests and socket handshakes.
    pub async fn sign_in(&self, token: &str) -> ClientResult<()> {
        self.tokens.save_token(token).await?;
        Ok(())
    }

    /// Forget the token and everything cached under it.
    pub async fn sign_out(&self) -> ClientResult<()> {
        self.tokens.clear_token().await?;
        self.reset_store();
        Ok(())
    }

    pub async fn query(&self, operation: Operation) -> ClientResult<QueryResult> {
        self.query_with(operation, QueryOptions::default()).await
    }

    /// Run a query once. `CacheAndNetwork` behaves like `NetworkOnly` here;
    /// use [`watch_query`](Self::watch_query) to see both results.
    pub async fn query_with(
        &self,
        operation: Operation,
        options: QueryOptions,
    ) -> ClientResult<QueryResult> {
        expect_kind(&operation, OperationKind::Query)?;

        match options.fetch_policy {
            FetchPolicy::CacheFirst | FetchPolicy::CacheOnly => {
                if let Some(data) = self.cache.read_query(&operation) {
                    return Ok(QueryResult::cached(data));
                }
                if options.fetch_policy == FetchPolicy::CacheOnly {
                    return Err(ClientError::CacheMiss);
                }
                execute(&*self.link, &self.cache, operation, options.error_policy, true).await
            }
            FetchPolicy::CacheAndNetwork | FetchPolicy::NetworkOnly => {
                execute(&*self.link, &self.cache, operation, options.error_policy, true).await
            }
            FetchPolicy::NoCache => {
                execute(&*self.link, &self.cache, operation, options.error_policy, false).await
            }
        }
    }

    pub fn watch_query(&self, operation: Operation) -> ResultStream {
        self.watch_query_with(
            operation,
            QueryOptions::default().fetch_policy(FetchPolicy::CacheAndNetwork),
        )
    }

    /// Results of `operation` as the cache changes. The first items follow
    /// the fetch policy; afterwards every cache change that alters the
    /// result yields it again.
    pub fn watch_query_with(&self, operation: Operation, options: QueryOptions) -> ResultStream {
        let cache = self.cache.clone();
        let link = self.link.clone();

        async_stream::stream! {
            if let Err(err) = expect_kind(&operation, OperationKind::Query) {
                yield Err(err);
                return;
            }

            let mut changes = cache.watch();
            changes.borrow_and_update();

            let mut last = None;
            let read_cache = !matches!(
                options.fetch_policy,
                FetchPolicy::NetworkOnly | FetchPolicy::NoCache
            );
            if read_cache {
                if let Some(data) = cache.read_query(&operation) {
                    last = Some(data.clone());
                    yield Ok(QueryResult::cached(data));
                }
            }

            let fetch = match options.fetch_policy {
                FetchPolicy::CacheFirst => last.is_none(),
                FetchPolicy::CacheOnly => false,
                _ => true,
            };
            if fetch {
                let write = options.fetch_policy != FetchPolicy::NoCache;
                let result = execute(&*link, &cache, operation.clone(), options.error_policy, write).await;
                // Mark the write as seen before yielding; changes made while
                // the consumer holds the result must still wake the loop.
                changes.borrow_and_update();
                if let Ok(result) = &result {
                    last = cache.read_query(&operation).or_else(|| result.data.clone());
                }
                yield result;
                if !write {
                    return;
                }
            } else if last.is_none() {
                yield Err(ClientError::CacheMiss);
            }

            while changes.changed().await.is_ok() {
                let Some(data) = cache.read_query(&operation) else {
                    continue;
                };
                if last.as_ref() != Some(&data) {
                    last = Some(data.clone());
                    yield Ok(QueryResult::cached(data));
                }
            }
        }
        .boxed()
    }

    pub async fn mutate(&self, operation: Operation) -> ClientResult<QueryResult> {
        self.mutate_with(operation, ErrorPolicy::default()).await
    }

    /// Run a mutation; its result is normalized so affected entities update.
    pub async fn mutate_with(
        &self,
        operation: Operation,
        error_policy: ErrorPolicy,
    ) -> ClientResult<QueryResult> {
        expect_kind(&operation, OperationKind::Mutation)?;
        execute(&*self.link, &self.cache, operation, error_policy, true).await
    }

    pub fn subscribe(&self, operation: Operation) -> ResultStream {
        self.subscribe_with(operation, ErrorPolicy::default())
    }

    /// Each payload is written to the cache before it is delivered.
    pub fn subscribe_with(&self, operation: Operation, error_policy: ErrorPolicy) -> ResultStream {
        if let Err(err) = expect_kind(&operation, OperationKind::Subscription) {
            return futures_util::stream::once(async move { Err(err) }).boxed();
        }
        let cache = self.cache.clone();
        let responses = self.link.request(operation.clone());

        responses
            .map(move |item| match item {
                Ok(response) => settle(&cache, &operation, response, error_policy, true),
                Err(err) => Err(err.into()),
            })
            .boxed()
    }

    /// Drop every cached entity. Watchers are notified.
    pub fn reset_store(&self) {
        tracing::debug!("Resetting client store");
        self.cache.reset();
    }
}

fn expect_kind(operation: &Operation, kind: OperationKind) -> ClientResult<()> {
    if operation.kind() == kind {
        Ok(())
    } else {
        Err(ClientError::InvalidOperation(format!(
            "Expected a {} operation, got a {}",
            kind,
            operation.kind()
        )))
    }
}

/// Send `operation` down the link chain and take its single result.
async fn execute(
    link: &dyn Link,
    cache: &InMemoryCache,
    operation: Operation,
    error_policy: ErrorPolicy,
    write: bool,
) -> ClientResult<QueryResult> {
    let mut responses = link.request(operation.clone());
    let response = match responses.next().await {
        Some(Ok(response)) => response,
        Some(Err(err)) => return Err(err.into()),
        None => return Err(TransportError::ConnectionClosed.into()),
    };
    settle(cache, &operation, response, error_policy, write)
}

/// Apply the error policy to a response and cache what survives it.
fn settle(
    cache: &InMemoryCache,
    operation: &Operation,
    response: GraphqlResponse,
    error_policy: ErrorPolicy,
    write: bool,
) -> ClientResult<QueryResult> {
    let GraphqlResponse { data, errors, .. } = response;
    if error_policy == ErrorPolicy::None && !errors.is_empty() {
        return Err(ClientError::Graphql(errors));
    }
    if write {
        if let Some(data) = &data {
            cache.write_query(operation, data);
        }
    }
    let errors = match error_policy {
        ErrorPolicy::Ignore => Vec::new(),
        _ => errors,
    };
    Ok(QueryResult {
        data: data.filter(|d| !d.is_null()),
        errors,
        source: ResultSource::Network,
    })
}
