//! Subscription connection lifecycle.
//!
//! One lazily opened socket carries every subscription. A background task
//! owns the connection and multiplexes subscriptions over it by id:
//!
//! ```text
//! disconnected -> connecting -> connected -> (error -> reconnecting -> connecting) | closed
//! ```
//!
//! - The socket opens when the first subscription stream is polled.
//! - Every (re)connect sends fresh connection parameters from token storage.
//! - A dropped connection is retried up to `retry_attempts` consecutive
//!   times with backoff; active subscriptions are re-sent on success.
//! - When the last subscription ends the socket closes after
//!   `lazy_close_timeout`.

pub mod protocol;
pub mod transport;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::config::WebSocketConfig;
use crate::error::TransportError;
use crate::link::{connection_params, ResponseStream};
use crate::operation::{GraphqlRequest, GraphqlResponse, Operation};
use crate::storage::TokenStore;

use protocol::{ClientMessage, ServerMessage};
pub use transport::{Connector, TungsteniteConnector, WsTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        })
    }
}

type Delivery = mpsc::UnboundedSender<Result<GraphqlResponse, TransportError>>;

enum Command {
    Subscribe {
        id: String,
        request: GraphqlRequest,
        sink: Delivery,
    },
    Unsubscribe {
        id: String,
    },
}

struct Subscriber {
    request: GraphqlRequest,
    sink: Delivery,
}

struct Shared {
    url: String,
    connector: Arc<dyn Connector>,
    tokens: Arc<dyn TokenStore>,
    config: WebSocketConfig,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            tracing::debug!(url = %self.url, state = %state, "Subscription connection state changed");
        }
    }
}

/// Handle to the shared subscription connection. Clones share it.
#[derive(Clone)]
pub struct SubscriptionClient {
    shared: Arc<Shared>,
    // Dropping every handle and stream closes the channel and stops the task.
    commands: Arc<Mutex<Option<mpsc::UnboundedSender<Command>>>>,
    next_id: Arc<AtomicU64>,
}

impl fmt::Debug for SubscriptionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionClient")
            .field("url", &self.shared.url)
            .field("state", &*self.shared.state.borrow())
            .finish()
    }
}

impl SubscriptionClient {
    pub fn new(
        url: impl Into<String>,
        tokens: Arc<dyn TokenStore>,
        config: WebSocketConfig,
    ) -> Self {
        Self::with_connector(url, Arc::new(TungsteniteConnector), tokens, config)
    }

    pub fn with_connector(
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
        tokens: Arc<dyn TokenStore>,
        config: WebSocketConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                connector,
                tokens,
                config,
                state,
            }),
            commands: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Start `operation` on the shared connection.
    ///
    /// Nothing is sent until the stream is polled. Dropping the stream
    /// unsubscribes. The stream ends when the server completes the
    /// subscription, and yields a transport error first if reconnecting
    /// gives up.
    pub fn subscribe(&self, operation: &Operation) -> ResponseStream {
        let client = self.clone();
        let request = operation.to_request();
        let id = (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string();

        async_stream::stream! {
            let commands = client.command_sender();
            let (sink, mut deliveries) = mpsc::unbounded_channel();
            if commands
                .send(Command::Subscribe { id: id.clone(), request, sink })
                .is_err()
            {
                yield Err(TransportError::Shutdown);
                return;
            }
            let _guard = Unsubscribe { id, commands };
            while let Some(item) = deliveries.recv().await {
                yield item;
            }
        }
        .boxed()
    }

    /// The connection task's command channel, spawning the task on first use.
    fn command_sender(&self) -> mpsc::UnboundedSender<Command> {
        let mut slot = match self.commands.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(sender) = slot.as_ref().filter(|s| !s.is_closed()) {
            return sender.clone();
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(self.shared.clone(), receiver));
        *slot = Some(sender.clone());
        sender
    }
}

/// Sends `complete` for its subscription when the stream is dropped.
struct Unsubscribe {
    id: String,
    commands: mpsc::UnboundedSender<Command>,
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unsubscribe {
            id: std::mem::take(&mut self.id),
        });
    }
}

enum ServeExit {
    /// No subscriptions left; socket closed after the lazy timeout.
    Idle,
    /// The connection failed or the server closed it.
    Dropped(TransportError),
    /// Every client handle is gone.
    Shutdown,
}

async fn run_connection(shared: Arc<Shared>, mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut subscribers: HashMap<String, Subscriber> = HashMap::new();

    'idle: loop {
        while subscribers.is_empty() {
            match commands.recv().await {
                Some(Command::Subscribe { id, request, sink }) => {
                    subscribers.insert(id, Subscriber { request, sink });
                }
                Some(Command::Unsubscribe { .. }) => {}
                None => return,
            }
        }

        let mut failures = 0u32;
        loop {
            shared.set_state(if failures == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            });

            let opened = match while_offline(open(&shared), &mut commands, &mut subscribers).await {
                Offline::Done(opened) => opened,
                Offline::Idle => {
                    tracing::debug!(url = %shared.url, "Last subscription ended while connecting");
                    shared.set_state(ConnectionState::Disconnected);
                    continue 'idle;
                }
                Offline::Shutdown => {
                    shared.set_state(ConnectionState::Closed);
                    return;
                }
            };
            let error = match opened {
                Ok(mut transport) => {
                    failures = 0;
                    shared.set_state(ConnectionState::Connected);
                    tracing::info!(url = %shared.url, subscriptions = subscribers.len(), "Subscription connection established");
                    match serve(&shared, transport.as_mut(), &mut commands, &mut subscribers).await {
                        ServeExit::Idle => {
                            shared.set_state(ConnectionState::Disconnected);
                            continue 'idle;
                        }
                        ServeExit::Shutdown => {
                            shared.set_state(ConnectionState::Closed);
                            return;
                        }
                        ServeExit::Dropped(error) => error,
                    }
                }
                Err(error) => error,
            };

            if subscribers.is_empty() {
                tracing::debug!(error = %error, "Connection lost with no active subscriptions");
                shared.set_state(ConnectionState::Disconnected);
                continue 'idle;
            }

            failures += 1;
            if failures > shared.config.retry_attempts {
                tracing::error!(
                    url = %shared.url,
                    attempts = failures,
                    error = %error,
                    "Giving up on subscription connection"
                );
                shared.set_state(ConnectionState::Closed);
                let exhausted = TransportError::RetriesExhausted { attempts: failures };
                for (_, subscriber) in subscribers.drain() {
                    let _ = subscriber.sink.send(Err(exhausted.clone()));
                }
                continue 'idle;
            }

            let delay = jittered_backoff(
                shared.config.retry_delay_ms(failures),
                shared.config.retry_jitter_ms,
            );
            tracing::warn!(
                url = %shared.url,
                attempt = failures,
                max_attempts = shared.config.retry_attempts,
                delay_ms = delay,
                error = %error,
                "Subscription connection error; reconnecting"
            );
            shared.set_state(ConnectionState::Reconnecting);
            let backoff = tokio::time::sleep(Duration::from_millis(delay));
            match while_offline(backoff, &mut commands, &mut subscribers).await {
                Offline::Done(()) => {}
                Offline::Idle => {
                    tracing::debug!(url = %shared.url, "Last subscription ended during backoff");
                    shared.set_state(ConnectionState::Disconnected);
                    continue 'idle;
                }
                Offline::Shutdown => {
                    shared.set_state(ConnectionState::Closed);
                    return;
                }
            }
        }
    }
}

enum Offline<T> {
    Done(T),
    /// The last subscription ended before `fut` finished.
    Idle,
    Shutdown,
}

/// Drive `fut` while still taking commands, for the stretches (handshake,
/// backoff) where no connection is serving them.
async fn while_offline<F: Future>(
    fut: F,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    subscribers: &mut HashMap<String, Subscriber>,
) -> Offline<F::Output> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            output = &mut fut => return Offline::Done(output),
            command = commands.recv() => match command {
                Some(Command::Subscribe { id, request, sink }) => {
                    subscribers.insert(id, Subscriber { request, sink });
                }
                Some(Command::Unsubscribe { id }) => {
                    subscribers.remove(&id);
                    if subscribers.is_empty() {
                        return Offline::Idle;
                    }
                }
                None => return Offline::Shutdown,
            },
        }
    }
}

/// Connect and complete the `connection_init` / `connection_ack` handshake.
async fn open(shared: &Shared) -> Result<Box<dyn WsTransport>, TransportError> {
    let mut transport = shared.connector.connect(&shared.url).await?;
    let payload = connection_params(shared.tokens.as_ref()).await;
    transport
        .send(ClientMessage::ConnectionInit {
            payload: Some(payload),
        })
        .await?;

    let handshake = async {
        loop {
            match transport.recv().await {
                Some(Ok(ServerMessage::ConnectionAck { .. })) => return Ok::<(), TransportError>(()),
                Some(Ok(ServerMessage::Ping { .. })) => {
                    transport.send(ClientMessage::Pong { payload: None }).await?;
                }
                Some(Ok(other)) => {
                    tracing::debug!(message = ?other, "Ignoring message before connection_ack");
                }
                Some(Err(err)) => return Err(err),
                None => return Err(TransportError::ConnectionClosed),
            }
        }
    };
    let outcome = tokio::time::timeout(shared.config.ack_timeout(), handshake).await;
    match outcome {
        Ok(Ok(())) => Ok(transport),
        Ok(Err(err)) => Err(err),
        Err(_) => {
            transport.close().await;
            Err(TransportError::AckTimeout)
        }
    }
}

/// Pump messages between subscribers and an established connection.
async fn serve(
    shared: &Shared,
    transport: &mut dyn WsTransport,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    subscribers: &mut HashMap<String, Subscriber>,
) -> ServeExit {
    for (id, subscriber) in subscribers.iter() {
        let message = ClientMessage::Subscribe {
            id: id.clone(),
            payload: subscriber.request.clone(),
        };
        if let Err(err) = transport.send(message).await {
            return ServeExit::Dropped(err);
        }
    }

    let lazy_close = shared.config.lazy_close_timeout();
    let mut idle_deadline = subscribers.is_empty().then(|| Instant::now() + lazy_close);

    loop {
        let deadline = idle_deadline;
        let idle_timer = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Subscribe { id, request, sink }) => {
                    let message = ClientMessage::Subscribe { id: id.clone(), payload: request.clone() };
                    subscribers.insert(id, Subscriber { request, sink });
                    idle_deadline = None;
                    if let Err(err) = transport.send(message).await {
                        return ServeExit::Dropped(err);
                    }
                }
                Some(Command::Unsubscribe { id }) => {
                    if subscribers.remove(&id).is_some() {
                        tracing::debug!(id = %id, "Unsubscribing");
                        if let Err(err) = transport.send(ClientMessage::Complete { id }).await {
                            return ServeExit::Dropped(err);
                        }
                    }
                    if subscribers.is_empty() {
                        idle_deadline = Some(Instant::now() + lazy_close);
                    }
                }
                None => {
                    transport.close().await;
                    return ServeExit::Shutdown;
                }
            },
            message = transport.recv() => match message {
                Some(Ok(ServerMessage::Next { id, payload })) => {
                    if let Some(subscriber) = subscribers.get(&id) {
                        let _ = subscriber.sink.send(Ok(payload));
                    }
                }
                Some(Ok(ServerMessage::Error { id, payload })) => {
                    if let Some(subscriber) = subscribers.remove(&id) {
                        let _ = subscriber.sink.send(Ok(GraphqlResponse {
                            data: None,
                            errors: payload,
                            extensions: None,
                        }));
                    }
                    if subscribers.is_empty() {
                        idle_deadline = Some(Instant::now() + lazy_close);
                    }
                }
                Some(Ok(ServerMessage::Complete { id })) => {
                    subscribers.remove(&id);
                    if subscribers.is_empty() {
                        idle_deadline = Some(Instant::now() + lazy_close);
                    }
                }
                Some(Ok(ServerMessage::Ping { .. })) => {
                    if let Err(err) = transport.send(ClientMessage::Pong { payload: None }).await {
                        return ServeExit::Dropped(err);
                    }
                }
                Some(Ok(ServerMessage::Pong { .. } | ServerMessage::ConnectionAck { .. })) => {}
                Some(Err(err)) => return ServeExit::Dropped(err),
                None => return ServeExit::Dropped(TransportError::ConnectionClosed),
            },
            _ = idle_timer => {
                tracing::debug!("Closing idle subscription connection");
                transport.close().await;
                return ServeExit::Idle;
            }
        }
    }
}

fn jittered_backoff(base_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return base_ms;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64;
    base_ms.saturating_add(nanos % jitter_ms)
}

#[cfg(test)]
mod tests;
