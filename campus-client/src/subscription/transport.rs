//! Socket transports carrying protocol messages.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;

use super::protocol::{ClientMessage, ServerMessage, SUBPROTOCOL};

/// An open connection speaking the subscription protocol.
#[async_trait]
pub trait WsTransport: Send {
    async fn send(&mut self, message: ClientMessage) -> Result<(), TransportError>;

    /// `None` once the connection has closed.
    async fn recv(&mut self) -> Option<Result<ServerMessage, TransportError>>;

    async fn close(&mut self);
}

/// Opens transports. Swappable so the connection lifecycle can be driven
/// without a network.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsTransport>, TransportError>;
}

/// Connects with `tokio-tungstenite`, negotiating `graphql-transport-ws`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsTransport>, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(SUBPROTOCOL),
        );
        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!(url, "WebSocket connected");
        Ok(Box::new(TungsteniteTransport { stream }))
    }
}

struct TungsteniteTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl WsTransport for TungsteniteTransport {
    async fn send(&mut self, message: ClientMessage) -> Result<(), TransportError> {
        let text = serde_json::to_string(&message)
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<ServerMessage, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(
                        serde_json::from_str(text.as_str())
                            .map_err(|e| TransportError::Decode(e.to_string())),
                    );
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "WebSocket closed by server");
                    return None;
                }
                // Control frames are answered by tungstenite itself.
                Ok(_) => continue,
                Err(err) => return Some(Err(err.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.stream.close(None).await {
            tracing::debug!(error = %err, "WebSocket close failed");
        }
    }
}
