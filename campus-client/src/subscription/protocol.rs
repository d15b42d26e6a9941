//! `graphql-transport-ws` protocol messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GraphqlError;
use crate::operation::{GraphqlRequest, GraphqlResponse};

pub const SUBPROTOCOL: &str = "graphql-transport-ws";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConnectionInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Subscribe {
        id: String,
        payload: GraphqlRequest,
    },
    Complete {
        id: String,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Next {
        id: String,
        payload: GraphqlResponse,
    },
    Error {
        id: String,
        payload: Vec<GraphqlError>,
    },
    Complete {
        id: String,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn test_client_messages_encode_as_protocol_frames() {
        let init = ClientMessage::ConnectionInit {
            payload: Some(json!({ "Authorization": "Bearer t" })),
        };
        assert_eq!(
            serde_json::to_value(&init).expect("encode"),
            json!({ "type": "connection_init", "payload": { "Authorization": "Bearer t" } })
        );

        let subscribe = ClientMessage::Subscribe {
            id: "1".to_string(),
            payload: GraphqlRequest {
                query: "subscription { broadcastCreated { id } }".to_string(),
                operation_name: None,
                variables: Map::new(),
            },
        };
        assert_eq!(
            serde_json::to_value(&subscribe).expect("encode"),
            json!({
                "type": "subscribe",
                "id": "1",
                "payload": { "query": "subscription { broadcastCreated { id } }", "variables": {} }
            })
        );

        assert_eq!(
            serde_json::to_value(ClientMessage::Pong { payload: None }).expect("encode"),
            json!({ "type": "pong" })
        );
    }

    #[test]
    fn test_server_messages_decode() {
        let ack: ServerMessage =
            serde_json::from_value(json!({ "type": "connection_ack" })).expect("decode");
        assert_eq!(ack, ServerMessage::ConnectionAck { payload: None });

        let next: ServerMessage = serde_json::from_value(json!({
            "type": "next",
            "id": "7",
            "payload": { "data": { "broadcastCreated": { "id": "b1" } } }
        }))
        .expect("decode");
        match next {
            ServerMessage::Next { id, payload } => {
                assert_eq!(id, "7");
                assert_eq!(
                    payload.data,
                    Some(json!({ "broadcastCreated": { "id": "b1" } }))
                );
            }
            other => panic!("unexpected message {:?}", other),
        }

        let error: ServerMessage = serde_json::from_value(json!({
            "type": "error",
            "id": "7",
            "payload": [{ "message": "Authentication required" }]
        }))
        .expect("decode");
        assert!(matches!(error, ServerMessage::Error { ref payload, .. } if payload.len() == 1));
    }
}
