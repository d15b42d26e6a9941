use crate::operation::Operation;
use crate::subscription::SubscriptionClient;

use super::{Link, ResponseStream};

/// Sends operations over the shared subscription connection.
#[derive(Debug, Clone)]
pub struct WebSocketLink {
    client: SubscriptionClient,
}

impl WebSocketLink {
    pub fn new(client: SubscriptionClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &SubscriptionClient {
        &self.client
    }
}

impl Link for WebSocketLink {
    fn request(&self, operation: Operation) -> ResponseStream {
        self.client.subscribe(&operation)
    }
}
