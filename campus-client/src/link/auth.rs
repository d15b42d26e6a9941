use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};
use serde_json::{json, Value};

use crate::operation::Operation;
use crate::storage::{current_token, TokenStore};

use super::{Link, ResponseStream};

/// `Bearer <token>`, or the empty string when no token is stored.
pub async fn authorization_value(store: &dyn TokenStore) -> String {
    match current_token(store).await {
        Some(token) => format!("Bearer {}", token),
        None => String::new(),
    }
}

/// `connection_init` payload for the subscription socket.
pub async fn connection_params(store: &dyn TokenStore) -> Value {
    json!({ "Authorization": authorization_value(store).await })
}

/// Sets the `authorization` header from token storage on every request.
///
/// The token is read when the request is made, so a login or logout takes
/// effect on the next operation.
pub struct AuthLink {
    store: Arc<dyn TokenStore>,
    next: Arc<dyn Link>,
}

impl AuthLink {
    pub fn new(store: Arc<dyn TokenStore>, next: Arc<dyn Link>) -> Self {
        Self { store, next }
    }
}

impl Link for AuthLink {
    fn request(&self, mut operation: Operation) -> ResponseStream {
        let store = self.store.clone();
        let next = self.next.clone();
        async move {
            let value = authorization_value(store.as_ref()).await;
            operation.context_mut().set_header("authorization", value);
            next.request(operation)
        }
        .flatten_stream()
        .boxed()
    }
}
