use std::time::Duration;

use futures_util::stream::{self, StreamExt};

use crate::error::TransportError;
use crate::operation::{GraphqlResponse, Operation};

use super::{Link, ResponseStream};

/// Sends queries and mutations as JSON `POST` requests.
#[derive(Clone)]
pub struct HttpLink {
    client: reqwest::Client,
    url: String,
}

impl HttpLink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Link for HttpLink {
    fn request(&self, operation: Operation) -> ResponseStream {
        let client = self.client.clone();
        let url = self.url.clone();
        stream::once(async move { post(&client, &url, &operation).await }).boxed()
    }
}

async fn post(
    client: &reqwest::Client,
    url: &str,
    operation: &Operation,
) -> Result<GraphqlResponse, TransportError> {
    let mut request = client.post(url).json(&operation.to_request());
    for (name, value) in operation.context().headers() {
        request = request.header(name, value);
    }

    tracing::debug!(
        url,
        kind = %operation.kind(),
        operation = operation.operation_name().unwrap_or("<anonymous>"),
        "Sending GraphQL request"
    );
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        // GraphQL servers may answer errors with a non-2xx status.
        if let Ok(parsed) = serde_json::from_str::<GraphqlResponse>(&body) {
            if parsed.has_errors() {
                return Ok(parsed);
            }
        }
        return Err(TransportError::Status {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
}
