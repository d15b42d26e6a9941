use std::sync::Arc;

use futures_util::StreamExt;

use crate::error::{GraphqlError, TransportError};
use crate::operation::Operation;

use super::{Link, ResponseStream};

/// What the error link saw go past.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedError {
    Graphql {
        operation: Option<String>,
        error: GraphqlError,
    },
    Network {
        operation: Option<String>,
        error: TransportError,
    },
}

type Handler = dyn Fn(&ObservedError) + Send + Sync;

/// Logs field errors and transport failures without touching the results.
pub struct ErrorLink {
    next: Arc<dyn Link>,
    handler: Option<Arc<Handler>>,
}

impl ErrorLink {
    pub fn new(next: Arc<dyn Link>) -> Self {
        Self {
            next,
            handler: None,
        }
    }

    /// Also hand every observed error to `handler`.
    pub fn on_error(mut self, handler: impl Fn(&ObservedError) + Send + Sync + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }
}

impl Link for ErrorLink {
    fn request(&self, operation: Operation) -> ResponseStream {
        let name = operation.operation_name().map(str::to_string);
        let handler = self.handler.clone();

        self.next
            .request(operation)
            .inspect(move |result| match result {
                Ok(response) => {
                    for error in &response.errors {
                        tracing::error!(
                            operation = name.as_deref().unwrap_or("<anonymous>"),
                            message = %error.message,
                            path = %error.path_string(),
                            locations = ?error.locations,
                            "[GraphQL error]"
                        );
                        if let Some(handler) = &handler {
                            handler(&ObservedError::Graphql {
                                operation: name.clone(),
                                error: error.clone(),
                            });
                        }
                    }
                }
                Err(error) => {
                    tracing::error!(
                        operation = name.as_deref().unwrap_or("<anonymous>"),
                        error = %error,
                        "[Network error]"
                    );
                    if let Some(handler) = &handler {
                        handler(&ObservedError::Network {
                            operation: name.clone(),
                            error: error.clone(),
                        });
                    }
                }
            })
            .boxed()
    }
}
