use std::sync::Arc;

use crate::operation::Operation;

use super::{Link, ResponseStream};

type Predicate = dyn Fn(&Operation) -> bool + Send + Sync;

/// Routes each operation to one of two links.
pub struct SplitLink {
    test: Box<Predicate>,
    left: Arc<dyn Link>,
    right: Arc<dyn Link>,
}

impl SplitLink {
    /// Operations for which `test` holds go `left`, the rest go `right`.
    pub fn new(
        test: impl Fn(&Operation) -> bool + Send + Sync + 'static,
        left: Arc<dyn Link>,
        right: Arc<dyn Link>,
    ) -> Self {
        Self {
            test: Box::new(test),
            left,
            right,
        }
    }

    /// Subscriptions to `subscriptions`, queries and mutations to `requests`.
    pub fn by_kind(subscriptions: Arc<dyn Link>, requests: Arc<dyn Link>) -> Self {
        Self::new(Operation::is_subscription, subscriptions, requests)
    }
}

impl Link for SplitLink {
    fn request(&self, operation: Operation) -> ResponseStream {
        if (self.test)(&operation) {
            tracing::trace!(kind = %operation.kind(), "Routing operation to subscription transport");
            self.left.request(operation)
        } else {
            tracing::trace!(kind = %operation.kind(), "Routing operation to HTTP transport");
            self.right.request(operation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::testing::RecordingLink;
    use futures_util::StreamExt;
    use proptest::prelude::*;

    fn split() -> (SplitLink, Arc<RecordingLink>, Arc<RecordingLink>) {
        let ws = Arc::new(RecordingLink::new());
        let http = Arc::new(RecordingLink::new());
        (SplitLink::by_kind(ws.clone(), http.clone()), ws, http)
    }

    #[tokio::test]
    async fn test_subscriptions_route_to_socket() {
        let (link, ws, http) = split();
        let _ = link
            .request(Operation::new("subscription { broadcastCreated { id } }").expect("parse"))
            .next()
            .await;
        assert_eq!((ws.count(), http.count()), (1, 0));
    }

    #[tokio::test]
    async fn test_queries_and_mutations_route_to_http() {
        let (link, ws, http) = split();
        for doc in [
            "{ faculties { id } }",
            "mutation { login(email: \"a\", password: \"b\") { token } }",
        ] {
            let _ = link.request(Operation::new(doc).expect("parse")).next().await;
        }
        assert_eq!((ws.count(), http.count()), (0, 2));
    }

    proptest! {
        #[test]
        fn prop_routing_depends_only_on_kind(
            kind in prop_oneof![Just("query"), Just("mutation"), Just("subscription")],
            name in "[A-Z][a-zA-Z]{0,12}",
            field in "[a-z][a-zA-Z]{0,12}",
        ) {
            let doc = format!("{} {} {{ {} {{ id }} }}", kind, name, field);
            let op = Operation::new(&doc).expect("parse");
            let (link, ws, http) = split();
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("runtime");
            let _ = runtime.block_on(link.request(op).next());
            let expect_socket = kind == "subscription";
            prop_assert_eq!(ws.count(), usize::from(expect_socket));
            prop_assert_eq!(http.count(), usize::from(!expect_socket));
        }
    }
}
