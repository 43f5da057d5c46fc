use crate::metrics::{
    NodeDescriptor,
    StatDocument,
    StatSnapshot,
};
use eyre::Result;
use std::{
    future::Future,
    pin::Pin,
};
use tokio_util::sync::CancellationToken;

/// Boxed future returned by the management API seams.
pub type FetchFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Endpoint listing the cluster members.
pub const NODES_ENDPOINT: &str = "nodes";

/// Access to the broker's management API.
///
/// Implementors only provide `fetch_json`; the typed accessors decode its
/// reply. Every call receives the scrape's cancellation token and must give up
/// once it is cancelled.
pub trait StatsClient: Send + Sync {
    /// GETs `path` relative to the API root and decodes the JSON reply.
    fn fetch_json<'a>(&'a self, path: &'a str, cancel: &'a CancellationToken) -> FetchFuture<'a, serde_json::Value>;

    /// Flat `dotted.key -> number` view of an endpoint.
    fn fetch_map<'a>(&'a self, path: &'a str, cancel: &'a CancellationToken) -> FetchFuture<'a, StatSnapshot> {
        Box::pin(async move {
            let reply = self.fetch_json(path, cancel).await?;
            Ok(StatSnapshot::from_json(&reply))
        })
    }

    /// Current cluster members.
    fn fetch_node_list<'a>(&'a self, cancel: &'a CancellationToken) -> FetchFuture<'a, Vec<NodeDescriptor>> {
        Box::pin(async move {
            let reply = self.fetch_json(NODES_ENDPOINT, cancel).await?;
            NodeDescriptor::list_from_json(&reply)
        })
    }

    /// Reply of an endpoint carrying strings next to numbers.
    fn fetch_structured<'a>(&'a self, path: &'a str, cancel: &'a CancellationToken) -> FetchFuture<'a, StatDocument> {
        Box::pin(async move { Ok(StatDocument::new(self.fetch_json(path, cancel).await?)) })
    }
}
