use crate::{
    client::{
        FetchFuture,
        StatsClient,
    },
    metrics::{
        LabelValues,
        StatDocument,
    },
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Endpoint reporting the cluster name and the node serving the API.
pub const OVERVIEW_ENDPOINT: &str = "overview";

/// Who is being scraped: the cluster and the node answering the API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub cluster: String,
    pub node: String,
}

impl Identity {
    pub fn new(cluster: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            node: node.into(),
        }
    }

    /// `cluster` and `node` label bindings.
    pub fn labels(&self) -> LabelValues {
        LabelValues::new()
            .with("cluster", self.cluster.as_str())
            .with("node", self.node.as_str())
    }
}

/// Everything a collector needs to know about the running scrape.
#[derive(Debug, Clone, Default)]
pub struct ScrapeContext {
    pub identity: Identity,
    /// Cancelled when the scrape overruns its deadline or is abandoned.
    pub cancel: CancellationToken,
    /// The `overview` reply fetched while resolving the identity, if any.
    pub overview: Option<Arc<StatDocument>>,
}

impl ScrapeContext {
    pub fn new(identity: Identity) -> Self {
        Self::with_cancellation(identity, CancellationToken::new())
    }

    pub fn with_cancellation(identity: Identity, cancel: CancellationToken) -> Self {
        Self {
            identity,
            cancel,
            overview: None,
        }
    }

    pub fn with_overview(mut self, overview: StatDocument) -> Self {
        self.overview = Some(Arc::new(overview));
        self
    }
}

/// Resolves the identity of the current scrape.
pub trait IdentityProvider: Send + Sync {
    fn identity<'a>(&'a self, cancel: &'a CancellationToken) -> FetchFuture<'a, Identity>;

    /// Builds the context shared by every collector of one scrape.
    fn resolve<'a>(&'a self, cancel: &'a CancellationToken) -> FetchFuture<'a, ScrapeContext> {
        Box::pin(async move {
            let identity = self.identity(cancel).await?;
            Ok(ScrapeContext::with_cancellation(identity, cancel.clone()))
        })
    }
}

/// Reads `cluster_name` and `node` from the `overview` endpoint.
///
/// Brokers that do not report a field yield an empty string for it. The
/// resolved context carries the reply, so the `overview` collector does not
/// request it a second time.
pub struct OverviewIdentity {
    client: Arc<dyn StatsClient>,
}

impl OverviewIdentity {
    pub fn new(client: Arc<dyn StatsClient>) -> Self {
        Self { client }
    }
}

impl IdentityProvider for OverviewIdentity {
    fn identity<'a>(&'a self, cancel: &'a CancellationToken) -> FetchFuture<'a, Identity> {
        Box::pin(async move { Ok(self.resolve(cancel).await?.identity) })
    }

    fn resolve<'a>(&'a self, cancel: &'a CancellationToken) -> FetchFuture<'a, ScrapeContext> {
        Box::pin(async move {
            let overview = self.client.fetch_structured(OVERVIEW_ENDPOINT, cancel).await?;
            let identity = Identity::new(
                overview.get_string("cluster_name").unwrap_or_default(),
                overview.get_string("node").unwrap_or_default(),
            );
            trace!(?identity, "Resolved scrape identity");
            Ok(ScrapeContext::with_cancellation(identity, cancel.clone()).with_overview(overview))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticStatsClient;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn reads_cluster_and_node_from_overview() {
        let client = StaticStatsClient::new().with(
            OVERVIEW_ENDPOINT,
            json!({ "cluster_name": "rabbit@prod", "node": "rabbit@n2", "rabbitmq_version": "3.13.0" }),
        );
        let identity = OverviewIdentity::new(Arc::new(client))
            .identity(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(identity, Identity::new("rabbit@prod", "rabbit@n2"));
    }

    #[tokio::test]
    async fn missing_fields_resolve_to_empty() {
        let client = StaticStatsClient::new().with(OVERVIEW_ENDPOINT, json!({}));
        let identity = OverviewIdentity::new(Arc::new(client))
            .identity(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(identity, Identity::default());
    }

    #[tokio::test]
    async fn fetch_failure_propagates() {
        let provider = OverviewIdentity::new(Arc::new(StaticStatsClient::new()));
        assert!(provider.identity(&CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn resolved_context_keeps_the_overview_reply() {
        let client = Arc::new(StaticStatsClient::new().with(
            OVERVIEW_ENDPOINT,
            json!({ "cluster_name": "c1", "node": "n1", "object_totals": { "queues": 3 } }),
        ));
        let ctx = OverviewIdentity::new(client.clone())
            .resolve(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ctx.identity, Identity::new("c1", "n1"));
        let overview = ctx.overview.unwrap();
        assert_eq!(overview.snapshot().get("object_totals.queues"), Some(3.0));
        assert_eq!(client.requests(), vec![OVERVIEW_ENDPOINT]);
    }
}
