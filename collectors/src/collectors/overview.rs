use crate::{
    client::StatsClient,
    collectors::{
        collector::Published,
        Collector,
        CollectorDeps,
        CollectorFuture,
    },
    identity::{
        ScrapeContext,
        OVERVIEW_ENDPOINT,
    },
    metrics::{
        DescriptorTable,
        GaugeSet,
        MetricDescriptor,
    },
};
use eyre::Result;
use prometheus::proto::MetricFamily;
use std::sync::Arc;

const OVERVIEW_ROWS: &[(&str, &str, &str)] = &[
    ("object_totals.channels", "channels", "Number of channels"),
    ("object_totals.connections", "connections", "Number of connections"),
    ("object_totals.consumers", "consumers", "Number of message consumers"),
    ("object_totals.exchanges", "exchanges", "Number of exchanges in use"),
    ("object_totals.queues", "queues", "Number of queues in use"),
    (
        "queue_totals.messages",
        "queue_messages_global",
        "Number ready and unacknowledged messages in cluster.",
    ),
    (
        "queue_totals.messages_ready",
        "queue_messages_ready_global",
        "Number of messages ready to be delivered to clients.",
    ),
    (
        "queue_totals.messages_unacknowledged",
        "queue_messages_unacknowledged_global",
        "Number of messages delivered to clients but not yet acknowledged.",
    ),
    (
        "message_stats.publish",
        "messages_published",
        "Count of messages published.",
    ),
    (
        "message_stats.deliver_get",
        "messages_delivered",
        "Count of messages delivered in acknowledgement mode, no-ack mode or in response to basic.get.",
    ),
    (
        "message_stats.ack",
        "messages_acknowledged",
        "Count of messages acknowledged by clients.",
    ),
    (
        "message_stats.redeliver",
        "messages_redelivered",
        "Count of subset of messages in deliver_get which had the redelivered flag set.",
    ),
];

/// Cluster-wide object counts and queue totals from `overview`.
///
/// Reuses the reply already carried by the scrape context when there is one.
pub struct OverviewCollector {
    client: Arc<dyn StatsClient>,
    gauges: Published<GaugeSet>,
}

impl OverviewCollector {
    pub const NAME: &'static str = "overview";

    pub fn new(deps: &CollectorDeps) -> Result<Self> {
        let table = DescriptorTable::from_rows(OVERVIEW_ROWS, &["cluster", "node"]).without_excluded(&deps.exclusions);
        Ok(Self {
            client: deps.client.clone(),
            gauges: Published::new(GaugeSet::new(&table)?),
        })
    }

    pub fn construct(deps: &CollectorDeps) -> Result<Arc<dyn Collector>> {
        Ok(Arc::new(Self::new(deps)?))
    }
}

impl Collector for OverviewCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        self.gauges.read(|gauges| gauges.descriptors().cloned().collect())
    }

    fn collect<'a>(&'a self, ctx: &'a ScrapeContext) -> CollectorFuture<'a> {
        Box::pin(async move {
            let fetch = async move {
                match &ctx.overview {
                    Some(overview) => Ok(overview.snapshot()),
                    None => self.client.fetch_map(OVERVIEW_ENDPOINT, &ctx.cancel).await,
                }
            };
            self.gauges
                .cycle(Self::NAME, fetch, |gauges, snapshot| {
                    gauges.apply(&snapshot, &ctx.identity.labels());
                })
                .await
        })
    }

    fn gather(&self) -> Vec<MetricFamily> {
        self.gauges.read(GaugeSet::gather)
    }
}
