use crate::{
    client::StatsClient,
    collectors::{
        collector::Published,
        Collector,
        CollectorDeps,
        CollectorFuture,
    },
    identity::{
        Identity,
        ScrapeContext,
    },
    metrics::{
        DescriptorTable,
        GaugeSet,
        LabelValues,
        MetricDescriptor,
        NodeDescriptor,
        StatSnapshot,
    },
};
use eyre::{
    Context as _,
    Result,
};
use futures::future::try_join_all;
use prometheus::proto::MetricFamily;
use std::sync::Arc;

/// `(dotted key, metric name, help)` of the `nodes/<name>/memory` breakdown.
const MEMORY_ROWS: &[(&str, &str, &str)] = &[
    (
        "memory.allocated_unused",
        "memory_allocated_unused_bytes",
        "Memory preallocated by the runtime (VM allocators) but not yet used",
    ),
    (
        "memory.atom",
        "memory_atom_bytes",
        "Memory used by atoms. Should be fairly constant",
    ),
    (
        "memory.binary",
        "memory_binary_bytes",
        "Memory used by shared binary data in the runtime. Most of this memory is message bodies and metadata.",
    ),
    (
        "memory.code",
        "memory_code_bytes",
        "Memory used by code (bytecode, module metadata). This section is usually fairly constant and relatively small (unless the node is entirely blank and stores no data).",
    ),
    (
        "memory.connection_channels",
        "memory_connection_channels_bytes",
        "Memory used by client connections - channels",
    ),
    (
        "memory.connection_other",
        "memory_connection_other_bytes",
        "Memory used by client connection - other",
    ),
    (
        "memory.connection_readers",
        "memory_connection_readers_bytes",
        "Memory used by processes responsible for connection parser and most of connection state. Most of their memory attributes to TCP buffers",
    ),
    (
        "memory.connection_writers",
        "memory_connection_writers_bytes",
        "Memory used by processes responsible for serialization of outgoing protocol frames and writing to client connections sockets",
    ),
    (
        "memory.metrics",
        "memory_metrics_bytes",
        "Node-local metrics. The more connections, channels, queues are node hosts, the more stats there are to collect and keep",
    ),
    (
        "memory.mgmt_db",
        "memory_mgmt_db_bytes",
        "Management DB ETS tables + processes",
    ),
    (
        "memory.mnesia",
        "memory_mnesia_bytes",
        "Internal database (Mnesia) tables keep an in-memory copy of all its data (even on disc nodes)",
    ),
    (
        "memory.msg_index",
        "memory_msg_index_bytes",
        "Message index ETS + processes",
    ),
    (
        "memory.other_ets",
        "memory_other_ets_bytes",
        "Other in-memory tables besides those belonging to the stats database and internal database tables",
    ),
    (
        "memory.other_proc",
        "memory_other_proc_bytes",
        "Memory used by all other processes that RabbitMQ cannot categorise",
    ),
    (
        "memory.other_system",
        "memory_other_system_bytes",
        "Memory used by all other system that RabbitMQ cannot categorise",
    ),
    (
        "memory.plugins",
        "memory_plugins_bytes",
        "Memory used by plugins (apart from the Erlang client which is counted under Connections, and the management database which is counted separately).",
    ),
    (
        "memory.queue_procs",
        "memory_queue_procs_bytes",
        "Memory used by class queue masters, queue indices, queue state",
    ),
    (
        "memory.queue_slave_procs",
        "memory_queue_slave_procs_bytes",
        "Memory used by class queue mirrors, queue indices, queue state",
    ),
    (
        "memory.reserved_unallocated",
        "memory_reserved_unallocated_bytes",
        "Memory preallocated/reserved by the kernel but not the runtime",
    ),
    (
        "memory.total.allocated",
        "memory_total_allocated_bytes",
        "Node-local total memory - allocated",
    ),
    (
        "memory.total.rss",
        "memory_total_rss_bytes",
        "Node-local total memory - rss",
    ),
    (
        "memory.total.erlang",
        "memory_total_erlang_bytes",
        "Node-local total memory - erlang",
    ),
];

fn memory_endpoint(node: &str) -> String {
    format!("nodes/{node}/memory")
}

fn memory_table(labels: &[&str], deps: &CollectorDeps) -> Result<GaugeSet> {
    GaugeSet::new(&DescriptorTable::from_rows(MEMORY_ROWS, labels).without_excluded(&deps.exclusions))
}

/// Memory breakdown of every cluster member.
///
/// Each node's series carry `self="1"` when the node is the one answering the
/// management API and `self="0"` otherwise. A failure to list the nodes or to
/// fetch any single node fails the whole cycle.
pub struct MemoryCollector {
    client: Arc<dyn StatsClient>,
    gauges: Published<GaugeSet>,
}

impl MemoryCollector {
    pub const NAME: &'static str = "memory";
    const LABELS: &'static [&'static str] = &["cluster", "node", "self"];

    pub fn new(deps: &CollectorDeps) -> Result<Self> {
        Ok(Self {
            client: deps.client.clone(),
            gauges: Published::new(memory_table(Self::LABELS, deps)?),
        })
    }

    pub fn construct(deps: &CollectorDeps) -> Result<Arc<dyn Collector>> {
        Ok(Arc::new(Self::new(deps)?))
    }

    async fn fetch(&self, ctx: &ScrapeContext) -> Result<Vec<(NodeDescriptor, StatSnapshot)>> {
        let nodes = self
            .client
            .fetch_node_list(&ctx.cancel)
            .await
            .context("Failed to list cluster nodes")?;
        debug!(nodes = nodes.len(), "Fetching memory breakdown per node");

        try_join_all(nodes.into_iter().map(|node| async move {
            let endpoint = memory_endpoint(&node.name);
            let snapshot = self.client.fetch_map(&endpoint, &ctx.cancel).await?;
            Ok::<_, eyre::Report>((node, snapshot))
        }))
        .await
    }
}

/// Label bindings of one node's series: the node's descriptor fields, then
/// the identity, `node` and `self`.
fn node_labels(identity: &Identity, node: &NodeDescriptor) -> LabelValues {
    let is_self = node.name == identity.node;
    node.labels
        .iter()
        .fold(LabelValues::new(), |labels, (name, value)| labels.with(name.as_str(), value.as_str()))
        .with("cluster", identity.cluster.as_str())
        .with("node", node.name.as_str())
        .with("self", if is_self { "1" } else { "0" })
}

impl Collector for MemoryCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        self.gauges.read(|gauges| gauges.descriptors().cloned().collect())
    }

    fn collect<'a>(&'a self, ctx: &'a ScrapeContext) -> CollectorFuture<'a> {
        Box::pin(self.gauges.cycle(Self::NAME, self.fetch(ctx), move |gauges, per_node| {
            for (node, snapshot) in &per_node {
                gauges.apply(snapshot, &node_labels(&ctx.identity, node));
            }
        }))
    }

    fn gather(&self) -> Vec<MetricFamily> {
        self.gauges.read(GaugeSet::gather)
    }
}

/// Memory breakdown of the node answering the management API only.
///
/// Series carry `cluster` and `node` but no `self` flag.
pub struct LocalMemoryCollector {
    client: Arc<dyn StatsClient>,
    gauges: Published<GaugeSet>,
}

impl LocalMemoryCollector {
    pub const NAME: &'static str = "memory_local";
    const LABELS: &'static [&'static str] = &["cluster", "node"];

    pub fn new(deps: &CollectorDeps) -> Result<Self> {
        Ok(Self {
            client: deps.client.clone(),
            gauges: Published::new(memory_table(Self::LABELS, deps)?),
        })
    }

    pub fn construct(deps: &CollectorDeps) -> Result<Arc<dyn Collector>> {
        Ok(Arc::new(Self::new(deps)?))
    }
}

impl Collector for LocalMemoryCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        self.gauges.read(|gauges| gauges.descriptors().cloned().collect())
    }

    fn collect<'a>(&'a self, ctx: &'a ScrapeContext) -> CollectorFuture<'a> {
        let endpoint = memory_endpoint(&ctx.identity.node);
        Box::pin(async move {
            let fetch = self.client.fetch_map(&endpoint, &ctx.cancel);
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
