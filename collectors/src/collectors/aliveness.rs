use crate::{
    client::StatsClient,
    collectors::{
        collector::{
            Published,
            Reset,
        },
        Collector,
        CollectorDeps,
        CollectorFuture,
    },
    identity::ScrapeContext,
    metrics::{
        new_gauge_vec,
        non_empty,
        DescriptorTable,
        GaugeSet,
        LabelValues,
        MetricDescriptor,
        StatDocument,
    },
};
use eyre::Result;
use prometheus::{
    core::Collector as _,
    proto::MetricFamily,
    GaugeVec,
};
use std::sync::Arc;

const ALIVENESS_ROWS: &[(&str, &str, &str)] = &[("vhost.aliveness", "aliveness_test", "vhost aliveness test")];

/// Result of one `aliveness-test` probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlivenessInfo {
    pub status: String,
    pub error: String,
    pub reason: String,
}

impl AlivenessInfo {
    pub fn from_document(document: &StatDocument) -> Self {
        let field = |key: &str| document.get_string(key).unwrap_or_default().to_string();
        Self {
            status: field("status"),
            error: field("error"),
            reason: field("reason"),
        }
    }

    /// 1 when the broker answered `ok`, 0 for anything else.
    pub fn flag(&self) -> f64 {
        if self.status == "ok" {
            1.0
        } else {
            0.0
        }
    }

    fn labels(&self) -> LabelValues {
        LabelValues::new()
            .with("status", self.status.as_str())
            .with("error", self.error.as_str())
            .with("reason", self.reason.as_str())
    }
}

/// `aliveness-test/<vhost>` path with the vhost percent-encoded.
fn aliveness_endpoint(vhost: &str) -> String {
    let vhost = url::form_urlencoded::byte_serialize(vhost.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    format!("aliveness-test/{vhost}")
}

struct AlivenessGauges {
    info_descriptor: MetricDescriptor,
    info: GaugeVec,
    stats: GaugeSet,
}

impl Reset for AlivenessGauges {
    fn reset(&self) {
        self.info.reset();
        self.stats.reset();
    }
}

/// Probes the broker through `aliveness-test` and publishes the outcome.
///
/// `rabbitmq_aliveness_info{status,error,reason}` holds 1 for `ok` and 0
/// otherwise. At most one label tuple exists per cycle.
pub struct AlivenessCollector {
    client: Arc<dyn StatsClient>,
    endpoint: String,
    gauges: Published<AlivenessGauges>,
}

impl AlivenessCollector {
    pub const NAME: &'static str = "aliveness";

    pub fn new(deps: &CollectorDeps) -> Result<Self> {
        let info_descriptor = MetricDescriptor::new(
            "status",
            "aliveness_info",
            "A metric with value 1 status:ok else 0 labeled by aliveness test status, error, reason",
            &["status", "error", "reason"],
        );
        let stats = DescriptorTable::from_rows(ALIVENESS_ROWS, &["status"]).without_excluded(&deps.exclusions);

        Ok(Self {
            client: deps.client.clone(),
            endpoint: aliveness_endpoint(&deps.aliveness_vhost),
            gauges: Published::new(AlivenessGauges {
                info: new_gauge_vec(&info_descriptor)?,
                info_descriptor,
                stats: GaugeSet::new(&stats)?,
            }),
        })
    }

    pub fn construct(deps: &CollectorDeps) -> Result<Arc<dyn Collector>> {
        Ok(Arc::new(Self::new(deps)?))
    }
}

impl Collector for AlivenessCollector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn describe(&self) -> Vec<MetricDescriptor> {
        self.gauges.read(|gauges| {
            std::iter::once(gauges.info_descriptor.clone())
                .chain(gauges.stats.descriptors().cloned())
                .collect()
        })
    }

    fn collect<'a>(&'a self, ctx: &'a ScrapeContext) -> CollectorFuture<'a> {
        Box::pin(async move {
            let fetch = self.client.fetch_structured(&self.endpoint, &ctx.cancel);
            self.gauges
                .cycle(Self::NAME, fetch, |gauges, document| {
                    let info = AlivenessInfo::from_document(&document);
                    debug!(?info, "Aliveness probe answered");

                    let labels = info.labels();
                    gauges
                        .info
                        .with_label_values(&labels.resolve(gauges.info_descriptor.labels()))
                        .set(info.flag());
                    gauges.stats.apply(&document.snapshot(), &labels);
                })
                .await
        })
    }

    fn gather(&self) -> Vec<MetricFamily> {
        self.gauges
            .read(|gauges| non_empty(gauges.info.collect().into_iter().chain(gauges.stats.gather())))
    }
}
