//! Labeled gauges and the stat-to-gauge mapping shared by every collector.

use crate::{
    metrics::{
        DescriptorTable,
        MetricDescriptor,
        StatSnapshot,
    },
    NAMESPACE,
};
use eyre::{
    Context as _,
    Result,
};
use prometheus::{
    core::Collector as _,
    proto::MetricFamily,
    Encoder as _,
    GaugeVec,
    Opts,
    TextEncoder,
};
use std::collections::BTreeMap;

/// Label name to value bindings of one scrape.
///
/// Descriptors pick the values they need through their label schema, a label
/// without a binding resolves to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelValues {
    values: BTreeMap<String, String>,
}

impl LabelValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or_default()
    }

    /// Label tuple in the order of `schema`.
    pub fn resolve<'a>(&'a self, schema: &'a [String]) -> Vec<&'a str> {
        schema.iter().map(|name| self.get(name)).collect()
    }
}

/// One `GaugeVec` per descriptor of a collector's table.
pub struct GaugeSet {
    gauges: Vec<(MetricDescriptor, GaugeVec)>,
}

impl GaugeSet {
    pub fn new(table: &DescriptorTable) -> Result<Self> {
        let gauges = table
            .iter()
            .map(|descriptor| Ok((descriptor.clone(), new_gauge_vec(descriptor)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { gauges })
    }

    /// Clears every label tuple of every gauge.
    pub fn reset(&self) {
        for (_, gauge) in &self.gauges {
            gauge.reset();
        }
    }

    /// Writes each declared key found in `snapshot` at the label tuple
    /// resolved from `labels`. Keys absent from the snapshot are skipped.
    ///
    /// Returns the number of gauges written.
    pub fn apply(&self, snapshot: &StatSnapshot, labels: &LabelValues) -> usize {
        let mut written = 0;
        for (descriptor, gauge) in &self.gauges {
            let Some(value) = snapshot.get(descriptor.key()) else {
                trace!(key = descriptor.key(), "Key missing from snapshot, skipping");
                continue;
            };
            let tuple = labels.resolve(descriptor.labels());
            debug!(key = descriptor.key(), value, labels = ?tuple, "Set gauge");
            gauge.with_label_values(&tuple).set(value);
            written += 1;
        }
        written
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &MetricDescriptor> {
        self.gauges.iter().map(|(descriptor, _)| descriptor)
    }

    /// Metric families holding at least one label tuple.
    pub fn gather(&self) -> Vec<MetricFamily> {
        non_empty(self.gauges.iter().flat_map(|(_, gauge)| gauge.collect()))
    }
}

/// Creates the `GaugeVec` for a descriptor in the exporter namespace.
pub fn new_gauge_vec(descriptor: &MetricDescriptor) -> Result<GaugeVec> {
    let labels = descriptor.labels().iter().map(String::as_str).collect::<Vec<_>>();
    GaugeVec::new(
        Opts::new(descriptor.name(), descriptor.help()).namespace(NAMESPACE),
        &labels,
    )
    .wrap_err_with(|| format!("Invalid metric definition for {}", descriptor.key()))
}

/// Drops families without samples, the text encoder rejects them.
pub fn non_empty(families: impl IntoIterator<Item = MetricFamily>) -> Vec<MetricFamily> {
    families
        .into_iter()
        .filter(|family| !family.get_metric().is_empty())
        .collect()
}

/// Renders families in the Prometheus text exposition format.
pub fn encode_text(families: &[MetricFamily]) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(families, &mut buffer)
        .context("Failed to encode metric families")?;
    String::from_utf8(buffer).context("Encoded metrics are not valid UTF-8")
}
