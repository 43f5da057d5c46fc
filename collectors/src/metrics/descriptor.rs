use std::collections::BTreeSet;

/// Dotted stat keys the operator asked to suppress.
pub type ExclusionSet = BTreeSet<String>;

/// Maps one dotted stat key of the management API onto a published gauge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    key: String,
    name: String,
    help: String,
    labels: Vec<String>,
}

impl MetricDescriptor {
    pub fn new(key: impl Into<String>, name: impl Into<String>, help: impl Into<String>, labels: &[&str]) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            help: help.into(),
            labels: labels.iter().map(|label| label.to_string()).collect(),
        }
    }

    /// Dotted key as reported by the management API, e.g. `memory.atom`.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Metric name without the namespace prefix, e.g. `memory_atom_bytes`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    /// Ordered label names of the published gauge.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Fully qualified metric name, e.g. `rabbitmq_memory_atom_bytes`.
    pub fn fq_name(&self) -> String {
        format!("{}_{}", crate::NAMESPACE, self.name)
    }
}

/// Per-collector descriptor table.
///
/// Built once when a collector is constructed and never mutated afterwards,
/// changing the exclusions requires constructing a new collector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorTable {
    descriptors: Vec<MetricDescriptor>,
}

impl DescriptorTable {
    pub fn new(descriptors: impl IntoIterator<Item = MetricDescriptor>) -> Self {
        let mut table = Self::default();
        for descriptor in descriptors {
            // A later declaration of the same key replaces the earlier one.
            table.descriptors.retain(|d| d.key != descriptor.key);
            table.descriptors.push(descriptor);
        }
        table
    }

    /// Builds a table from `(key, name, help)` rows sharing one label schema.
    pub fn from_rows(rows: &[(&str, &str, &str)], labels: &[&str]) -> Self {
        Self::new(
            rows.iter()
                .map(|(key, name, help)| MetricDescriptor::new(*key, *name, *help, labels)),
        )
    }

    /// Drops every descriptor whose key is excluded.
    ///
    /// Excluding a key the table does not declare is a no-op, so the result
    /// does not depend on duplicates or ordering in `excluded`.
    pub fn without_excluded(mut self, excluded: &ExclusionSet) -> Self {
        let before = self.descriptors.len();
        self.descriptors.retain(|d| !excluded.contains(&d.key));
        let dropped = before - self.descriptors.len();
        if dropped > 0 {
            debug!(dropped, remaining = self.descriptors.len(), "Excluded metrics from descriptor table");
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetricDescriptor> {
        self.descriptors.iter().find(|d| d.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDescriptor> {
        self.descriptors.iter()
    }
}
