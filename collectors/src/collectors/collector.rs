use crate::{
    client::StatsClient,
    identity::ScrapeContext,
    metrics::{
        ExclusionSet,
        GaugeSet,
        MetricDescriptor,
    },
};
use eyre::Result;
use prometheus::proto::MetricFamily;
use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        PoisonError,
        RwLock,
    },
};

pub type CollectorFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Trait for collecting and exposing one family of broker metrics
pub trait Collector: Send + Sync {
    /// Get the name this collector is registered under
    fn name(&self) -> &'static str;

    /// Metadata of every metric this collector may publish. Never touches the network.
    fn describe(&self) -> Vec<MetricDescriptor>;

    /// Fetch the current broker state and repopulate the gauges.
    ///
    /// On error the gauges are left empty for this cycle.
    fn collect<'a>(&'a self, ctx: &'a ScrapeContext) -> CollectorFuture<'a>;

    /// Metric families populated by the last cycle
    fn gather(&self) -> Vec<MetricFamily>;
}

/// Shared inputs of every collector constructor.
#[derive(Clone)]
pub struct CollectorDeps {
    pub client: Arc<dyn StatsClient>,
    pub exclusions: Arc<ExclusionSet>,
    /// Virtual host probed by the aliveness collector.
    pub aliveness_vhost: String,
}

impl CollectorDeps {
    pub fn new(client: Arc<dyn StatsClient>) -> Self {
        Self {
            client,
            exclusions: Default::default(),
            aliveness_vhost: "/".to_string(),
        }
    }

    pub fn with_exclusions(mut self, exclusions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclusions = Arc::new(exclusions.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_aliveness_vhost(mut self, vhost: impl Into<String>) -> Self {
        self.aliveness_vhost = vhost.into();
        self
    }
}

/// Gauge state that is cleared before being repopulated.
pub(crate) trait Reset {
    fn reset(&self);
}

impl Reset for GaugeSet {
    fn reset(&self) {
        GaugeSet::reset(self)
    }
}

/// Gauges a collector exposes between scrapes, plus the lock serializing its
/// collection cycles.
pub(crate) struct Published<T> {
    cycle: tokio::sync::Mutex<()>,
    state: RwLock<T>,
}

impl<T: Reset> Published<T> {
    pub(crate) fn new(state: T) -> Self {
        Self {
            cycle: tokio::sync::Mutex::new(()),
            state: RwLock::new(state),
        }
    }

    /// Runs one collection cycle.
    ///
    /// `fetch` runs without holding the gauge lock. Its result is handed to
    /// `commit` under the write lock right after the reset. If `fetch` fails
    /// the gauges are only reset.
    pub(crate) async fn cycle<D>(
        &self,
        collector: &'static str,
        fetch: impl Future<Output = Result<D>>,
        commit: impl FnOnce(&T, D),
    ) -> Result<()> {
        let _cycle = self.cycle.lock().await;
        let fetched = fetch.await;

        let state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.reset();
        match fetched {
            Ok(data) => {
                commit(&state, data);
                Ok(())
            }
            Err(err) => {
                warn!(collector, error = %err, "Collection cycle failed, gauges cleared");
                Err(err)
            }
        }
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }
}
