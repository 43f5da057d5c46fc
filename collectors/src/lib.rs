//! # RabbitMQ Exporter Collectors
//!
//! The stat-to-metric mapping core of the exporter. Every collector fetches a
//! key/value snapshot from the broker's management API, maps the fields it
//! declares onto labeled gauges and hands the result to the scrape driver.
//!
//! ## Architecture
//!
//! - **`metrics`**: metric descriptors, the exclusion filter, stat snapshots
//!   and the `GaugeSet` that implements the shared reset-then-populate mapping
//! - **`client`**: the `StatsClient` seam to the management API
//! - **`identity`**: the cluster/node identity attached to each scrape
//! - **`collectors`**: the `Collector` trait, the constructor registry and the
//!   builtin collectors
//!   - **`AlivenessCollector`**: single-value status probe
//!   - **`MemoryCollector`**: per-node memory breakdown with a self flag
//!   - **`LocalMemoryCollector`**: memory breakdown of the scraped node only
//!   - **`OverviewCollector`**: cluster-wide object and queue totals
//!
//! ## Usage
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use rabbit_exporter_collectors::*;
//! # async fn run(client: Arc<dyn StatsClient>) -> eyre::Result<()> {
//! let registry = CollectorRegistry::builtin()?;
//! let deps = CollectorDeps::new(client.clone());
//! let memory = registry.instantiate("memory", &deps)?;
//!
//! let identity = OverviewIdentity::new(client);
//! let ctx = identity.resolve(&Default::default()).await?;
//! memory.collect(&ctx).await?;
//! let families = memory.gather();
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate tracing;

pub mod client;
pub mod collectors;
pub mod identity;
pub mod metrics;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{
    FetchFuture,
    StatsClient,
};
pub use collectors::*;
pub use identity::{
    Identity,
    IdentityProvider,
    OverviewIdentity,
    ScrapeContext,
};
pub use metrics::*;

/// Prefix of every published metric name.
pub const NAMESPACE: &str = "rabbitmq";
