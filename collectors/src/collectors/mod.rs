//! # Collectors Module
//!
//! Pluggable units that each own one family of related metrics.
//!
//! ## Architecture
//!
//! - **`Collector` trait**: the describe/collect/gather contract consumed by the scrape driver
//! - **`CollectorRegistry`**: name to constructor map used to instantiate the active collectors
//! - **`AlivenessCollector`**: `aliveness-test` probe, one synthetic status metric
//! - **`MemoryCollector`**: memory breakdown of every cluster member, flagged with `self`
//! - **`LocalMemoryCollector`**: memory breakdown of the node answering the API
//! - **`OverviewCollector`**: object and queue totals from `overview`
//!
//! ## Collection cycle
//!
//! Every cycle fetches first and only then takes the gauge write lock to reset
//! and repopulate, so readers never see a half-populated table. A failed fetch
//! leaves the collector's gauges empty.

pub mod aliveness;
pub mod collector;
pub mod memory;
pub mod overview;
pub mod registry;

// Re-export the main types for easy access
pub use aliveness::{
    AlivenessCollector,
    AlivenessInfo,
};
pub use collector::{
    Collector,
    CollectorDeps,
    CollectorFuture,
};
pub use memory::{
    LocalMemoryCollector,
    MemoryCollector,
};
pub use overview::OverviewCollector;
pub use registry::{
    Constructor,
    CollectorRegistry,
    RegistryError,
};
