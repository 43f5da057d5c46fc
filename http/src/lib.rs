//! HTTP side of the exporter: the management API client, the scrape driver
//! and the axum router serving `/metrics`.

#[macro_use]
extern crate tracing;

pub mod client;
pub mod error;
pub mod router;
pub mod scraper;

pub use client::ManagementClient;
pub use router::create_router;
pub use scraper::Scraper;
