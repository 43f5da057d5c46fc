use eyre::Result;
use futures::future::join_all;
use prometheus::{
    core::Collector as _,
    proto::MetricFamily,
    Gauge,
    Opts,
};
use rabbit_exporter_collectors::{
    encode_text,
    new_gauge_vec,
    non_empty,
    Collector,
    IdentityProvider,
    MetricDescriptor,
    NAMESPACE,
};
use std::{
    convert::Infallible,
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};
use tokio_util::sync::CancellationToken;

/// Outcome of one collector within a scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleOutcome {
    pub name: &'static str,
    pub up: bool,
    pub elapsed: Duration,
}

/// What happened during one scrape, before encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeReport {
    pub identity_resolved: bool,
    pub modules: Vec<ModuleOutcome>,
}

impl ScrapeReport {
    /// The broker counts as up when the identity resolved and at least one
    /// collector finished its cycle.
    pub fn up(&self) -> bool {
        self.identity_resolved && self.modules.iter().any(|module| module.up)
    }

    fn families(&self) -> Result<Vec<MetricFamily>> {
        let up = Gauge::with_opts(Opts::new("up", "Was the last scrape of the management API successful.").namespace(NAMESPACE))?;
        up.set(if self.up() { 1.0 } else { 0.0 });

        let module_up = new_gauge_vec(&MetricDescriptor::new(
            "module_up",
            "module_up",
            "Was the last collection cycle of the module successful.",
            &["module"],
        ))?;
        let module_duration = new_gauge_vec(&MetricDescriptor::new(
            "module_scrape_duration_seconds",
            "module_scrape_duration_seconds",
            "Duration of the last collection cycle of the module in seconds.",
            &["module"],
        ))?;
        for module in &self.modules {
            module_up
                .with_label_values(&[module.name])
                .set(if module.up { 1.0 } else { 0.0 });
            module_duration
                .with_label_values(&[module.name])
                .set(module.elapsed.as_secs_f64());
        }

        Ok(non_empty(
            up.collect()
                .into_iter()
                .chain(module_up.collect())
                .chain(module_duration.collect()),
        ))
    }
}

/// Drives the active collectors for every `/metrics` request.
pub struct Scraper {
    identity: Arc<dyn IdentityProvider>,
    collectors: Vec<Arc<dyn Collector>>,
    timeout: Duration,
}

impl Scraper {
    pub fn new(identity: Arc<dyn IdentityProvider>, collectors: Vec<Arc<dyn Collector>>, timeout: Duration) -> Self {
        Self {
            identity,
            collectors,
            timeout,
        }
    }

    pub fn modules(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|collector| collector.name()).collect()
    }

    /// Runs one scrape and returns the driver's own families followed by
    /// those of every collector.
    ///
    /// Outstanding requests are cancelled once the timeout elapses or when
    /// the returned future is dropped.
    #[instrument(level = "debug", skip(self))]
    pub async fn scrape(&self) -> Result<Vec<MetricFamily>> {
        let cancel = CancellationToken::new();
        let _abandon = cancel.clone().drop_guard();
        let started = Instant::now();

        let report = tokio::select! {
            report = self.run(&cancel) => report,
            never = expire(self.timeout, &cancel) => match never {},
        };

        info!(
            up = report.up(),
            failed = ?report.modules.iter().filter(|m| !m.up).map(|m| m.name).collect::<Vec<_>>(),
            elapsed = ?started.elapsed(),
            "Scrape finished"
        );

        let mut families = report.families()?;
        if report.identity_resolved {
            families.extend(self.collectors.iter().flat_map(|collector| collector.gather()));
        }
        Ok(families)
    }

    /// Scrapes and encodes the result in the Prometheus text format.
    pub async fn render(&self) -> Result<String> {
        encode_text(&self.scrape().await?)
    }

    async fn run(&self, cancel: &CancellationToken) -> ScrapeReport {
        let ctx = match self.identity.resolve(cancel).await {
            Ok(ctx) => ctx,
            Err(err) => {
                warn!(error = %err, "Failed to resolve the scraped node, skipping collectors");
                return ScrapeReport {
                    identity_resolved: false,
                    modules: self
                        .collectors
                        .iter()
                        .map(|collector| ModuleOutcome {
                            name: collector.name(),
                            up: false,
                            elapsed: Duration::ZERO,
                        })
                        .collect(),
                };
            }
        };

        let modules = join_all(self.collectors.iter().map(|collector| {
            let ctx = &ctx;
            async move {
                let started = Instant::now();
                let result = collector.collect(ctx).await;
                ModuleOutcome {
                    name: collector.name(),
                    up: result.is_ok(),
                    elapsed: started.elapsed(),
                }
            }
        }))
        .await;

        ScrapeReport {
            identity_resolved: true,
            modules,
        }
    }
}

/// Cancels `cancel` once `timeout` has elapsed, then never completes.
async fn expire(timeout: Duration, cancel: &CancellationToken) -> Infallible {
    tokio::time::sleep(timeout).await;
    warn!(?timeout, "Scrape deadline exceeded, cancelling outstanding requests");
    cancel.cancel();
    std::future::pending().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rabbit_exporter_collectors::{
        testing::{
            samples,
            StaticStatsClient,
        },
        CollectorDeps,
        CollectorRegistry,
        OverviewIdentity,
    };
    use serde_json::json;
    use std::collections::BTreeMap;

    fn broker() -> Arc<StaticStatsClient> {
        Arc::new(
            StaticStatsClient::new()
                .with(
                    "overview",
                    json!({ "cluster_name": "c1", "node": "n1", "object_totals": { "queues": 3 } }),
                )
                .with("aliveness-test/%2F", json!({ "status": "ok" })),
        )
    }

    fn scraper(client: &Arc<StaticStatsClient>, modules: &[&str], timeout: Duration) -> Scraper {
        let deps = CollectorDeps::new(client.clone());
        let collectors = CollectorRegistry::builtin()
            .unwrap()
            .instantiate_all(modules.iter().copied(), &deps)
            .unwrap();
        Scraper::new(Arc::new(OverviewIdentity::new(client.clone())), collectors, timeout)
    }

    /// Samples without the duration series, which vary from run to run.
    fn stable_samples(families: &[MetricFamily]) -> BTreeMap<String, f64> {
        samples(families)
            .into_iter()
            .filter(|(key, _)| !key.starts_with("rabbitmq_module_scrape_duration_seconds"))
            .collect()
    }

    #[tokio::test]
    async fn successful_scrape_reports_every_module() {
        let client = broker();
        let families = scraper(&client, &["overview", "aliveness"], Duration::from_secs(5))
            .scrape()
            .await
            .unwrap();

        assert_eq!(
            stable_samples(&families),
            BTreeMap::from([
                (r#"rabbitmq_aliveness_info{error="",reason="",status="ok"}"#.to_string(), 1.0),
                (r#"rabbitmq_module_up{module="aliveness"}"#.to_string(), 1.0),
                (r#"rabbitmq_module_up{module="overview"}"#.to_string(), 1.0),
                (r#"rabbitmq_queues{cluster="c1",node="n1"}"#.to_string(), 3.0),
                ("rabbitmq_up".to_string(), 1.0),
            ])
        );
        assert!(samples(&families).contains_key(r#"rabbitmq_module_scrape_duration_seconds{module="overview"}"#));
    }

    #[tokio::test]
    async fn failing_module_does_not_hide_the_others() {
        let client = broker();
        client.fail("aliveness-test/%2F", "503 Service Unavailable");
        let families = scraper(&client, &["overview", "aliveness"], Duration::from_secs(5))
            .scrape()
            .await
            .unwrap();

        let published = stable_samples(&families);
        assert_eq!(published.get("rabbitmq_up"), Some(&1.0));
        assert_eq!(published.get(r#"rabbitmq_module_up{module="aliveness"}"#), Some(&0.0));
        assert_eq!(published.get(r#"rabbitmq_queues{cluster="c1",node="n1"}"#), Some(&3.0));
        assert!(published.keys().all(|key| !key.starts_with("rabbitmq_aliveness_info")));
    }

    #[tokio::test]
    async fn unresolved_identity_marks_broker_down() {
        let client = Arc::new(StaticStatsClient::new().with_failure("overview", "connection refused"));
        let families = scraper(&client, &["memory_local"], Duration::from_secs(5))
            .scrape()
            .await
            .unwrap();

        assert_eq!(
            stable_samples(&families),
            BTreeMap::from([
                (r#"rabbitmq_module_up{module="memory_local"}"#.to_string(), 0.0),
                ("rabbitmq_up".to_string(), 0.0),
            ])
        );
        assert_eq!(client.requests(), vec!["overview"]);
    }

    #[tokio::test]
    async fn overview_is_requested_once_per_scrape() {
        let client = broker();
        let families = scraper(&client, &["overview"], Duration::from_secs(5))
            .scrape()
            .await
            .unwrap();

        assert_eq!(
            stable_samples(&families).get(r#"rabbitmq_queues{cluster="c1",node="n1"}"#),
            Some(&3.0)
        );
        assert_eq!(client.requests(), vec!["overview"]);
    }

    #[tokio::test]
    async fn deadline_cancels_stalled_modules() {
        let client = broker();
        client.pend("aliveness-test/%2F");
        let scraper = scraper(&client, &["overview", "aliveness"], Duration::from_millis(100));

        let families = tokio::time::timeout(Duration::from_secs(5), scraper.scrape())
            .await
            .expect("scrape must finish once the deadline cancels it")
            .unwrap();

        let published = stable_samples(&families);
        assert_eq!(published.get(r#"rabbitmq_module_up{module="aliveness"}"#), Some(&0.0));
        assert_eq!(published.get(r#"rabbitmq_module_up{module="overview"}"#), Some(&1.0));
    }

    #[tokio::test]
    async fn render_produces_text_exposition() {
        let client = broker();
        let text = scraper(&client, &["overview"], Duration::from_secs(5))
            .render()
            .await
            .unwrap();

        assert!(text.contains("# TYPE rabbitmq_up gauge\nrabbitmq_up 1\n"));
        assert!(text.contains(r#"rabbitmq_queues{cluster="c1",node="n1"} 3"#));
    }

    #[test]
    fn up_requires_identity_and_one_module() {
        let module = |up| ModuleOutcome {
            name: "overview",
            up,
            elapsed: Duration::ZERO,
        };
        let report = |identity_resolved, modules| ScrapeReport {
            identity_resolved,
            modules,
        };

        assert!(report(true, vec![module(false), module(true)]).up());
        assert!(!report(true, vec![module(false)]).up());
        assert!(!report(true, vec![]).up());
        assert!(!report(false, vec![module(true)]).up());
    }
}
