use color_eyre::Result;
use eyre::Context as _;
use rabbit_exporter_collectors::{
    CollectorDeps,
    CollectorRegistry,
    OverviewIdentity,
};
use rabbit_exporter_config::Config;
use rabbit_exporter_http::{
    create_router,
    ManagementClient,
    Scraper,
};
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct App {
    config: Config,
    scraper: Arc<Scraper>,
}

impl App {
    /// Validates the configuration and instantiates the enabled collectors.
    ///
    /// An unknown or duplicated collector name aborts startup.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let client = Arc::new(ManagementClient::from_config(&config)?);
        let deps = CollectorDeps::new(client.clone())
            .with_exclusions(config.exclude_metrics.iter().cloned())
            .with_aliveness_vhost(config.aliveness_vhost.clone());

        let registry = CollectorRegistry::builtin()?;
        let collectors = registry.instantiate_all(config.enabled_exporters.iter().map(String::as_str), &deps)?;

        let scraper = Scraper::new(Arc::new(OverviewIdentity::new(client.clone())), collectors, config.timeout);
        info!(
            api = %client.api_root(),
            modules = ?scraper.modules(),
            excluded = config.exclude_metrics.len(),
            timeout = ?config.timeout,
            "Exporter configured"
        );

        Ok(Self {
            config,
            scraper: Arc::new(scraper),
        })
    }

    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_address)
            .await
            .wrap_err_with(|| format!("Failed to listen on {}", self.config.listen_address))?;
        info!("listening on {}", self.config.listen_address);

        axum::serve(listener, create_router(self.scraper))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Exporter stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
