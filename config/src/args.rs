use clap::Parser;
use std::path::PathBuf;

/// Prometheus exporter for the RabbitMQ management API
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version = version(), about, long_about = None)]
pub struct Args {
    /// Config file used instead of `config.yaml` in the config directory.
    #[arg(long, value_name = "FILE", env = "RABBIT_EXPORTER_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Base URL of the management plugin, e.g. `http://localhost:15672`.
    #[arg(long, value_name = "URL", env = "RABBIT_URL")]
    pub rabbit_url: Option<String>,

    #[arg(long, value_name = "USER", env = "RABBIT_USER")]
    pub rabbit_user: Option<String>,

    #[arg(long, value_name = "PASSWORD", env = "RABBIT_PASSWORD", hide_env_values = true)]
    pub rabbit_password: Option<String>,

    /// Address the `/metrics` endpoint listens on.
    #[arg(long, value_name = "ADDR", env = "RABBIT_EXPORTER_LISTEN_ADDRESS")]
    pub listen_address: Option<String>,

    /// Comma separated collectors to enable.
    #[arg(long, value_name = "NAMES", value_delimiter = ',', env = "RABBIT_EXPORTERS")]
    pub enabled_exporters: Vec<String>,

    /// Comma separated stat keys that are never published, e.g. `memory.code`.
    #[arg(long, value_name = "KEYS", value_delimiter = ',', env = "RABBIT_EXCLUDE_METRICS")]
    pub exclude_metrics: Vec<String>,

    /// Virtual host probed by the `aliveness` collector.
    #[arg(long, value_name = "VHOST", env = "RABBIT_ALIVENESS_VHOST")]
    pub aliveness_vhost: Option<String>,

    /// Deadline of one scrape, e.g. `10s` or `1500ms`.
    #[arg(long, value_name = "DURATION", env = "RABBIT_TIMEOUT")]
    pub timeout: Option<String>,

    /// Default log filter, overridden by `RUST_LOG`.
    #[arg(long, value_name = "FILTER", env = "RABBIT_EXPORTER_LOG_LEVEL")]
    pub log_level: Option<String>,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();
            let scalars = [
                ("rabbit_url", &self.rabbit_url),
                ("rabbit_user", &self.rabbit_user),
                ("rabbit_password", &self.rabbit_password),
                ("listen_address", &self.listen_address),
                ("aliveness_vhost", &self.aliveness_vhost),
                ("timeout", &self.timeout),
                ("log_level", &self.log_level),
            ];
            for (key, value) in scalars {
                if let Some(value) = value {
                    cache.insert(key.to_string(), value.clone().into());
                }
            }
            // An empty list means the flag was not given.
            if !self.enabled_exporters.is_empty() {
                cache.insert("enabled_exporters".to_string(), self.enabled_exporters.clone().into());
            }
            if !self.exclude_metrics.is_empty() {
                cache.insert("exclude_metrics".to_string(), self.exclude_metrics.clone().into());
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let version = clap::crate_version!();
    let author = clap::crate_authors!();
    let config_dir_path = crate::get_config_dir().display().to_string();

    format!(
        "\
{version}

Authors: {author}

Config directory: {config_dir_path}"
    )
}
