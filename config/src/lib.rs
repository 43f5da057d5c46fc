#[macro_use]
extern crate tracing;

mod args;
mod config_dir;
pub mod duration;

pub use args::{
    version,
    Args,
};
pub use config_dir::get_config_dir;
use eyre::{
    ensure,
    Result,
};
use serde::Deserialize;
use std::{
    collections::BTreeSet,
    fmt,
    net::SocketAddr,
    path::Path,
    time::Duration,
};

/// Collectors that publish the same metric names and must not run together.
const CONFLICTING_EXPORTERS: &[(&str, &str)] = &[("memory", "memory_local")];

#[derive(Clone, Deserialize, PartialEq)]
pub struct Config {
    pub rabbit_url: url::Url,
    pub rabbit_user: String,
    pub rabbit_password: String,
    pub listen_address: SocketAddr,
    pub enabled_exporters: Vec<String>,
    #[serde(default)]
    pub exclude_metrics: Vec<String>,
    pub aliveness_vhost: String,
    #[serde(deserialize_with = "duration::deserialize")]
    pub timeout: Duration,
    pub log_level: String,
}

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

impl Default for Config {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("rabbit_url", &self.rabbit_url.as_str())
            .field("rabbit_user", &self.rabbit_user)
            .field("rabbit_password", &"<redacted>")
            .field("listen_address", &self.listen_address)
            .field("enabled_exporters", &self.enabled_exporters)
            .field("exclude_metrics", &self.exclude_metrics)
            .field("aliveness_vhost", &self.aliveness_vhost)
            .field("timeout", &self.timeout)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Layers the embedded defaults, the config file and the command line.
    ///
    /// The config file is `--config-file` when given (and then must exist),
    /// otherwise the optional `config.yaml` in the config directory.
    pub fn new(args: Args) -> Result<Self, config::ConfigError> {
        Self::load(args, &get_config_dir())
    }

    fn load(args: Args, config_dir: &Path) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml));

        builder = match &args.config_file {
            Some(path) => builder.add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Yaml)
                    .required(true),
            ),
            None => builder.add_source(
                config::File::from(config_dir.join("config.yaml"))
                    .format(config::FileFormat::Yaml)
                    .required(false),
            ),
        };

        builder = builder.add_source(args);

        let cfg: Self = builder.build()?.try_deserialize()?;
        debug!(config = ?cfg, "Loaded configuration");

        Ok(cfg)
    }

    /// Rejects settings the exporter cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.enabled_exporters.is_empty(),
            "At least one exporter must be enabled"
        );
        ensure!(!self.timeout.is_zero(), "The scrape timeout must be greater than zero");
        ensure!(
            matches!(self.rabbit_url.scheme(), "http" | "https"),
            "Unsupported management API scheme {:?}, expected http or https",
            self.rabbit_url.scheme()
        );

        let mut seen = BTreeSet::new();
        for name in &self.enabled_exporters {
            ensure!(seen.insert(name.as_str()), "Exporter {name:?} is enabled twice");
        }
        for (a, b) in CONFLICTING_EXPORTERS {
            ensure!(
                !(seen.contains(a) && seen.contains(b)),
                "Exporters {a:?} and {b:?} publish the same metrics and cannot be enabled together"
            );
        }
        Ok(())
    }
}
