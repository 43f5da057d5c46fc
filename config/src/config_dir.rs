use directories::ProjectDirs;
use std::{
    env,
    path::PathBuf,
};

lazy_static::lazy_static! {
    static ref CONFIG_FOLDER: Option<PathBuf> = env::var("RABBIT_EXPORTER_CONFIG").ok().map(PathBuf::from);
}

/// Directory searched for `config.yaml` when no `--config-file` is given.
///
/// `RABBIT_EXPORTER_CONFIG` takes precedence over the platform's local config
/// directory.
pub fn get_config_dir() -> PathBuf {
    CONFIG_FOLDER
        .clone()
        .or_else(|| project_directory().map(|dirs| dirs.config_local_dir().to_path_buf()))
        .unwrap_or_else(|| PathBuf::from(".").join(".config"))
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "rabbitmq", "rabbit-exporter")
}
