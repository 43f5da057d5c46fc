//! Serde helper reading `Duration`s from humantime strings (`10s`, `1m 30s`).

use serde::{
    Deserialize,
    Deserializer,
};
use std::time::Duration;

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(|e| serde::de::Error::custom(format!("Invalid duration '{raw}': {e}")))
}
