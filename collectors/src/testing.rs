//! In-memory management API for tests.

use crate::client::{
    FetchFuture,
    StatsClient,
};
use eyre::{
    bail,
    eyre,
};
use prometheus::proto::MetricFamily;
use serde_json::Value;
use std::{
    collections::{
        BTreeMap,
        HashMap,
    },
    sync::{
        Mutex,
        PoisonError,
    },
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
enum Reply {
    Json(Value),
    Failure(String),
    /// Never answers, the request only ends through cancellation.
    Pending,
}

/// Serves canned JSON replies keyed by endpoint path.
///
/// Replies can be swapped between scrapes through `&self`, which lets a test
/// drive several collection cycles against one shared client.
#[derive(Debug, Default)]
pub struct StaticStatsClient {
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<String>>,
}

impl StaticStatsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, path: &str, reply: Value) -> Self {
        self.set(path, reply);
        self
    }

    pub fn with_failure(self, path: &str, message: &str) -> Self {
        self.insert(path, Reply::Failure(message.to_string()));
        self
    }

    pub fn with_pending(self, path: &str) -> Self {
        self.insert(path, Reply::Pending);
        self
    }

    pub fn set(&self, path: &str, reply: Value) {
        self.insert(path, Reply::Json(reply));
    }

    pub fn fail(&self, path: &str, message: &str) {
        self.insert(path, Reply::Failure(message.to_string()));
    }

    pub fn pend(&self, path: &str) {
        self.insert(path, Reply::Pending);
    }

    pub fn remove(&self, path: &str) {
        self.replies.lock().unwrap_or_else(PoisonError::into_inner).remove(path);
    }

    /// Paths requested so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn insert(&self, path: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), reply);
    }
}

impl StatsClient for StaticStatsClient {
    fn fetch_json<'a>(&'a self, path: &'a str, cancel: &'a CancellationToken) -> FetchFuture<'a, Value> {
        Box::pin(async move {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(path.to_string());
            let reply = self
                .replies
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(path)
                .cloned();
            match reply {
                Some(Reply::Json(value)) => Ok(value),
                Some(Reply::Failure(message)) => Err(eyre!(message)),
                Some(Reply::Pending) => {
                    cancel.cancelled().await;
                    bail!("Request to {path} cancelled")
                }
                None => bail!("404 Not Found: {path}"),
            }
        })
    }
}

/// Flattens gathered families into `name{labels} -> value` with labels sorted
/// by name.
pub fn samples(families: &[MetricFamily]) -> BTreeMap<String, f64> {
    let mut samples = BTreeMap::new();
    for family in families {
        for metric in family.get_metric() {
            let mut labels = metric
                .get_label()
                .iter()
                .map(|pair| format!("{}=\"{}\"", pair.get_name(), pair.get_value()))
                .collect::<Vec<_>>();
            labels.sort();
            let key = if labels.is_empty() {
                family.get_name().to_string()
            } else {
                format!("{}{{{}}}", family.get_name(), labels.join(","))
            };
            samples.insert(key, metric.get_gauge().get_value());
        }
    }
    samples
}
