use eyre::{
    bail,
    Context as _,
    Result,
};
use rabbit_exporter_collectors::{
    FetchFuture,
    StatsClient,
};
use rabbit_exporter_config::Config;
use reqwest::{
    header::ACCEPT,
    Client as HttpClient,
};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// `StatsClient` talking to the management plugin over HTTP(S).
///
/// Every path is resolved against `<base>/api/` and sent with basic auth.
#[derive(Clone)]
pub struct ManagementClient {
    http: HttpClient,
    api_root: Url,
    user: String,
    password: String,
}

impl ManagementClient {
    pub fn new(base: &Url, user: impl Into<String>, password: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let api_root = base.join("api/").context("Failed to build management API root")?;
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_root,
            user: user.into(),
            password: password.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.rabbit_url,
            &config.rabbit_user,
            &config.rabbit_password,
            config.timeout,
        )
    }

    pub fn api_root(&self) -> &Url {
        &self.api_root
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_root
            .join(path)
            .wrap_err_with(|| format!("Invalid endpoint path {path:?}"))
    }

    async fn get(&self, url: Url) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.user, Some(&self.password))
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

impl StatsClient for ManagementClient {
    fn fetch_json<'a>(&'a self, path: &'a str, cancel: &'a CancellationToken) -> FetchFuture<'a, Value> {
        Box::pin(async move {
            let url = self.endpoint(path)?;
            trace!(%url, "Requesting management API");
            tokio::select! {
                _ = cancel.cancelled() => bail!("Request to {path} cancelled"),
                reply = self.get(url) => reply.wrap_err_with(|| format!("Request to {path} failed")),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{
            HeaderMap,
            StatusCode,
        },
        routing::get,
        Json,
        Router,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::net::TcpListener;

    /// Serves a fake management API on an ephemeral port.
    async fn serve_fake_api() -> Url {
        async fn overview(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
            // "guest:guest"
            match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                Some("Basic Z3Vlc3Q6Z3Vlc3Q=") => Ok(Json(json!({ "cluster_name": "c1", "node": "n1" }))),
                _ => Err(StatusCode::UNAUTHORIZED),
            }
        }

        async fn memory(Path(node): Path<String>) -> Json<Value> {
            Json(json!({ "memory": { "node": node, "atom": 42 } }))
        }

        async fn aliveness(Path(vhost): Path<String>) -> Json<Value> {
            Json(json!({ "status": "ok", "vhost": vhost }))
        }

        async fn stalled() -> Json<Value> {
            std::future::pending::<()>().await;
            Json(json!({}))
        }

        let app = Router::new()
            .route("/mgmt/api/overview", get(overview))
            .route("/mgmt/api/nodes/{node}/memory", get(memory))
            .route("/mgmt/api/aliveness-test/{vhost}", get(aliveness))
            .route("/mgmt/api/stalled", get(stalled));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        format!("http://{address}/mgmt").parse().unwrap()
    }

    fn client(base: &Url, password: &str) -> ManagementClient {
        ManagementClient::new(base, "guest", password, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn api_root_gets_trailing_slash() {
        let base: Url = "http://broker:15672/mgmt".parse().unwrap();
        assert_eq!(client(&base, "guest").api_root().as_str(), "http://broker:15672/mgmt/api/");

        let base: Url = "http://broker:15672".parse().unwrap();
        assert_eq!(client(&base, "guest").api_root().as_str(), "http://broker:15672/api/");
    }

    #[tokio::test]
    async fn fetches_with_basic_auth() {
        let base = serve_fake_api().await;
        let reply = client(&base, "guest")
            .fetch_json("overview", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, json!({ "cluster_name": "c1", "node": "n1" }));
    }

    #[tokio::test]
    async fn http_errors_fail_the_request() {
        let base = serve_fake_api().await;
        let err = client(&base, "wrong")
            .fetch_json("overview", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Request to overview failed");
        assert!(format!("{err:?}").contains("401"));
    }

    #[tokio::test]
    async fn node_paths_and_encoded_vhosts_resolve() {
        let base = serve_fake_api().await;
        let client = client(&base, "guest");
        let cancel = CancellationToken::new();

        let memory = client.fetch_map("nodes/rabbit@n1/memory", &cancel).await.unwrap();
        assert_eq!(memory.get("memory.atom"), Some(42.0));

        let aliveness = client.fetch_structured("aliveness-test/%2F", &cancel).await.unwrap();
        assert_eq!(aliveness.get_string("vhost"), Some("/"));
    }

    #[tokio::test]
    async fn cancellation_abandons_request() {
        let base = serve_fake_api().await;
        let client = client(&base, "guest");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = client.fetch_json("stalled", &cancel).await.unwrap_err();
        assert_eq!(err.to_string(), "Request to stalled cancelled");
    }
}
