use crate::{
    error::AppError,
    scraper::Scraper,
};
use axum::{
    extract::State,
    http::header,
    response::{
        Html,
        IntoResponse,
        Response,
    },
    routing::get,
    Router,
};
use prometheus::{
    Encoder as _,
    TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub scraper: Arc<Scraper>,
}

pub fn create_router(scraper: Arc<Scraper>) -> Router {
    let state = AppState { scraper };

    Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn metrics(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = state.scraper.render().await.map_err(AppError::Scrape)?;
    Ok(([(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())], body).into_response())
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html><head><title>RabbitMQ Exporter</title></head><body>\
         <h1>RabbitMQ Exporter</h1><p>Modules: {}</p><p><a href=\"/metrics\">Metrics</a></p>\
         </body></html>",
        state.scraper.modules().join(", ")
    ))
}

async fn healthz() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{
            to_bytes,
            Body,
        },
        http::{
            Request,
            StatusCode,
        },
    };
    use pretty_assertions::assert_eq;
    use rabbit_exporter_collectors::{
        testing::StaticStatsClient,
        CollectorDeps,
        CollectorRegistry,
        OverviewIdentity,
    };
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    fn router() -> Router {
        let client = Arc::new(StaticStatsClient::new().with(
            "overview",
            json!({ "cluster_name": "c1", "node": "n1", "queue_totals": { "messages_ready": 5 } }),
        ));
        let collectors = CollectorRegistry::builtin()
            .unwrap()
            .instantiate_all(["overview"], &CollectorDeps::new(client.clone()))
            .unwrap();
        let scraper = Scraper::new(
            Arc::new(OverviewIdentity::new(client)),
            collectors,
            Duration::from_secs(5),
        );
        create_router(Arc::new(scraper))
    }

    async fn send(router: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|value| value.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn metrics_serves_text_exposition() {
        let (status, content_type, body) = send(router(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/plain; version=0.0.4"));
        assert!(body.contains("rabbitmq_up 1"));
        assert!(body.contains(r#"rabbitmq_queue_messages_ready_global{cluster="c1",node="n1"} 5"#));
    }

    #[tokio::test]
    async fn healthz_answers_without_scraping() {
        let (status, _, body) = send(router(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn index_lists_modules() {
        let (status, _, body) = send(router(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Modules: overview"));
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (status, _, _) = send(router(), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn scrape_errors_become_json() {
        let response = AppError::Scrape(eyre::eyre!("encoder failed")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&body).unwrap(),
            json!({ "error": "Collecting metrics failed: encoder failed" })
        );
    }
}
