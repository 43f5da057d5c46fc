use axum::{
    http::StatusCode,
    response::{
        IntoResponse,
        Response,
    },
};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Collecting metrics failed: {0}")]
    Scrape(eyre::Report),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = ?self, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
