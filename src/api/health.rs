use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(get_health))
}

/// `{"status": "ok", "version": "..."}` for load balancers and monitors.
pub async fn get_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{app_with, get_json, offline_config};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_reports_version() {
        let (app, _) = app_with(offline_config());
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
