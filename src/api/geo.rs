use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::geo::{self, Location};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/geo/locate", get(locate))
        .route("/geo/search", get(search))
}

/// Never fails: the last resort is the Ujjain default.
async fn locate(State(state): State<AppState>) -> Json<Location> {
    Json(geo::locate(&state.client, &state.geo).await)
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    query: Option<String>,
}

async fn search(State(state): State<AppState>, Query(params): Query<SearchQuery>) -> ApiResult<Json<Location>> {
    let query = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("query is required".into()))?;
    Ok(Json(geo::search(&state.client, &state.geo, query).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{app_with, get_json, offline_config};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_search_requires_query() {
        let (status, body) = get_json(app_with(offline_config()).0, "/api/geo/search?query=%20").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "query is required");
    }
}
