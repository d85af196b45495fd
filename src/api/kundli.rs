use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::kundli::{self, KundliRecord, SaveKundliRequest};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/kundli-data", get(user_kundli_data))
        .route("/save-kundli", post(save_kundli))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KundliQuery {
    user_id: Option<String>,
}

async fn user_kundli_data(
    State(state): State<AppState>,
    Query(query): Query<KundliQuery>,
) -> ApiResult<Json<Vec<KundliRecord>>> {
    let user_id = kundli::validate_user_id(query.user_id.as_deref())?;
    Ok(Json(kundli::records_for_user(state.store.as_ref(), user_id).await))
}

async fn save_kundli(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SaveKundliRequest>,
) -> ApiResult<Json<Value>> {
    // A malformed body is a 400 even without credentials; the owner is
    // filled in once the token checks out.
    let mut row = body.into_row("")?;

    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = kundli::bearer_token(header)
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".into()))?;
    let user = state
        .store
        .user_for_token(token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid authentication".into()))?;

    row.user_id = user.id.clone();
    let saved = state.store.insert_kundli_row(&row).await?;
    info!(user_id = %user.id, kundli_id = %saved.id, "kundli saved");

    Ok(Json(json!({
        "success": true,
        "message": "Kundli saved successfully",
        "record": KundliRecord::from(saved),
    })))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{app_with, get_json, offline_config, post_json, send};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    fn birth() -> Value {
        json!({ "name": "Sita", "date": "1995-11-30", "time": "14:20", "lat": 27.7, "lon": 85.3, "city": "Lalitpur" })
    }

    #[tokio::test]
    async fn test_unknown_user_gets_empty_list() {
        let (app, _) = app_with(offline_config());
        let (status, body) = get_json(app, "/api/user/kundli-data?userId=nobody-here").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_user_id_validation() {
        let (app, _) = app_with(offline_config());
        let (status, body) = get_json(app, "/api/user/kundli-data").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "User ID required");

        let (app, _) = app_with(offline_config());
        let (status, body) = get_json(app, "/api/user/kundli-data?userId=ab").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid user ID");
    }

    #[tokio::test]
    async fn test_save_requires_token() {
        let (app, _) = app_with(offline_config());
        let (status, _, body) = send(app, post_json("/api/save-kundli", &birth())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "Authentication required");

        let (app, _) = app_with(offline_config());
        let mut req = post_json("/api/save-kundli", &birth());
        req.headers_mut().insert("authorization", "Bearer forged".parse().unwrap());
        let (status, _, _) = send(app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_save_then_fetch() {
        let (app, db) = app_with(offline_config());
        db.add_auth_token("tok-1", "user-77", Some("sita@example.com")).unwrap();

        let mut req = post_json("/api/save-kundli", &birth());
        req.headers_mut().insert("authorization", "Bearer tok-1".parse().unwrap());
        let (status, _, body) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["record"]["birth_time"], "14:20:00");

        let (status, list) = get_json(app, "/api/user/kundli-data?userId=user-77").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["city"], "Lalitpur");
    }

    #[tokio::test]
    async fn test_save_reports_missing_fields() {
        let (app, db) = app_with(offline_config());
        db.add_auth_token("tok-1", "user-77", None).unwrap();
        let mut req = post_json("/api/save-kundli", &json!({ "name": "Sita" }));
        req.headers_mut().insert("authorization", "Bearer tok-1".parse().unwrap());
        let (status, _, body) = send(app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "Missing required fields: name, date, time, lat, lon");
    }

    #[tokio::test]
    async fn test_missing_fields_reported_before_auth() {
        let (app, _) = app_with(offline_config());
        let (status, _, body) = send(app, post_json("/api/save-kundli", &json!({ "name": "Sita" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "Missing required fields: name, date, time, lat, lon");
    }
}
