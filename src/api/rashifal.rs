use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::error::ApiError;
use crate::rashifal::{self, Period, SignQuery, LOAD_FAILED_MESSAGE, NOT_FOUND_MESSAGE};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/rashifal", get(get_rashifal))
}

#[derive(Debug, Deserialize)]
struct RashifalQuery {
    sign: Option<String>,
    period: Option<String>,
}

async fn get_rashifal(State(state): State<AppState>, Query(query): Query<RashifalQuery>) -> Response {
    let Some(sign) = query.sign.filter(|s| !s.trim().is_empty()) else {
        return ApiError::BadRequest("Missing sign parameter".into()).into_response();
    };
    let period: Period = match query.period.as_deref().unwrap_or("daily").parse() {
        Ok(p) => p,
        Err(message) => return ApiError::BadRequest(message).into_response(),
    };

    let mut listing = match rashifal::listing(
        state.store.as_ref(),
        &state.client,
        state.config.rashifal_api_url.as_deref(),
        period,
    )
    .await
    {
        Ok(listing) => listing,
        Err(e) => {
            error!(error = %e, %period, "rashifal unavailable");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "rashifal": LOAD_FAILED_MESSAGE })),
            )
                .into_response();
        }
    };

    if sign == "all" {
        return Json(json!({
            "rashifal": listing.items,
            "time_period": period,
            "cached": listing.cached,
        }))
        .into_response();
    }

    let found = rashifal::backfill(
        state.store.as_ref(),
        &state.client,
        &state.config.rashifal_page_url,
        period,
        &mut listing,
        &SignQuery::resolve(&sign),
    )
    .await;
    match found {
        Some(item) => Json(json!({
            "rashifal": item.text,
            "time_period": period,
            "cached": listing.cached,
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "rashifal": NOT_FOUND_MESSAGE,
                "debug_sign": sign,
                "debug_period": period,
            })),
        )
            .into_response(),
    }
}
