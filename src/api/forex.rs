use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::forex::{self, ExchangeRate, NrbDay};
use crate::state::AppState;

const DEFAULT_HISTORY_DAYS: i64 = 7;
const MAX_HISTORY_DAYS: i64 = 90;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/forex/rates", get(rates))
        .route("/forex/history", get(history))
        .route("/forex/convert", get(convert))
}

async fn fetch_window(state: &AppState, days: i64) -> ApiResult<Vec<NrbDay>> {
    let (from, to) = forex::window(Utc::now().date_naive(), days);
    forex::fetch_days(&state.client, &state.config.nrb_forex_url, from, to).await
}

/// Today's rates with trends against the previous published day.
async fn current_rates(state: &AppState) -> ApiResult<(String, Vec<ExchangeRate>)> {
    let days = fetch_window(state, 2).await?;
    let today = days
        .first()
        .ok_or_else(|| ApiError::UpstreamPayload("no forex data published".into()))?;
    Ok((today.date.clone(), forex::rates_with_trend(today, days.get(1))))
}

async fn rates(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let (date, rates) = current_rates(&state).await?;
    Ok(Json(json!({ "date": date, "rates": rates })))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    currency: Option<String>,
    days: Option<i64>,
}

async fn history(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> ApiResult<Json<Value>> {
    let currency = query.currency.as_deref().unwrap_or("USD").to_uppercase();
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS).clamp(1, MAX_HISTORY_DAYS);

    let published = fetch_window(&state, days).await?;
    let series = forex::history_series(&published, &currency);
    let stats = forex::series_stats(&series);
    Ok(Json(json!({ "currency": currency, "series": series, "stats": stats })))
}

#[derive(Debug, Deserialize)]
struct ConvertQuery {
    amount: Option<f64>,
    from: Option<String>,
    to: Option<String>,
}

async fn convert(State(state): State<AppState>, Query(query): Query<ConvertQuery>) -> ApiResult<Json<Value>> {
    let (Some(amount), Some(from), Some(to)) = (query.amount, query.from, query.to) else {
        return Err(ApiError::BadRequest("amount, from and to are required".into()));
    };
    let (from, to) = (from.to_uppercase(), to.to_uppercase());
    let result = if from == to {
        amount
    } else {
        let (_, rates) = current_rates(&state).await?;
        forex::convert(&rates, amount, &from, &to)?
    };
    Ok(Json(json!({ "amount": amount, "from": from, "to": to, "result": result })))
}
