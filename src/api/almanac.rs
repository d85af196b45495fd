//! Calendar, date conversion and Panchang routes over the static almanac.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{FixedOffset, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::calendar::{self, BsDate, Conversion, MonthGrid};
use crate::error::{ApiError, ApiResult};
use crate::miti;
use crate::panchang::{self, DayView};
use crate::state::AppState;

/// Nepal Standard Time, UTC+05:45.
const NPT_OFFSET_SECS: i32 = 5 * 3600 + 45 * 60;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/convert/bs-to-ad", get(bs_to_ad))
        .route("/convert/ad-to-bs", get(ad_to_bs))
        .route("/calendar/{year}/{month}", get(calendar_month))
        .route("/miti/{year}/{month}", get(miti_month))
        .route("/panchang", get(panchang_day))
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

fn required_date(query: &DateQuery) -> ApiResult<&str> {
    query
        .date
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::BadRequest("date is required".into()))
}

async fn bs_to_ad(State(state): State<AppState>, Query(query): Query<DateQuery>) -> ApiResult<Json<Conversion>> {
    let bs: BsDate = required_date(&query)?.parse()?;
    Ok(Json(calendar::bs_to_ad(&state.miti, bs).await?))
}

async fn ad_to_bs(State(state): State<AppState>, Query(query): Query<DateQuery>) -> ApiResult<Json<Conversion>> {
    let ad = calendar::parse_ad_date(required_date(&query)?)?;
    Ok(Json(calendar::ad_to_bs(&state.miti, ad).await?))
}

async fn calendar_month(
    State(state): State<AppState>,
    Path((year, month)): Path<(i32, u32)>,
) -> ApiResult<Json<MonthGrid>> {
    Ok(Json(calendar::month_grid(&state.miti, year, month).await?))
}

async fn miti_month(State(state): State<AppState>, Path((year, month)): Path<(i32, u32)>) -> ApiResult<Json<Value>> {
    let days = state.miti.month(year, month).await?;
    let events = miti::month_events(&days);
    Ok(Json(json!({
        "year": year,
        "month": month,
        "days": days,
        "events": events.events,
        "holidays": events.holidays,
    })))
}

#[derive(Debug, Deserialize)]
struct PanchangQuery {
    date: Option<String>,
    lang: Option<String>,
}

fn today_in_nepal() -> ApiResult<NaiveDate> {
    let offset = FixedOffset::east_opt(NPT_OFFSET_SECS)
        .ok_or_else(|| ApiError::Internal("invalid Nepal time offset".into()))?;
    Ok(Utc::now().with_timezone(&offset).date_naive())
}

async fn panchang_day(State(state): State<AppState>, Query(query): Query<PanchangQuery>) -> ApiResult<Json<DayView>> {
    let bs: BsDate = match query.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(date) => date.parse()?,
        None => calendar::ad_to_bs(&state.miti, today_in_nepal()?).await?.bs.parse()?,
    };

    let entry = state.miti.day(bs.year, bs.month, bs.day).await?;
    let mut view = panchang::map_day(&entry);
    panchang::enrich(&mut view, &state.client, &state.config.panchang_api_url, entry.ad_date()).await;

    match query.lang.as_deref() {
        Some("ne") => Ok(Json(panchang::to_nepali(view))),
        _ => Ok(Json(view)),
    }
}
