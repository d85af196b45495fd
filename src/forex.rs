//! Nepal Rastra Bank exchange rates: daily table with trends, a sell-rate
//! history series with summary statistics, and an NPR-pivot converter.

use chrono::{Duration, NaiveDate};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
struct NrbEnvelope {
    data: Option<NrbData>,
}

#[derive(Debug, Deserialize)]
struct NrbData {
    #[serde(default)]
    payload: Vec<NrbDay>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NrbDay {
    pub date: String,
    #[serde(default)]
    pub rates: Vec<NrbRate>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NrbRate {
    pub currency: NrbCurrency,
    #[serde(deserialize_with = "lenient_f64")]
    pub buy: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub sell: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NrbCurrency {
    pub iso3: String,
    pub name: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub unit: f64,
}

/// NRB publishes numbers as strings (`"133.50"`).
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        serde_json::Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!("expected number, got {}", other))),
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Same,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExchangeRate {
    pub currency: String,
    pub name: String,
    pub unit: f64,
    pub buy: f64,
    pub sell: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SeriesPoint {
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Default)]
pub struct SeriesStats {
    pub peak: f64,
    pub average: f64,
    pub momentum: f64,
    pub change_percent: f64,
}

/// Fetch every published day in `[from, to]`, newest first as NRB returns it.
pub async fn fetch_days(
    client: &Client,
    base_url: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<NrbDay>, ApiError> {
    let from = from.format("%Y-%m-%d").to_string();
    let to = to.format("%Y-%m-%d").to_string();
    let envelope: NrbEnvelope = client
        .get(base_url)
        .query(&[
            ("from", from.as_str()),
            ("to", to.as_str()),
            ("per_page", "100"),
            ("page", "1"),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    match envelope.data {
        Some(data) if !data.payload.is_empty() => Ok(data.payload),
        _ => Err(ApiError::UpstreamPayload(
            "invalid forex API response format".into(),
        )),
    }
}

/// Today's rates, each tagged with its move against the previous day's sell.
pub fn rates_with_trend(today: &NrbDay, yesterday: Option<&NrbDay>) -> Vec<ExchangeRate> {
    today
        .rates
        .iter()
        .map(|r| {
            let prev = yesterday.and_then(|y| {
                y.rates
                    .iter()
                    .find(|p| p.currency.iso3 == r.currency.iso3)
            });
            let trend = match prev.map(|p| r.sell - p.sell) {
                Some(diff) if diff > 0.0 => Trend::Up,
                Some(diff) if diff < 0.0 => Trend::Down,
                _ => Trend::Same,
            };
            ExchangeRate {
                currency: r.currency.iso3.clone(),
                name: r.currency.name.clone(),
                unit: r.currency.unit,
                buy: r.buy,
                sell: r.sell,
                trend,
            }
        })
        .collect()
}

/// Sell-rate series for `iso3`, oldest first, skipping days without it.
pub fn history_series(days: &[NrbDay], iso3: &str) -> Vec<SeriesPoint> {
    let mut series: Vec<SeriesPoint> = days
        .iter()
        .filter_map(|day| {
            let rate = day.rates.iter().find(|r| r.currency.iso3 == iso3)?;
            Some(SeriesPoint {
                date: day.date.clone(),
                value: rate.sell,
            })
        })
        .collect();
    series.reverse();
    series
}

pub fn series_stats(series: &[SeriesPoint]) -> SeriesStats {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return SeriesStats::default();
    };
    let peak = series.iter().map(|p| p.value).fold(f64::MIN, f64::max);
    let average = series.iter().map(|p| p.value).sum::<f64>() / series.len() as f64;
    let momentum = last.value - first.value;
    let base = if first.value == 0.0 { 1.0 } else { first.value };
    SeriesStats {
        peak,
        average,
        momentum,
        change_percent: momentum * 100.0 / base,
    }
}

/// Convert through NPR: `from` is sold to NPR at its sell rate, NPR buys
/// `to` at its buy rate.
pub fn convert(rates: &[ExchangeRate], amount: f64, from: &str, to: &str) -> Result<f64, ApiError> {
    if from.eq_ignore_ascii_case(to) {
        return Ok(amount);
    }
    let find = |code: &str| {
        rates
            .iter()
            .find(|r| r.currency.eq_ignore_ascii_case(code))
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown currency: {}", code)))
    };

    let npr = if from.eq_ignore_ascii_case("NPR") {
        amount
    } else {
        let rate = find(from)?;
        amount * rate.sell / rate.unit
    };
    if to.eq_ignore_ascii_case("NPR") {
        return Ok(npr);
    }
    let rate = find(to)?;
    if rate.buy == 0.0 {
        return Err(ApiError::UpstreamPayload(format!("no buy rate for {}", rate.currency)));
    }
    Ok(npr * rate.unit / rate.buy)
}

/// `[today - days, today]`.
pub fn window(today: NaiveDate, days: i64) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(days), today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn day(date: &str, usd_sell: &str, inr_sell: Option<&str>) -> serde_json::Value {
        let mut rates = vec![json!({
            "currency": { "iso3": "USD", "name": "U.S. Dollar", "unit": 1 },
            "buy": "133.00", "sell": usd_sell
        })];
        if let Some(inr) = inr_sell {
            rates.push(json!({
                "currency": { "iso3": "INR", "name": "Indian Rupee", "unit": 100 },
                "buy": "160.00", "sell": inr
            }));
        }
        json!({ "date": date, "rates": rates })
    }

    fn parse(days: Vec<serde_json::Value>) -> Vec<NrbDay> {
        serde_json::from_value(json!(days)).unwrap()
    }

    #[test]
    fn test_trend_against_previous_day() {
        let days = parse(vec![
            day("2025-01-03", "134.10", Some("160.15")),
            day("2025-01-02", "133.90", None),
        ]);
        let rates = rates_with_trend(&days[0], days.get(1));
        assert_eq!(rates[0].trend, Trend::Up);
        assert_eq!(rates[0].sell, 134.10);
        assert_eq!(rates[1].trend, Trend::Same);
        assert_eq!(rates[1].unit, 100.0);

        let down = parse(vec![day("b", "133.00", None), day("a", "133.50", None)]);
        assert_eq!(rates_with_trend(&down[0], down.get(1))[0].trend, Trend::Down);
    }

    #[test]
    fn test_history_is_oldest_first_and_skips_gaps() {
        let days = parse(vec![
            day("2025-01-03", "134.0", Some("160.2")),
            day("2025-01-02", "133.0", None),
            day("2025-01-01", "132.0", Some("160.0")),
        ]);
        let series = history_series(&days, "INR");
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, "2025-01-01");
        assert_eq!(series[1].value, 160.2);
    }

    #[test]
    fn test_series_stats() {
        let series = vec![
            SeriesPoint { date: "a".into(), value: 100.0 },
            SeriesPoint { date: "b".into(), value: 110.0 },
            SeriesPoint { date: "c".into(), value: 105.0 },
        ];
        let stats = series_stats(&series);
        assert_eq!(stats.peak, 110.0);
        assert_eq!(stats.average, 105.0);
        assert_eq!(stats.momentum, 5.0);
        assert_eq!(stats.change_percent, 5.0);
        assert_eq!(series_stats(&[]), SeriesStats::default());

        let from_zero = vec![
            SeriesPoint { date: "a".into(), value: 0.0 },
            SeriesPoint { date: "b".into(), value: 2.0 },
        ];
        assert_eq!(series_stats(&from_zero).change_percent, 200.0);
    }

    #[test]
    fn test_convert() {
        let days = parse(vec![day("2025-01-03", "134.00", Some("160.00"))]);
        let rates = rates_with_trend(&days[0], None);

        assert_eq!(convert(&rates, 42.5, "USD", "USD").unwrap(), 42.5);
        assert_eq!(convert(&rates, 7.0, "XYZ", "xyz").unwrap(), 7.0);
        assert_eq!(convert(&rates, 2.0, "USD", "NPR").unwrap(), 268.0);
        assert_eq!(convert(&rates, 266.0, "NPR", "USD").unwrap(), 2.0);
        // 1 USD -> 134 NPR -> 134 * 100 / 160 INR
        assert_eq!(convert(&rates, 1.0, "USD", "INR").unwrap(), 83.75);
        assert!(matches!(
            convert(&rates, 1.0, "USD", "GBP"),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_days_queries_window() {
        let router = Router::new().route(
            "/rates",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("from").map(String::as_str), Some("2025-01-01"));
                assert_eq!(q.get("per_page").map(String::as_str), Some("100"));
                Json(json!({ "data": { "payload": [day("2025-01-03", "134.0", None)] } }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let today = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();
        let (from, to) = window(today, 2);
        let days = fetch_days(&Client::new(), &format!("http://{}/rates", addr), from, to)
            .await
            .unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].rates[0].sell, 134.0);
    }
}
