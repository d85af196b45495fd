//! Saved birth charts: normalisation of `kundli_data` rows and validation of
//! new ones.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::db::models::{KundliRow, NewKundliRow};
use crate::db::Store;
use crate::error::ApiError;

/// A kundli record in the shape the frontend consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KundliRecord {
    pub id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub birth_date: String,
    pub birth_time: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<f64>,
    pub city: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub gotra: Option<String>,
    pub nawran_name: Option<String>,
    pub kundli_data: Value,
    pub is_active: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<KundliRow> for KundliRecord {
    fn from(row: KundliRow) -> Self {
        Self {
            birth_date: format!("{}-{:02}-{:02}", row.birth_year, row.birth_month, row.birth_day),
            birth_time: format!(
                "{:02}:{:02}:{:02}",
                row.birth_hour, row.birth_minute, row.birth_second
            ),
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            latitude: row.birth_latitude,
            longitude: row.birth_longitude,
            timezone: row.timezone_offset,
            city: row.birth_place,
            father_name: row.father_name,
            mother_name: row.mother_name,
            gotra: row.gotra,
            nawran_name: row.nawran_name,
            kundli_data: Value::Object(Default::default()),
            is_active: true,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub fn validate_user_id(user_id: Option<&str>) -> Result<&str, ApiError> {
    match user_id {
        None | Some("") => Err(ApiError::BadRequest("User ID required".into())),
        Some(id) if id.chars().count() < 3 => Err(ApiError::BadRequest("Invalid user ID".into())),
        Some(id) => Ok(id),
    }
}

/// Records for `user_id`, newest first. Store failures read as "no data".
pub async fn records_for_user(store: &dyn Store, user_id: &str) -> Vec<KundliRecord> {
    let rows = match store.kundli_rows_for_user(user_id).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, user_id, "kundli lookup failed, returning no records");
            return Vec::new();
        }
    };
    info!(user_id, count = rows.len(), "kundli records found");

    let total = rows.len();
    let records: Vec<KundliRecord> = rows
        .into_iter()
        .map(KundliRecord::from)
        .filter(|r| r.user_id == user_id)
        .collect();
    if records.len() != total {
        warn!(user_id, dropped = total - records.len(), "dropped kundli records owned by another user");
    }
    records
}

/// Body of `POST /api/save-kundli`. Chart payloads the client may send are
/// accepted and ignored; only birth metadata is stored.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SaveKundliRequest {
    pub name: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub lat: Option<Value>,
    pub lon: Option<Value>,
    pub tznm: Option<Value>,
    pub city: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub gotra: Option<String>,
    pub nawran_name: Option<String>,
}

/// `12.5`, `"12.5"`; anything else is absent.
fn number(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn non_empty(s: Option<&String>) -> Option<&str> {
    s.map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

impl SaveKundliRequest {
    /// Validate and split into the row stored for `user_id`.
    pub fn into_row(self, user_id: &str) -> Result<NewKundliRow, ApiError> {
        let missing = || ApiError::BadRequest("Missing required fields: name, date, time, lat, lon".into());
        let name = non_empty(self.name.as_ref()).ok_or_else(missing)?;
        let date = non_empty(self.date.as_ref()).ok_or_else(missing)?;
        let time = non_empty(self.time.as_ref()).ok_or_else(missing)?;
        let lat = number(self.lat.as_ref()).ok_or_else(missing)?;
        let lon = number(self.lon.as_ref()).ok_or_else(missing)?;

        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| ApiError::BadRequest(format!("Invalid date: {}", date)))?;
        let time = parse_time(time).ok_or_else(|| ApiError::BadRequest(format!("Invalid time: {}", time)))?;

        Ok(NewKundliRow {
            user_id: user_id.to_string(),
            name: name.to_string(),
            birth_year: date.year(),
            birth_month: date.month(),
            birth_day: date.day(),
            birth_hour: time.hour(),
            birth_minute: time.minute(),
            birth_second: time.second(),
            birth_latitude: lat,
            birth_longitude: lon,
            timezone_offset: number(self.tznm.as_ref()),
            birth_place: self.city,
            father_name: self.father_name,
            mother_name: self.mother_name,
            gotra: self.gotra,
            nawran_name: self.nawran_name,
        })
    }
}

/// Bearer token from an `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let header = header?.trim();
    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    (!token.is_empty()).then_some(token)
}
