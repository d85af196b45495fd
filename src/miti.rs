//! Static almanac ("miti") data: one JSON array per Bikram Sambat month at
//! `{root}/{year}/{MM}.json`, one object per day.
//!
//! The files are generated elsewhere and loosely typed (numbers arrive as
//! strings or numbers, any field may be missing), so entries are kept as
//! [`serde_json::Value`] behind typed accessors.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::translate::to_english_digits;

#[derive(Debug, thiserror::Error)]
pub enum MitiError {
    #[error("no almanac data for {year}/{month:02}")]
    MonthNotFound { year: i32, month: u32 },
    #[error("no almanac entry for {year}/{month:02}/{day:02}")]
    DayNotFound { year: i32, month: u32, day: u32 },
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed almanac file: {0}")]
    Json(#[from] serde_json::Error),
}

const HOLIDAY_NAMES: &[&str] = &["Republic Day", "गणतन्त्र दिवस", "Eid al-Adha", "Bhoto Jaatra"];

pub const WEEKDAYS_NE: [&str; 7] = [
    "आइतबार", "सोमबार", "मंगलबार", "बुधबार", "बिहीबार", "शुक्रबार", "शनिबार",
];

/// One day of a miti month file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DayEntry(pub Value);

impl DayEntry {
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(&self.0, |v, key| v.get(key))
    }

    /// String at `path`; numbers are rendered, empty strings count as absent.
    pub fn text(&self, path: &[&str]) -> Option<String> {
        match self.get(path)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Integer at `path`, accepting numeric strings in either script.
    pub fn int(&self, path: &[&str]) -> Option<i64> {
        match self.get(path)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => to_english_digits(s.trim()).parse().ok(),
            _ => None,
        }
    }

    pub fn bs_day(&self) -> Option<u32> {
        self.int(&["calendarInfo", "dates", "bs", "day", "en"])
            .and_then(|d| u32::try_from(d).ok())
    }

    pub fn ad_date(&self) -> Option<NaiveDate> {
        let year = self.int(&["calendarInfo", "dates", "ad", "year", "en"])?;
        let month = self.int(&["calendarInfo", "dates", "ad", "month", "code", "en"])?;
        let day = self.int(&["calendarInfo", "dates", "ad", "day", "en"])?;
        NaiveDate::from_ymd_opt(
            i32::try_from(year).ok()?,
            u32::try_from(month).ok()?,
            u32::try_from(day).ok()?,
        )
    }

    /// `calendarInfo.days.codes.en`: 1 = Sunday .. 7 = Saturday.
    pub fn weekday_code(&self) -> Option<u32> {
        self.int(&["calendarInfo", "days", "codes", "en"])
            .and_then(|c| u32::try_from(c).ok())
            .filter(|c| (1..=7).contains(c))
    }

    /// `ad.full.en` normalised to `YYYY-MM-DD`.
    pub fn ad_full(&self) -> Option<String> {
        let raw = self.text(&["calendarInfo", "dates", "ad", "full", "en"])?;
        Some(normalize_ad_date(&raw))
    }

    pub fn events(&self) -> Vec<&Value> {
        match self.get(&["eventDetails"]) {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_holiday(&self) -> bool {
        self.events().into_iter().any(is_holiday_event)
    }
}

/// Pad `Y-M-D` components; anything else is returned as given.
pub fn normalize_ad_date(raw: &str) -> String {
    let parts: Vec<&str> = raw.trim().split('-').collect();
    match parts.as_slice() {
        [y, m, d] => match (m.parse::<u32>(), d.parse::<u32>()) {
            (Ok(m), Ok(d)) => format!("{}-{:02}-{:02}", y, m, d),
            _ => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}

fn is_truthy_flag(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => matches!(s.as_str(), "1" | "true" | "Yes"),
        _ => false,
    }
}

pub fn is_holiday_event(event: &Value) -> bool {
    if event.get("isHoliday").is_some_and(is_truthy_flag) {
        return true;
    }
    let tagged = ["eventType", "category", "type"].iter().any(|key| {
        event
            .get(*key)
            .map(|v| match v {
                Value::String(s) => s.eq_ignore_ascii_case("holiday"),
                other => other.to_string().eq_ignore_ascii_case("holiday"),
            })
            .unwrap_or(false)
    });
    if tagged {
        return true;
    }
    ["en", "np"].iter().any(|lang| {
        event
            .get("title")
            .and_then(|t| t.get(*lang))
            .and_then(Value::as_str)
            .is_some_and(|title| HOLIDAY_NAMES.contains(&title))
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthEvent {
    pub bs_day: Option<String>,
    pub weekday: Option<String>,
    pub title: Option<String>,
    pub ad_date: Option<String>,
    pub is_holiday: bool,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct MonthEvents {
    pub events: Vec<MonthEvent>,
    pub holidays: Vec<MonthEvent>,
}

/// Split every event of the month into holidays and ordinary events.
pub fn month_events(days: &[DayEntry]) -> MonthEvents {
    let mut out = MonthEvents::default();
    for day in days {
        let bs_day = day
            .text(&["calendarInfo", "dates", "bs", "day", "np"])
            .or_else(|| day.text(&["calendarInfo", "dates", "bs", "day", "en"]));
        let weekday = day
            .weekday_code()
            .map(|c| WEEKDAYS_NE[(c - 1) as usize].to_string());
        for event in day.events() {
            let title = ["np", "en"].iter().find_map(|lang| {
                event
                    .get("title")
                    .and_then(|t| t.get(*lang))
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            });
            let item = MonthEvent {
                bs_day: bs_day.clone(),
                weekday: weekday.clone(),
                title,
                ad_date: day.ad_full(),
                is_holiday: is_holiday_event(event),
            };
            if item.is_holiday {
                out.holidays.push(item);
            } else {
                out.events.push(item);
            }
        }
    }
    out
}

/// Read access to the almanac directory.
#[derive(Debug, Clone)]
pub struct MitiStore {
    root: PathBuf,
}

impl MitiStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn month_path(&self, year: i32, month: u32) -> PathBuf {
        self.root.join(year.to_string()).join(format!("{:02}.json", month))
    }

    pub async fn month(&self, year: i32, month: u32) -> Result<Vec<DayEntry>, MitiError> {
        if !(1..=12).contains(&month) {
            return Err(MitiError::InvalidDate(format!("{}-{}", year, month)));
        }
        let bytes = match tokio::fs::read(self.month_path(year, month)).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MitiError::MonthNotFound { year, month })
            }
            Err(e) => return Err(e.into()),
        };
        let values: Vec<Value> = serde_json::from_slice(&bytes)?;
        Ok(values.into_iter().map(DayEntry).collect())
    }

    pub async fn day(&self, year: i32, month: u32, day: u32) -> Result<DayEntry, MitiError> {
        self.month(year, month)
            .await?
            .into_iter()
            .find(|e| e.bs_day() == Some(day))
            .ok_or(MitiError::DayNotFound { year, month, day })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{json, Value};
    use std::path::Path;

    /// One synthetic day entry with the fields the service reads.
    pub fn day(bs: (i32, u32, u32), ad: (i32, u32, u32), weekday: u32) -> Value {
        json!({
            "calendarInfo": {
                "dates": {
                    "bs": {
                        "year": { "en": bs.0.to_string() },
                        "month": { "en": bs.1.to_string(), "np": "साउन" },
                        "day": { "en": bs.2.to_string() },
                        "full": { "np": format!("{}-{}-{}", bs.0, bs.1, bs.2) }
                    },
                    "ad": {
                        "year": { "en": ad.0.to_string() },
                        "month": { "code": { "en": ad.1.to_string() } },
                        "day": { "en": ad.2.to_string() },
                        "full": { "en": format!("{}-{}-{}", ad.0, ad.1, ad.2) }
                    }
                },
                "days": { "codes": { "en": weekday.to_string() } }
            },
            "eventDetails": []
        })
    }

    /// Write a month of `len` days starting at `ad_start` on `first_weekday`.
    pub fn write_month(
        root: &Path,
        bs_year: i32,
        bs_month: u32,
        len: u32,
        ad_start: chrono::NaiveDate,
        first_weekday: u32,
    ) -> Vec<Value> {
        use chrono::Datelike;
        let days: Vec<Value> = (0..len)
            .map(|i| {
                let ad = ad_start + chrono::Duration::days(i64::from(i));
                day(
                    (bs_year, bs_month, i + 1),
                    (ad.year(), ad.month(), ad.day()),
                    (first_weekday - 1 + i) % 7 + 1,
                )
            })
            .collect();
        let dir = root.join(bs_year.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(format!("{:02}.json", bs_month)),
            serde_json::to_vec(&days).unwrap(),
        )
        .unwrap();
        days
    }
}
