//! Bikram Sambat <-> Gregorian conversion and month grids, computed from
//! the almanac data rather than a hard-coded month-length table.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::debug;

use crate::miti::{DayEntry, MitiError, MitiStore};
use crate::translate::{to_english_digits, to_nepali_digits};

/// Offset used when the almanac does not cover a date.
const APPROX_YEAR_OFFSET: i32 = 57;

pub const BS_MONTHS_NE: [&str; 12] = [
    "बैशाख", "जेठ", "असार", "साउन", "भदौ", "असोज", "कार्तिक", "मंसिर", "पुस", "माघ", "फागुन", "चैत",
];

pub const BS_MONTHS_EN: [&str; 12] = [
    "Baishakh", "Jestha", "Asar", "Shrawan", "Bhadra", "Ashwin", "Kartik", "Mangsir", "Poush",
    "Magh", "Falgun", "Chaitra",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BsDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl fmt::Display for BsDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for BsDate {
    type Err = MitiError;

    /// `YYYY-MM-DD`, in ASCII or Devanagari digits. BS months run to 32 days.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MitiError::InvalidDate(s.to_string());
        let normalized = to_english_digits(s.trim());
        let mut parts = normalized.split('-');
        let (Some(y), Some(m), Some(d), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        let day: u32 = d.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) || !(1..=32).contains(&day) {
            return Err(invalid());
        }
        Ok(BsDate { year, month, day })
    }
}

pub fn parse_ad_date(s: &str) -> Result<NaiveDate, MitiError> {
    NaiveDate::parse_from_str(to_english_digits(s.trim()).as_str(), "%Y-%m-%d")
        .map_err(|_| MitiError::InvalidDate(s.to_string()))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Conversion {
    pub bs: String,
    pub ad: String,
    /// True when the almanac had no entry and the fixed offset was used.
    pub approximate: bool,
}

pub async fn bs_to_ad(store: &MitiStore, bs: BsDate) -> Result<Conversion, MitiError> {
    match store.day(bs.year, bs.month, bs.day).await {
        Ok(entry) => {
            if let Some(ad) = entry.ad_date() {
                return Ok(Conversion {
                    bs: bs.to_string(),
                    ad: ad.format("%Y-%m-%d").to_string(),
                    approximate: false,
                });
            }
            debug!(%bs, "almanac entry has no AD date, using offset");
        }
        Err(MitiError::MonthNotFound { .. } | MitiError::DayNotFound { .. }) => {
            debug!(%bs, "date outside almanac coverage, using offset");
        }
        Err(e) => return Err(e),
    }

    let year = bs.year - APPROX_YEAR_OFFSET;
    let day = bs.day.min(days_in_ad_month(year, bs.month));
    let ad = NaiveDate::from_ymd_opt(year, bs.month, day)
        .ok_or_else(|| MitiError::InvalidDate(bs.to_string()))?;
    Ok(Conversion {
        bs: bs.to_string(),
        ad: ad.format("%Y-%m-%d").to_string(),
        approximate: true,
    })
}

pub async fn ad_to_bs(store: &MitiStore, ad: NaiveDate) -> Result<Conversion, MitiError> {
    let ad_text = ad.format("%Y-%m-%d").to_string();
    for bs_year in [ad.year() + APPROX_YEAR_OFFSET - 1, ad.year() + APPROX_YEAR_OFFSET] {
        for bs_month in 1..=12 {
            let days = match store.month(bs_year, bs_month).await {
                Ok(days) => days,
                Err(MitiError::MonthNotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            let hit = days
                .iter()
                .find(|e| e.ad_date() == Some(ad))
                .and_then(DayEntry::bs_day);
            if let Some(day) = hit {
                return Ok(Conversion {
                    bs: BsDate {
                        year: bs_year,
                        month: bs_month,
                        day,
                    }
                    .to_string(),
                    ad: ad_text,
                    approximate: false,
                });
            }
        }
    }

    debug!(ad = %ad_text, "date outside almanac coverage, using offset");
    Ok(Conversion {
        bs: BsDate {
            year: ad.year() + APPROX_YEAR_OFFSET,
            month: ad.month(),
            day: ad.day(),
        }
        .to_string(),
        ad: ad_text,
        approximate: true,
    })
}

fn days_in_ad_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GridCell {
    pub bs_day: u32,
    pub bs_day_np: String,
    pub ad_date: Option<String>,
    pub tithi: Option<String>,
    pub is_holiday: bool,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub month_name_np: &'static str,
    pub month_name_en: &'static str,
    pub leading_blanks: usize,
    pub weeks: Vec<Vec<Option<GridCell>>>,
}

/// Blank cells before day 1: weekday code minus one, or 0 when the code is
/// missing or out of range.
pub fn leading_blanks(days: &[DayEntry]) -> usize {
    days.first()
        .and_then(DayEntry::weekday_code)
        .map(|c| (c - 1) as usize)
        .unwrap_or(0)
}

pub fn build_grid(year: i32, month: u32, days: &[DayEntry]) -> MonthGrid {
    let blanks = leading_blanks(days);
    let mut cells: Vec<Option<GridCell>> = vec![None; blanks];
    cells.extend(days.iter().enumerate().map(|(i, entry)| {
        let bs_day = entry.bs_day().unwrap_or(i as u32 + 1);
        Some(GridCell {
            bs_day,
            bs_day_np: entry
                .text(&["calendarInfo", "dates", "bs", "day", "np"])
                .unwrap_or_else(|| to_nepali_digits(&bs_day.to_string())),
            ad_date: entry.ad_full(),
            tithi: entry.text(&["tithiDetails", "title", "np"]),
            is_holiday: entry.is_holiday(),
            events: entry
                .events()
                .into_iter()
                .filter_map(|e| {
                    e.get("title")
                        .and_then(|t| t.get("np").or_else(|| t.get("en")))
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                })
                .collect(),
        })
    }));
    while cells.len() % 7 != 0 {
        cells.push(None);
    }

    let idx = (month.clamp(1, 12) - 1) as usize;
    MonthGrid {
        year,
        month,
        month_name_np: BS_MONTHS_NE[idx],
        month_name_en: BS_MONTHS_EN[idx],
        leading_blanks: blanks,
        weeks: cells.chunks(7).map(<[_]>::to_vec).collect(),
    }
}

pub async fn month_grid(store: &MitiStore, year: i32, month: u32) -> Result<MonthGrid, MitiError> {
    let days = store.month(year, month).await?;
    Ok(build_grid(year, month, &days))
}
