//! Panchang day view: maps one almanac entry into the shape the Panchang
//! page renders, optionally overlaid with the celestial computation service
//! and translated to Nepali.

use chrono::{Datelike, NaiveDate, NaiveTime};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::miti::DayEntry;
use crate::translate::{self, to_english_digits};

/// Kathmandu, used for every celestial lookup.
const KATHMANDU: (f64, f64) = (27.7172, 85.3240);

/// Shaka to Kali Yuga year offset.
const KALI_OFFSET: i64 = 3179;

const INAUSPICIOUS_MARKERS: [&str; 4] = ["राहू", "यमगण्ड", "दूर", "गुलिक"];

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct TithiView {
    pub name: String,
    pub english: String,
    pub end_time: String,
    pub lunar_phase: String,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct NakshatraView {
    pub name: String,
    pub english: String,
    pub lord: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct YogaView {
    pub name: String,
    pub english: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct KaranaView {
    pub name: String,
    pub english: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarView {
    pub nepali_date: String,
    pub english_date: String,
    pub hindu_month: String,
    pub day_length: String,
    pub ayan: String,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalTimings {
    pub rahu_kalam: String,
    pub yamaganda: String,
    pub gulika_kalam: String,
}

/// The service overlays arbitrary keys onto `era`, `timings`, `planetary`,
/// the muhurat lists and `bestTimes`, so those stay loosely typed.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DayView {
    pub tithi: TithiView,
    pub nakshatra: NakshatraView,
    pub yoga: YogaView,
    pub karana: KaranaView,
    pub calendar: CalendarView,
    pub era: Map<String, Value>,
    pub timings: Map<String, Value>,
    pub additional_timings: AdditionalTimings,
    pub planetary: Value,
    pub real_muhurats: Vec<Value>,
    pub inauspicious_times: Vec<Value>,
    pub best_times: Map<String, Value>,
    pub next_tithi: Value,
    pub next_nakshatra: Value,
}

fn s(entry: &DayEntry, path: &[&str]) -> String {
    entry.text(path).unwrap_or_default()
}

fn is_inauspicious(name: &str) -> bool {
    INAUSPICIOUS_MARKERS.iter().any(|m| name.contains(m))
}

/// `(periodName, duration)` pairs from `auspiciousMoments.muhurats`.
fn muhurats(entry: &DayEntry) -> Vec<(String, String)> {
    let Some(Value::Array(items)) = entry.get(&["auspiciousMoments", "muhurats"]) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|m| {
            let name = m.get("periodName")?.as_str()?.to_string();
            let duration = m
                .get("duration")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some((name, duration))
        })
        .collect()
}

fn first_duration(list: &[(String, String)], marker: &str) -> String {
    list.iter()
        .find(|(name, _)| name.contains(marker))
        .map(|(_, d)| d.clone())
        .unwrap_or_default()
}

/// First `H:MM`-like pair in `raw` (one or two digits each side).
fn clean_time(raw: &str) -> Option<NaiveTime> {
    let eng = to_english_digits(raw);
    eng.char_indices()
        .filter(|(_, c)| *c == ':')
        .find_map(|(i, _)| {
            let before: Vec<char> = eng[..i].chars().rev().take_while(char::is_ascii_digit).collect();
            let after: String = eng[i + 1..].chars().take_while(char::is_ascii_digit).take(2).collect();
            if before.is_empty() || after.is_empty() {
                return None;
            }
            let hours: String = before.iter().take(2).rev().collect();
            NaiveTime::from_hms_opt(hours.parse().ok()?, after.parse().ok()?, 0)
        })
}

/// Sunrise to sunset as `{h}h {m}m`; empty when either time is unreadable
/// or the span is not positive.
pub fn day_length(sunrise: &str, sunset: &str) -> String {
    let (Some(rise), Some(set)) = (clean_time(sunrise), clean_time(sunset)) else {
        return String::new();
    };
    let minutes = (set - rise).num_minutes();
    if minutes <= 0 {
        return String::new();
    }
    format!("{}h {}m", minutes / 60, minutes % 60)
}

pub fn map_day(entry: &DayEntry) -> DayView {
    let list = muhurats(entry);
    let (inauspicious, auspicious): (Vec<_>, Vec<_>) =
        list.iter().partition(|(name, _)| is_inauspicious(name));
    let as_items = |items: Vec<&(String, String)>| -> Vec<Value> {
        items
            .into_iter()
            .map(|(name, time)| json!({ "name": name.trim(), "time": time }))
            .collect()
    };

    let sunrise = s(entry, &["panchangaDetails", "times", "sunrise"]);
    let sunset = s(entry, &["panchangaDetails", "times", "sunset"]);
    let sun_sign = s(entry, &["panchangaDetails", "suryaRashi", "np"]);
    let nakshatra_np = s(entry, &["panchangaDetails", "nakshatra", "np"]);
    let tithi_np = s(entry, &["tithiDetails", "title", "np"]);

    let ayan = entry
        .text(&["panchangaDetails", "ayana"])
        .unwrap_or_else(|| {
            if sun_sign.contains("धनु") || sun_sign.contains("मकर") {
                "दक्षिणायन".to_string()
            } else {
                "उत्तरायण".to_string()
            }
        });

    let shaka = s(entry, &["calendarInfo", "nepaliEra", "sakSambat", "en"]);
    let kali = to_english_digits(&shaka)
        .trim()
        .parse::<i64>()
        .map(|y| json!(y + KALI_OFFSET))
        .unwrap_or_else(|_| json!(""));
    let traditional = match entry.text(&["calendarInfo", "nepaliEra", "nepalSambat", "year", "en"]) {
        Some(ns_year) => {
            let code = entry
                .text(&["tithiDetails", "code", "en"])
                .or_else(|| entry.text(&["tithiDetails", "code", "np"]))
                .unwrap_or_default();
            format!(
                "नेपाल संवत{} {} {} - {}",
                ns_year,
                s(entry, &["calendarInfo", "nepaliEra", "nepalSambat", "month", "np"]),
                tithi_np,
                code
            )
            .trim()
            .to_string()
        }
        None => String::new(),
    };

    let mut era = Map::new();
    era.insert("vikrama".into(), json!(s(entry, &["calendarInfo", "dates", "bs", "year", "en"])));
    era.insert("shaka".into(), json!(shaka));
    era.insert("kali".into(), kali);
    era.insert("traditional_nepali_date".into(), json!(traditional));

    let mut timings = Map::new();
    for key in ["sunrise", "sunset", "moonrise", "moonset"] {
        timings.insert(key.into(), json!(s(entry, &["panchangaDetails", "times", key])));
    }

    let blank = json!({ "sign": "", "longitude": "" });
    let planetary = json!({
        "sun": { "sign": sun_sign, "longitude": "" },
        "moon": { "sign": s(entry, &["panchangaDetails", "chandraRashi", "time", "np"]), "longitude": "" },
        "mars": blank, "mercury": blank, "jupiter": blank, "venus": blank,
        "saturn": blank, "rahu": blank, "ketu": blank,
        "aspects": {}
    });

    let mut best_times = Map::new();
    best_times.insert("business".into(), json!(first_duration(&list, "अमृत")));
    best_times.insert("travel".into(), json!(first_duration(&list, "अभिजीत")));
    best_times.insert("study".into(), json!(first_duration(&list, "गुलिक")));

    DayView {
        tithi: TithiView {
            name: tithi_np,
            english: s(entry, &["tithiDetails", "title", "en"]),
            end_time: s(entry, &["tithiDetails", "display", "np"]),
            lunar_phase: s(entry, &["panchangaDetails", "pakshya", "np"]),
        },
        nakshatra: NakshatraView {
            lord: translate::lookup(translate::NAKSHATRA_LORDS_NE, &nakshatra_np)
                .unwrap_or_default()
                .to_string(),
            name: nakshatra_np,
            english: s(entry, &["panchangaDetails", "nakshatra", "en"]),
            end_time: s(entry, &["panchangaDetails", "nakshatra", "endTime", "np"]),
        },
        yoga: YogaView {
            name: s(entry, &["panchangaDetails", "yog", "np"]),
            english: s(entry, &["panchangaDetails", "yog", "en"]),
            end_time: s(entry, &["panchangaDetails", "yog", "endTime", "np"]),
        },
        karana: KaranaView {
            name: s(entry, &["panchangaDetails", "karans", "first", "np"]),
            english: s(entry, &["panchangaDetails", "karans", "first", "en"]),
            kind: String::new(),
            end_time: s(entry, &["panchangaDetails", "karans", "first", "endTime", "np"]),
        },
        calendar: CalendarView {
            nepali_date: s(entry, &["calendarInfo", "dates", "bs", "full", "np"]),
            english_date: s(entry, &["calendarInfo", "dates", "ad", "full", "en"]),
            hindu_month: s(entry, &["calendarInfo", "dates", "bs", "month", "np"]),
            day_length: day_length(&sunrise, &sunset),
            ayan,
        },
        era,
        timings,
        additional_timings: AdditionalTimings {
            rahu_kalam: first_duration(&list, "राहू"),
            yamaganda: first_duration(&list, "यमगण्ड"),
            gulika_kalam: first_duration(&list, "गुलिक"),
        },
        planetary,
        real_muhurats: as_items(auspicious),
        inauspicious_times: as_items(inauspicious),
        best_times,
        next_tithi: json!({ "name": "", "changeTime": "" }),
        next_nakshatra: json!({ "name": "", "changeTime": "" }),
    }
}

fn non_empty_array(v: Option<&Value>) -> Option<&Vec<Value>> {
    v.and_then(Value::as_array).filter(|a| !a.is_empty())
}

fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(_) => true,
    }
}

/// Overlay a celestial-service response onto the local view. Responses
/// without `success: true` are ignored.
pub fn merge_celestial(view: &mut DayView, api: &Value) {
    if api.get("success").and_then(Value::as_bool) != Some(true) {
        return;
    }
    if truthy(api.get("planetary")) {
        view.planetary = api["planetary"].clone();
    }
    if let Some(Value::Object(t)) = api.get("timings") {
        view.timings.extend(t.clone());
    }
    if let Some(end) = api.pointer("/tithi/end_time").and_then(Value::as_str).filter(|s| !s.is_empty()) {
        view.tithi.end_time = end.to_string();
    }
    if let Some(end) = api.pointer("/nakshatra/end_time").and_then(Value::as_str).filter(|s| !s.is_empty()) {
        view.nakshatra.end_time = end.to_string();
    }
    if truthy(api.get("nextTithi")) {
        view.next_tithi = api["nextTithi"].clone();
    }
    if truthy(api.get("nextNakshatra")) {
        view.next_nakshatra = api["nextNakshatra"].clone();
    }
    if let Some(Value::Object(eras)) = api.get("eras") {
        let local = view
            .era
            .get("traditional_nepali_date")
            .filter(|v| truthy(Some(*v)))
            .cloned();
        view.era.extend(eras.clone());
        if let Some(local) = local {
            view.era.insert("traditional_nepali_date".into(), local);
        }
    }
    if let Some(list) = non_empty_array(api.get("muhurats")) {
        view.real_muhurats = list.clone();
    }
    if let Some(list) = non_empty_array(api.get("inauspiciousTimes")) {
        view.inauspicious_times = list.clone();
    }
    if let Some(Value::Object(best)) = api.get("bestTimes") {
        view.best_times.extend(best.clone());
    }
}

/// POST the AD date to `{base}/api/panchang` and return the raw response.
pub async fn fetch_celestial(
    client: &Client,
    base_url: &str,
    ad: NaiveDate,
) -> Result<Value, reqwest::Error> {
    let body = json!({
        "year": ad.year(),
        "month": ad.month(),
        "day": ad.day(),
        "latitude": KATHMANDU.0,
        "longitude": KATHMANDU.1,
    });
    client
        .post(format!("{}/api/panchang", base_url.trim_end_matches('/')))
        .json(&body)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}

/// Best-effort overlay: failures leave `view` untouched.
pub async fn enrich(view: &mut DayView, client: &Client, base_url: &str, ad: Option<NaiveDate>) {
    let Some(ad) = ad else {
        debug!("almanac entry has no AD date, skipping celestial overlay");
        return;
    };
    match fetch_celestial(client, base_url, ad).await {
        Ok(api) => merge_celestial(view, &api),
        Err(e) => warn!(error = %e, "celestial service unreachable, using almanac data only"),
    }
}

fn translate_field(obj: &mut Value, key: &str, table: translate::Table) {
    if let Some(Value::String(s)) = obj.get_mut(key) {
        *s = translate::translate(table, s);
    }
}

/// Render English terms in Nepali; terms without a table entry stay as-is.
pub fn to_nepali(mut view: DayView) -> DayView {
    view.tithi.name = translate::translate(translate::TITHI, &view.tithi.name);
    view.nakshatra.name = translate::translate(translate::NAKSHATRA, &view.nakshatra.name);
    view.nakshatra.lord = translate::translate(translate::NAKSHATRA_LORD, &view.nakshatra.lord);
    view.yoga.name = translate::translate(translate::YOGA, &view.yoga.name);
    view.karana.name = translate::translate(translate::KARANA, &view.karana.name);
    view.calendar.hindu_month =
        translate::translate(translate::HINDU_MONTH, &view.calendar.hindu_month);
    view.calendar.ayan = translate::translate(translate::AYANA, &view.calendar.ayan);

    if let Value::Object(planets) = &mut view.planetary {
        for (name, body) in planets.iter_mut() {
            if name == "aspects" {
                if let Value::Object(aspects) = body {
                    for aspect in aspects.values_mut() {
                        if let Value::String(s) = aspect {
                            *s = translate::translate(translate::ASPECTS, s);
                        }
                    }
                }
            } else {
                translate_field(body, "sign", translate::SIGNS);
            }
        }
    }
    for item in view
        .real_muhurats
        .iter_mut()
        .chain(view.inauspicious_times.iter_mut())
    {
        translate_field(item, "name", translate::MUHURATS);
    }
    translate_field(&mut view.next_tithi, "name", translate::TITHI);
    translate_field(&mut view.next_nakshatra, "name", translate::NAKSHATRA);
    view
}
