use serde::{Deserialize, Deserializer, Serialize};

/// One chat turn as persisted in `chat_messages`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewChatMessage {
    pub user_id: String,
    pub role: String,
    pub content: String,
}

/// A `kundli_data` row: birth metadata split into numeric components.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct KundliRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub birth_year: i32,
    pub birth_month: u32,
    pub birth_day: u32,
    #[serde(default)]
    pub birth_hour: u32,
    #[serde(default)]
    pub birth_minute: u32,
    #[serde(default)]
    pub birth_second: u32,
    pub birth_latitude: Option<f64>,
    pub birth_longitude: Option<f64>,
    pub timezone_offset: Option<f64>,
    pub birth_place: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub gotra: Option<String>,
    pub nawran_name: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Insert payload for `kundli_data`; the store assigns id and timestamps.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewKundliRow {
    pub user_id: String,
    pub name: String,
    pub birth_year: i32,
    pub birth_month: u32,
    pub birth_day: u32,
    pub birth_hour: u32,
    pub birth_minute: u32,
    pub birth_second: u32,
    pub birth_latitude: f64,
    pub birth_longitude: f64,
    pub timezone_offset: Option<f64>,
    pub birth_place: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub gotra: Option<String>,
    pub nawran_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

/// Supabase hands back integer or uuid ids depending on the table.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}
