//! Persistence seam.
//!
//! [`Store`] is what handlers talk to. [`Database`] is the local SQLite
//! implementation used for development and tests; production deployments
//! point at Supabase through [`crate::supabase::SupabaseStore`].

pub mod models;

use async_trait::async_trait;
use models::{AuthUser, KundliRow, NewChatMessage, NewKundliRow};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Human-readable backend name for logs.
    fn backend(&self) -> &'static str;

    async fn insert_chat_message(&self, message: &NewChatMessage) -> Result<(), StoreError>;

    /// Rows for `user_id`, newest first.
    async fn kundli_rows_for_user(&self, user_id: &str) -> Result<Vec<KundliRow>, StoreError>;

    async fn insert_kundli_row(&self, row: &NewKundliRow) -> Result<KundliRow, StoreError>;

    /// Resolve a bearer token to its user; `None` when the token is unknown.
    async fn user_for_token(&self, token: &str) -> Result<Option<AuthUser>, StoreError>;

    async fn cached_horoscope(
        &self,
        period: &str,
        cache_key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    /// Insert or replace the cache entry for `(period, cache_key)`.
    async fn cache_horoscope(
        &self,
        period: &str,
        cache_key: &str,
        data: &serde_json::Value,
    ) -> Result<(), StoreError>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

const KUNDLI_COLUMNS: &str = "id, user_id, name, birth_year, birth_month, birth_day, \
     birth_hour, birth_minute, birth_second, birth_latitude, birth_longitude, \
     timezone_offset, birth_place, father_name, mother_name, gotra, nawran_name, \
     created_at, updated_at";

impl Database {
    pub fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS chat_messages (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS kundli_data (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT,
                birth_year INTEGER NOT NULL,
                birth_month INTEGER NOT NULL,
                birth_day INTEGER NOT NULL,
                birth_hour INTEGER NOT NULL DEFAULT 0,
                birth_minute INTEGER NOT NULL DEFAULT 0,
                birth_second INTEGER NOT NULL DEFAULT 0,
                birth_latitude REAL,
                birth_longitude REAL,
                timezone_offset REAL,
                birth_place TEXT,
                father_name TEXT,
                mother_name TEXT,
                gotra TEXT,
                nawran_name TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_kundli_data_user ON kundli_data(user_id);

            CREATE TABLE IF NOT EXISTS horoscope_cache (
                period TEXT NOT NULL,
                cache_key TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (period, cache_key)
            );

            CREATE TABLE IF NOT EXISTS auth_tokens (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                email TEXT
            );
            ",
        )?;
        Ok(())
    }

    /// Register a bearer token for local development sign-in.
    pub fn add_auth_token(
        &self,
        token: &str,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO auth_tokens (token, user_id, email) VALUES (?1, ?2, ?3)",
            params![token, user_id, email],
        )?;
        Ok(())
    }

    /// Messages for a user in insertion order.
    pub fn chat_messages(&self, user_id: &str) -> Result<Vec<NewChatMessage>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, role, content FROM chat_messages WHERE user_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(NewChatMessage {
                user_id: row.get(0)?,
                role: row.get(1)?,
                content: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn kundli_from_row(row: &Row<'_>) -> rusqlite::Result<KundliRow> {
        Ok(KundliRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            birth_year: row.get(3)?,
            birth_month: row.get(4)?,
            birth_day: row.get(5)?,
            birth_hour: row.get(6)?,
            birth_minute: row.get(7)?,
            birth_second: row.get(8)?,
            birth_latitude: row.get(9)?,
            birth_longitude: row.get(10)?,
            timezone_offset: row.get(11)?,
            birth_place: row.get(12)?,
            father_name: row.get(13)?,
            mother_name: row.get(14)?,
            gotra: row.get(15)?,
            nawran_name: row.get(16)?,
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
        })
    }
}

#[async_trait]
impl Store for Database {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn insert_chat_message(&self, message: &NewChatMessage) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO chat_messages (id, user_id, role, content) VALUES (?1, ?2, ?3, ?4)",
            params![id, message.user_id, message.role, message.content],
        )?;
        Ok(())
    }

    async fn kundli_rows_for_user(&self, user_id: &str) -> Result<Vec<KundliRow>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM kundli_data WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
            KUNDLI_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id], Self::kundli_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn insert_kundli_row(&self, row: &NewKundliRow) -> Result<KundliRow, StoreError> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO kundli_data (id, user_id, name, birth_year, birth_month, birth_day, \
             birth_hour, birth_minute, birth_second, birth_latitude, birth_longitude, \
             timezone_offset, birth_place, father_name, mother_name, gotra, nawran_name) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                id,
                row.user_id,
                row.name,
                row.birth_year,
                row.birth_month,
                row.birth_day,
                row.birth_hour,
                row.birth_minute,
                row.birth_second,
                row.birth_latitude,
                row.birth_longitude,
                row.timezone_offset,
                row.birth_place,
                row.father_name,
                row.mother_name,
                row.gotra,
                row.nawran_name,
            ],
        )?;
        let saved = conn.query_row(
            &format!("SELECT {} FROM kundli_data WHERE id = ?1", KUNDLI_COLUMNS),
            params![id],
            Self::kundli_from_row,
        )?;
        Ok(saved)
    }

    async fn user_for_token(&self, token: &str) -> Result<Option<AuthUser>, StoreError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT user_id, email FROM auth_tokens WHERE token = ?1",
                params![token],
                |row| {
                    Ok(AuthUser {
                        id: row.get(0)?,
                        email: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    async fn cached_horoscope(
        &self,
        period: &str,
        cache_key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let raw: Option<String> = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT data FROM horoscope_cache WHERE period = ?1 AND cache_key = ?2",
                params![period, cache_key],
                |row| row.get(0),
            )
            .optional()?
        };
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn cache_horoscope(
        &self,
        period: &str,
        cache_key: &str,
        data: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let text = serde_json::to_string(data)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO horoscope_cache (period, cache_key, data) VALUES (?1, ?2, ?3)",
            params![period, cache_key, text],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_row(user_id: &str, name: &str) -> NewKundliRow {
        NewKundliRow {
            user_id: user_id.into(),
            name: name.into(),
            birth_year: 1995,
            birth_month: 4,
            birth_day: 9,
            birth_hour: 6,
            birth_minute: 5,
            birth_second: 0,
            birth_latitude: 27.7172,
            birth_longitude: 85.324,
            timezone_offset: Some(5.75),
            birth_place: Some("Kathmandu".into()),
            father_name: None,
            mother_name: None,
            gotra: Some("Kashyap".into()),
            nawran_name: None,
        }
    }

    #[tokio::test]
    async fn test_kundli_rows_are_scoped_and_newest_first() {
        let db = Database::in_memory().unwrap();
        db.insert_kundli_row(&new_row("user-a", "first")).await.unwrap();
        db.insert_kundli_row(&new_row("user-b", "other")).await.unwrap();
        db.insert_kundli_row(&new_row("user-a", "second")).await.unwrap();

        let rows = db.kundli_rows_for_user("user-a").await.unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["second", "first"]);
        assert!(db.kundli_rows_for_user("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_messages_round_trip_in_order() {
        let db = Database::in_memory().unwrap();
        for (role, content) in [("user", "Q"), ("assistant", "A")] {
            db.insert_chat_message(&NewChatMessage {
                user_id: "u1".into(),
                role: role.into(),
                content: content.into(),
            })
            .await
            .unwrap();
        }
        let msgs = db.chat_messages("u1").unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].role, "assistant");
    }

    #[tokio::test]
    async fn test_invalid_role_is_rejected() {
        let db = Database::in_memory().unwrap();
        let err = db
            .insert_chat_message(&NewChatMessage {
                user_id: "u1".into(),
                role: "system".into(),
                content: "x".into(),
            })
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_horoscope_cache_upserts() {
        let db = Database::in_memory().unwrap();
        assert!(db.cached_horoscope("daily", "daily-2025-01-01").await.unwrap().is_none());
        db.cache_horoscope("daily", "daily-2025-01-01", &serde_json::json!([1]))
            .await
            .unwrap();
        db.cache_horoscope("daily", "daily-2025-01-01", &serde_json::json!([2]))
            .await
            .unwrap();
        let cached = db.cached_horoscope("daily", "daily-2025-01-01").await.unwrap();
        assert_eq!(cached, Some(serde_json::json!([2])));
    }

    #[tokio::test]
    async fn test_auth_tokens() {
        let db = Database::in_memory().unwrap();
        db.add_auth_token("tok", "user-1", Some("a@b.c")).unwrap();
        let user = db.user_for_token("tok").await.unwrap().unwrap();
        assert_eq!(user.id, "user-1");
        assert!(db.user_for_token("nope").await.unwrap().is_none());
    }
}
