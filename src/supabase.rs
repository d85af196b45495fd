//! [`Store`] implementation backed by a Supabase project.
//!
//! Tables are reached through PostgREST (`/rest/v1`) with the service-role
//! key; bearer tokens are verified against `/auth/v1/user`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::{AuthUser, KundliRow, NewChatMessage, NewKundliRow};
use crate::db::{Store, StoreError};

#[derive(Debug, Clone)]
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    service_key: String,
}

#[derive(Deserialize)]
struct CacheRow {
    data: serde_json::Value,
}

impl SupabaseStore {
    pub fn new(client: Client, base_url: &str, service_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        }
    }

    fn rest(&self, method: reqwest::Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn check(resp: Response) -> Result<Response, StoreError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let message = resp.text().await.unwrap_or_default();
        Err(StoreError::Api { status, message })
    }
}

#[async_trait]
impl Store for SupabaseStore {
    fn backend(&self) -> &'static str {
        "supabase"
    }

    async fn insert_chat_message(&self, message: &NewChatMessage) -> Result<(), StoreError> {
        let resp = self
            .rest(reqwest::Method::POST, "chat_messages")
            .header("Prefer", "return=minimal")
            .json(message)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn kundli_rows_for_user(&self, user_id: &str) -> Result<Vec<KundliRow>, StoreError> {
        let user_filter = format!("eq.{}", user_id);
        let resp = self
            .rest(reqwest::Method::GET, "kundli_data")
            .query(&[
                ("select", "*"),
                ("user_id", user_filter.as_str()),
                ("order", "created_at.desc"),
            ])
            .send()
            .await?;
        let rows = Self::check(resp).await?.json::<Vec<KundliRow>>().await?;
        Ok(rows)
    }

    async fn insert_kundli_row(&self, row: &NewKundliRow) -> Result<KundliRow, StoreError> {
        let resp = self
            .rest(reqwest::Method::POST, "kundli_data")
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        let mut rows = Self::check(resp).await?.json::<Vec<KundliRow>>().await?;
        if rows.is_empty() {
            return Err(StoreError::Api {
                status: 500,
                message: "insert returned no representation".into(),
            });
        }
        Ok(rows.remove(0))
    }

    async fn user_for_token(&self, token: &str) -> Result<Option<AuthUser>, StoreError> {
        let resp = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(token)
            .send()
            .await?;
        match resp.status().as_u16() {
            401 | 403 | 404 => Ok(None),
            _ => Ok(Some(Self::check(resp).await?.json::<AuthUser>().await?)),
        }
    }

    async fn cached_horoscope(
        &self,
        period: &str,
        cache_key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let period_filter = format!("eq.{}", period);
        let key_filter = format!("eq.{}", cache_key);
        let resp = self
            .rest(reqwest::Method::GET, "horoscope_cache")
            .query(&[
                ("select", "data"),
                ("period", period_filter.as_str()),
                ("cache_key", key_filter.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await?;
        let rows = Self::check(resp).await?.json::<Vec<CacheRow>>().await?;
        Ok(rows.into_iter().next().map(|r| r.data))
    }

    async fn cache_horoscope(
        &self,
        period: &str,
        cache_key: &str,
        data: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let resp = self
            .rest(reqwest::Method::POST, "horoscope_cache")
            .query(&[("on_conflict", "period,cache_key")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&json!({ "period": period, "cache_key": cache_key, "data": data }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, Request};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_kundli_rows_query_filters_by_user() {
        let router = Router::new().route(
            "/rest/v1/kundli_data",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("user_id").map(String::as_str), Some("eq.user-7"));
                assert_eq!(q.get("order").map(String::as_str), Some("created_at.desc"));
                Json(serde_json::json!([{
                    "id": 42,
                    "user_id": "user-7",
                    "name": "Sita",
                    "birth_year": 2000,
                    "birth_month": 1,
                    "birth_day": 2,
                    "birth_hour": 3,
                    "birth_minute": 4,
                    "birth_latitude": 27.7,
                    "birth_longitude": 85.3,
                    "timezone_offset": 5.75,
                    "birth_place": null,
                    "father_name": null,
                    "mother_name": null,
                    "gotra": null,
                    "nawran_name": null,
                    "created_at": "2024-01-01T00:00:00Z",
                    "updated_at": "2024-01-01T00:00:00Z"
                }]))
            }),
        );
        let base = serve(router).await;
        let store = SupabaseStore::new(Client::new(), &base, "service");

        let rows = store.kundli_rows_for_user("user-7").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "42");
        assert_eq!(rows[0].birth_second, 0);
    }

    #[tokio::test]
    async fn test_unknown_token_resolves_to_none() {
        let router = Router::new().route(
            "/auth/v1/user",
            get(|req: Request| async move {
                let auth = req
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth == "Bearer good" {
                    Json(serde_json::json!({ "id": "u-1", "email": "a@b.c" })).into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            }),
        );
        let base = serve(router).await;
        let store = SupabaseStore::new(Client::new(), &base, "service");

        assert_eq!(store.user_for_token("good").await.unwrap().unwrap().id, "u-1");
        assert!(store.user_for_token("bad").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_api_error_surfaces_status() {
        let router = Router::new().route(
            "/rest/v1/horoscope_cache",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = serve(router).await;
        let store = SupabaseStore::new(Client::new(), &base, "service");
        let err = store.cached_horoscope("daily", "daily-2025-01-01").await.unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 500, .. }));
    }
}
