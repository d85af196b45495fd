//! Observer location: IP geolocation with provider fallback, and forward
//! geocoding of a place name.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ApiError;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProvider {
    IpApi,
    IpWhoIs,
    FreeIpApi,
}

impl IpProvider {
    pub fn name(&self) -> &'static str {
        match self {
            IpProvider::IpApi => "ipapi",
            IpProvider::IpWhoIs => "ipwhois",
            IpProvider::FreeIpApi => "freeipapi",
        }
    }

    /// Each provider spells city/country differently.
    fn place_name(&self, data: &Value) -> Option<String> {
        let field = |k: &str| data.get(k).and_then(Value::as_str).filter(|s| !s.is_empty());
        match self {
            IpProvider::IpApi => match field("city") {
                Some(city) => Some(format!("{}, {}", city, field("country_name").unwrap_or_default())),
                None => field("country_name").map(str::to_string),
            },
            IpProvider::IpWhoIs => Some(format!(
                "{}, {}",
                field("city").unwrap_or_default(),
                field("country").unwrap_or_default()
            )),
            IpProvider::FreeIpApi => Some(format!(
                "{}, {}",
                field("cityName").unwrap_or_default(),
                field("countryName").unwrap_or_default()
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeoEndpoints {
    pub ip_chain: Vec<(IpProvider, String)>,
    pub forward_geocode: String,
}

impl Default for GeoEndpoints {
    fn default() -> Self {
        Self {
            ip_chain: vec![
                (IpProvider::IpApi, "https://ipapi.co/json/".into()),
                (IpProvider::IpWhoIs, "https://ipwho.is/".into()),
                (IpProvider::FreeIpApi, "https://freeipapi.com/api/json".into()),
            ],
            forward_geocode: "https://api.bigdatacloud.net/data/forward-geocode-client".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    /// Which lookup produced the location (`default` when all failed).
    pub source: String,
}

impl Location {
    pub fn ujjain() -> Self {
        Self {
            latitude: 23.1793,
            longitude: 75.784912,
            name: "Ujjain, India (Default)".into(),
            source: "default".into(),
        }
    }
}

fn coordinate(data: &Value, key: &str) -> Option<f64> {
    data.get(key).and_then(Value::as_f64).filter(|v| *v != 0.0)
}

async fn query_provider(client: &Client, provider: IpProvider, url: &str) -> Option<Location> {
    let resp = client.get(url).timeout(PROVIDER_TIMEOUT).send().await;
    let data: Value = match resp {
        Ok(r) if r.status().is_success() => r.json().await.ok()?,
        Ok(r) => {
            warn!(provider = provider.name(), status = %r.status(), "geolocation provider failed");
            return None;
        }
        Err(e) => {
            warn!(provider = provider.name(), error = %e, "geolocation provider failed");
            return None;
        }
    };
    let latitude = coordinate(&data, "latitude")?;
    let longitude = coordinate(&data, "longitude")?;
    let name = provider
        .place_name(&data)
        .unwrap_or_else(|| format!("{:.2}°, {:.2}°", latitude, longitude));
    Some(Location {
        latitude,
        longitude,
        name,
        source: provider.name().into(),
    })
}

/// First provider that yields both coordinates wins; Ujjain otherwise.
pub async fn locate(client: &Client, endpoints: &GeoEndpoints) -> Location {
    for (provider, url) in &endpoints.ip_chain {
        debug!(provider = provider.name(), "fetching location");
        if let Some(location) = query_provider(client, *provider, url).await {
            return location;
        }
    }
    warn!("all location services failed, falling back to default");
    Location::ujjain()
}

/// Forward-geocode `query`; the first result wins and keeps the query as
/// its name.
pub async fn search(client: &Client, endpoints: &GeoEndpoints, query: &str) -> Result<Location, ApiError> {
    let data: Value = client
        .get(&endpoints.forward_geocode)
        .query(&[("query", query), ("localityLanguage", "en")])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let first = data
        .get("results")
        .and_then(Value::as_array)
        .and_then(|r| r.first())
        .ok_or_else(|| ApiError::NotFound("Location not found".into()))?;
    match (first.get("latitude").and_then(Value::as_f64), first.get("longitude").and_then(Value::as_f64)) {
        (Some(latitude), Some(longitude)) => Ok(Location {
            latitude,
            longitude,
            name: query.to_string(),
            source: "bigdatacloud".into(),
        }),
        _ => Err(ApiError::NotFound("Location not found".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_chain_skips_failing_and_incomplete_providers() {
        let base = serve(
            Router::new()
                .route("/ipapi", get(|| async { StatusCode::TOO_MANY_REQUESTS }))
                .route("/ipwho", get(|| async { Json(json!({ "latitude": 27.7 })) }))
                .route(
                    "/free",
                    get(|| async {
                        Json(json!({
                            "latitude": 27.7172, "longitude": 85.324,
                            "cityName": "Kathmandu", "countryName": "Nepal"
                        }))
                    }),
                ),
        )
        .await;
        let endpoints = GeoEndpoints {
            ip_chain: vec![
                (IpProvider::IpApi, format!("{}/ipapi", base)),
                (IpProvider::IpWhoIs, format!("{}/ipwho", base)),
                (IpProvider::FreeIpApi, format!("{}/free", base)),
            ],
            forward_geocode: String::new(),
        };

        let loc = locate(&Client::new(), &endpoints).await;
        assert_eq!(loc.name, "Kathmandu, Nepal");
        assert_eq!(loc.source, "freeipapi");
    }

    #[tokio::test]
    async fn test_all_failing_falls_back_to_ujjain() {
        let endpoints = GeoEndpoints {
            ip_chain: vec![(IpProvider::IpApi, "http://127.0.0.1:9/json".into())],
            forward_geocode: String::new(),
        };
        assert_eq!(locate(&Client::new(), &endpoints).await, Location::ujjain());
    }

    #[test]
    fn test_ipapi_name_without_city() {
        let name = IpProvider::IpApi.place_name(&json!({ "country_name": "Nepal" }));
        assert_eq!(name.as_deref(), Some("Nepal"));
    }

    #[tokio::test]
    async fn test_search_first_result_or_not_found() {
        let base = serve(Router::new().route(
            "/geocode",
            get(|axum::extract::Query(q): axum::extract::Query<std::collections::HashMap<String, String>>| async move {
                if q.get("query").map(String::as_str) == Some("Pokhara") {
                    Json(json!({ "results": [{ "latitude": 28.2096, "longitude": 83.9856 }] }))
                } else {
                    Json(json!({ "results": [] }))
                }
            }),
        ))
        .await;
        let endpoints = GeoEndpoints {
            ip_chain: vec![],
            forward_geocode: format!("{}/geocode", base),
        };
        let client = Client::new();

        let hit = search(&client, &endpoints, "Pokhara").await.unwrap();
        assert_eq!(hit.name, "Pokhara");
        assert_eq!(hit.latitude, 28.2096);
        assert!(matches!(
            search(&client, &endpoints, "Atlantis").await,
            Err(ApiError::NotFound(_))
        ));
    }
}
