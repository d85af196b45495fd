//! Service configuration, loaded from environment variables at startup.

use std::time::Duration;

/// Runtime configuration for the Nirvana Astro backend.
///
/// Every field has a default so the service starts with no environment set;
/// it then talks to a local Ollama, stores data in a local SQLite file and
/// serves miti data from `public/miti-data`.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind.
    pub bind_address: String,
    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,
    /// Emit log records as newline-delimited JSON.
    pub log_json: bool,

    pub groq_api_key: Option<String>,
    pub groq_base_url: String,
    pub groq_model: String,
    /// Whole-request deadline for Groq, streaming included.
    pub groq_timeout: Duration,

    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_vision_model: String,
    pub ollama_timeout: Duration,

    /// Image-analysis microservice (kundli chart / palm reading).
    pub cv_base_url: String,

    pub supabase_url: Option<String>,
    pub supabase_service_key: Option<String>,
    /// Local SQLite file used when Supabase is not configured.
    pub database_path: String,

    /// Astronomical "panchang-celestial" computation service.
    pub panchang_api_url: String,
    /// Root of the static `{year}/{MM}.json` almanac files.
    pub miti_data_dir: String,

    pub nrb_forex_url: String,
    /// Endpoint returning the rashifal list for `/{period}`.
    pub rashifal_api_url: Option<String>,
    /// Per-sign pages (`{url}/{period}/{slug}`) used to fill in truncated
    /// rashifal text.
    pub rashifal_page_url: String,

    /// Comma-separated CORS origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,
}

/// Settings whose values must never reach the logs in clear text.
const SECRET_KEYS: &[&str] = &["GROQ_API_KEY", "SUPABASE_SERVICE_ROLE_KEY"];

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("NIRVANA_BIND", "0.0.0.0:3000"),
            log_level: env_or("NIRVANA_LOG", "info"),
            log_json: env_opt("NIRVANA_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            groq_api_key: env_opt("GROQ_API_KEY"),
            groq_base_url: env_or("GROQ_BASE_URL", "https://api.groq.com/openai/v1"),
            groq_model: env_or("GROQ_MODEL", "llama-3.3-70b-versatile"),
            groq_timeout: env_secs("GROQ_TIMEOUT_SECS", 60),
            ollama_base_url: env_or("OLLAMA_BASE_URL", "http://127.0.0.1:11434"),
            ollama_model: env_or("OLLAMA_MODEL", "qwen2:0.5b"),
            ollama_vision_model: env_or("OLLAMA_VISION_MODEL", "llava:latest"),
            ollama_timeout: env_secs("OLLAMA_TIMEOUT_SECS", 120),
            cv_base_url: env_or("BACKEND_CV_URL", "http://localhost:5001"),
            supabase_url: env_opt("NEXT_PUBLIC_SUPABASE_URL"),
            supabase_service_key: env_opt("SUPABASE_SERVICE_ROLE_KEY"),
            database_path: env_or("NIRVANA_DATABASE_PATH", "nirvana-astro.db"),
            panchang_api_url: env_or("PANCHANG_API_URL", "http://localhost:5002"),
            miti_data_dir: env_or("MITI_DATA_DIR", "public/miti-data"),
            nrb_forex_url: env_or(
                "NRB_FOREX_URL",
                "https://www.nrb.org.np/api/forex/v1/rates",
            ),
            rashifal_api_url: env_opt("RASHIFAL_API_URL"),
            rashifal_page_url: env_or("RASHIFAL_PAGE_URL", "https://www.hamropatro.com/rashifal"),
            cors_allowed_origins: env_opt("NIRVANA_CORS_ORIGINS"),
        }
    }

    /// Supabase URL and service key, only when both are configured.
    pub fn supabase(&self) -> Option<(&str, &str)> {
        match (&self.supabase_url, &self.supabase_service_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }

    /// Key/value summary for the startup log, secrets masked.
    pub fn redacted(&self) -> Vec<(&'static str, String)> {
        let entries: Vec<(&'static str, Option<&str>)> = vec![
            ("NIRVANA_BIND", Some(self.bind_address.as_str())),
            ("GROQ_API_KEY", self.groq_api_key.as_deref()),
            ("GROQ_MODEL", Some(self.groq_model.as_str())),
            ("OLLAMA_BASE_URL", Some(self.ollama_base_url.as_str())),
            ("OLLAMA_MODEL", Some(self.ollama_model.as_str())),
            ("BACKEND_CV_URL", Some(self.cv_base_url.as_str())),
            ("NEXT_PUBLIC_SUPABASE_URL", self.supabase_url.as_deref()),
            ("SUPABASE_SERVICE_ROLE_KEY", self.supabase_service_key.as_deref()),
            ("PANCHANG_API_URL", Some(self.panchang_api_url.as_str())),
            ("MITI_DATA_DIR", Some(self.miti_data_dir.as_str())),
            ("RASHIFAL_API_URL", self.rashifal_api_url.as_deref()),
            ("RASHIFAL_PAGE_URL", Some(self.rashifal_page_url.as_str())),
        ];

        entries
            .into_iter()
            .map(|(key, value)| {
                let shown = match value {
                    None => "<unset>".to_string(),
                    Some(v) if SECRET_KEYS.contains(&key) => mask_secret(v),
                    Some(v) => v.to_string(),
                };
                (key, shown)
            })
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".into(),
            log_level: "info".into(),
            log_json: false,
            groq_api_key: None,
            groq_base_url: "https://api.groq.com/openai/v1".into(),
            groq_model: "llama-3.3-70b-versatile".into(),
            groq_timeout: Duration::from_secs(60),
            ollama_base_url: "http://127.0.0.1:11434".into(),
            ollama_model: "qwen2:0.5b".into(),
            ollama_vision_model: "llava:latest".into(),
            ollama_timeout: Duration::from_secs(120),
            cv_base_url: "http://localhost:5001".into(),
            supabase_url: None,
            supabase_service_key: None,
            database_path: "nirvana-astro.db".into(),
            panchang_api_url: "http://localhost:5002".into(),
            miti_data_dir: "public/miti-data".into(),
            nrb_forex_url: "https://www.nrb.org.np/api/forex/v1/rates".into(),
            rashifal_api_url: None,
            rashifal_page_url: "https://www.hamropatro.com/rashifal".into(),
            cors_allowed_origins: None,
        }
    }
}

/// Mask a secret for display: `abcd...wxyz`, or `****` when too short.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "****".to_string()
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_owned())
}

/// Whole seconds; unparsable values fall back to `default`.
fn env_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default))
}
