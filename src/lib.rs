pub mod api;
pub mod calendar;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod forex;
pub mod geo;
pub mod kundli;
pub mod llm;
pub mod miti;
pub mod panchang;
pub mod rashifal;
pub mod state;
pub mod supabase;
pub mod translate;
pub mod vision;
pub mod voice;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use db::{Database, Store};
use state::AppState;
use supabase::SupabaseStore;

/// `RUST_LOG` wins over `NIRVANA_LOG`; an invalid filter falls back to `info`.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|e| {
            eprintln!(
                "WARN: NIRVANA_LOG='{}' is not a valid tracing filter ({}); falling back to 'info'",
                config.log_level, e
            );
            EnvFilter::new("info")
        })
    });
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn open_store(config: &Config, client: &reqwest::Client) -> anyhow::Result<Arc<dyn Store>> {
    if let Some((url, key)) = config.supabase() {
        return Ok(Arc::new(SupabaseStore::new(client.clone(), url, key)));
    }
    info!(path = %config.database_path, "no Supabase credentials, using local SQLite");
    Ok(Arc::new(Database::open(Path::new(&config.database_path))?))
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);
    info!(version = env!("CARGO_PKG_VERSION"), "nirvana-astro starting");
    for (key, value) in config.redacted() {
        info!(%key, %value, "config");
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("nirvana-astro/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let store = open_store(&config, &client)?;
    info!(backend = store.backend(), "store ready");
    let addr: SocketAddr = config.bind_address.parse()?;
    let state = AppState::new(config, client, store);
    let almanac = state.miti.root();
    if almanac.is_dir() {
        info!(path = %almanac.display(), "almanac data directory");
    } else {
        warn!(path = %almanac.display(), "almanac data directory missing, month lookups will fail");
    }
    let app = api::build(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("nirvana-astro stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl-C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
