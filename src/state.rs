use std::sync::Arc;

use reqwest::Client;

use crate::config::Config;
use crate::db::Store;
use crate::geo::GeoEndpoints;
use crate::miti::MitiStore;

/// Shared by every handler; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub client: Client,
    pub store: Arc<dyn Store>,
    pub miti: MitiStore,
    pub geo: Arc<GeoEndpoints>,
}

impl AppState {
    pub fn new(config: Config, client: Client, store: Arc<dyn Store>) -> Self {
        let miti = MitiStore::new(&config.miti_data_dir);
        Self {
            config: Arc::new(config),
            client,
            store,
            miti,
            geo: Arc::new(GeoEndpoints::default()),
        }
    }
}
