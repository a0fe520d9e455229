use std::sync::Arc;

use argus_db::Database;
use argus_domain::config::Config;
use argus_domain::service::Service;
use argus_engine::ScanManager;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub manager: ScanManager,
    /// Domains this process serves.
    pub services: Arc<Vec<Service>>,
}
