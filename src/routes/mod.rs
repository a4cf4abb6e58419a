use std::sync::Arc;

use crate::services::forecast::ForecastSource;
use crate::services::sync::{SharedSyncState, SyncDeps};
use crate::services::tuner::TunerHandle;

pub mod feedback;
pub mod health;
pub mod ride_days;
pub mod settings;
pub mod status;
pub mod windows;

/// Shared application state for the engine endpoints.
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    /// `None` when no forecast API key is configured
    pub forecast: Option<Arc<dyn ForecastSource>>,
    pub tuner: TunerHandle,
    pub sync: SyncDeps,
    pub sync_state: SharedSyncState,
    pub snapshot_retention_days: u32,
}
