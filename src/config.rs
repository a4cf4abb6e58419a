/// Application configuration, parsed from environment variables.
///
/// Only deployment wiring lives here. Scoring tunables (cutoffs, thresholds,
/// the drying rate) live in the `weather_settings` row so the tuner and the
/// settings endpoint can change them at runtime.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    /// OpenWeatherMap One Call API key. `None` leaves the forecast source
    /// unconfigured and scoring endpoints answer 412.
    pub owm_api_key: Option<String>,
    pub owm_base_url: String,
    /// Request timeout applied to every outbound HTTP call.
    pub http_timeout_secs: u64,
    /// Interval between background window sync runs.
    pub sync_interval_secs: u64,
    /// Number of days (starting today) covered by each window sync.
    pub sync_horizon_days: u32,
    pub snapshot_retention_days: u32,
    pub caldav: Option<CalDavConfig>,
}

/// Credentials for the CalDAV collection suggested windows are pushed to.
#[derive(Debug, Clone)]
pub struct CalDavConfig {
    /// Collection URL, e.g. `https://dav.example.com/user/rides/`
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {value:?}")]
    Invalid { name: &'static str, value: String },
}

const DEFAULT_OWM_BASE_URL: &str = "https://api.openweathermap.org";

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let caldav = match std::env::var("CALDAV_URL") {
            Ok(url) if !url.is_empty() => Some(CalDavConfig {
                url,
                username: std::env::var("CALDAV_USERNAME")
                    .map_err(|_| ConfigError::Missing("CALDAV_USERNAME"))?,
                password: std::env::var("CALDAV_PASSWORD")
                    .map_err(|_| ConfigError::Missing("CALDAV_PASSWORD"))?,
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            port: parse_var("PORT", 8080)?,
            owm_api_key: std::env::var("OWM_API_KEY").ok().filter(|k| !k.is_empty()),
            owm_base_url: std::env::var("OWM_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OWM_BASE_URL.to_string()),
            http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS", 15)?,
            sync_interval_secs: parse_var("SYNC_INTERVAL_SECS", 3 * 3600)?,
            sync_horizon_days: parse_var("SYNC_HORIZON_DAYS", 7)?,
            snapshot_retention_days: parse_var("SNAPSHOT_RETENTION_DAYS", 90)?,
            caldav,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
