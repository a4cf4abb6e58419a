// Barnbook Footing API v0.1
use axum::{
    routing::{delete, get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use barnbook_footing::config::AppConfig;
use barnbook_footing::routes::{self, AppState};
use barnbook_footing::services::calendar::{CalDavSink, CalendarSink, NoBusyCalendar};
use barnbook_footing::services::forecast::ForecastSource;
use barnbook_footing::services::owm::OwmClient;
use barnbook_footing::services::sync::{run_window_sync, SharedSyncState, SyncDeps, SyncState};
use barnbook_footing::services::tuner::{
    run_tuner, SharedTunerState, TunerConfig, TunerHandle, TunerState, TUNER_CHANNEL_CAPACITY,
};
use barnbook_footing::{errors, services};

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 2;

/// Barnbook Footing API, OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Barnbook Footing API",
        version = "0.1.0",
        description = "Ride-day scoring for an outdoor arena. Estimates ground moisture \
            from recent rain and a drying rate, scores each forecast day green, yellow \
            or red, suggests ride windows around the weekly schedule and tunes the \
            drying rate from rider feedback.",
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Weather", description = "Scored ride days and scoring settings"),
        (name = "Feedback", description = "Footing feedback and prediction accuracy"),
        (name = "Windows", description = "Suggested ride windows"),
        (name = "Status", description = "Background worker status"),
    ),
    paths(
        routes::health::health_check,
        routes::ride_days::get_ride_days,
        routes::settings::get_settings,
        routes::settings::update_settings,
        routes::feedback::create_feedback,
        routes::feedback::get_feedback_for_date,
        routes::feedback::get_accuracy,
        routes::windows::list_windows,
        routes::windows::trigger_sync,
        routes::windows::delete_window,
        routes::status::get_sync_status,
        routes::status::get_tuner_status,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            services::ride_day::RideDayPass,
            services::scoring::ScoredDay,
            services::scoring::DayScore,
            services::forecast::CurrentConditions,
            services::forecast::DayForecast,
            services::forecast::HourForecast,
            services::moisture::MoistureState,
            services::alerts::Alert,
            services::alerts::AlertKind,
            services::alerts::AlertSeverity,
            services::settings::WeatherSettings,
            services::settings::SettingsUpdate,
            routes::feedback::CreateFeedbackRequest,
            routes::feedback::FeedbackResponse,
            routes::feedback::SnapshotResponse,
            routes::feedback::FeedbackForDateResponse,
            services::accuracy::ActualFooting,
            services::accuracy::Outcome,
            services::accuracy::AccuracyStats,
            services::accuracy::ScoreAccuracy,
            routes::windows::RideWindowResponse,
            routes::windows::WindowAction,
            services::sync::SyncSummary,
            services::sync::SyncState,
            services::tuner::TunerState,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing; LOG_FORMAT=json for structured output
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "barnbook_footing=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = AppConfig::from_env()?;
    let http_timeout = Duration::from_secs(config.http_timeout_secs);

    // Set up database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(&config.database_url)
        .await?;

    // Run migrations
    sqlx::migrate!().run(&pool).await?;

    tracing::info!("Database migrations completed");

    // Forecast source; scoring answers 412 without a key
    let forecast: Option<Arc<dyn ForecastSource>> = match &config.owm_api_key {
        Some(key) => Some(Arc::new(OwmClient::new(
            &config.owm_base_url,
            key,
            http_timeout,
        )?)),
        None => {
            tracing::warn!("OWM_API_KEY not set; ride-day scoring is disabled");
            None
        }
    };

    let sink: Option<Arc<dyn CalendarSink>> = match &config.caldav {
        Some(caldav) => {
            tracing::info!("Pushing ride windows to {}", caldav.url);
            Some(Arc::new(CalDavSink::new(caldav, http_timeout)?))
        }
        None => None,
    };

    // Tuner worker, fed by feedback submissions
    let (tuner, tuner_rx) = TunerHandle::channel(TUNER_CHANNEL_CAPACITY);
    let tuner_state: SharedTunerState = Arc::new(RwLock::new(TunerState::default()));
    tokio::spawn(run_tuner(
        pool.clone(),
        tuner_rx,
        tuner_state.clone(),
        TunerConfig::default(),
    ));

    // Window sync worker; HTTP-triggered runs share the same lock
    let sync = SyncDeps {
        pool: pool.clone(),
        forecast: forecast.clone(),
        busy: Arc::new(NoBusyCalendar),
        sink,
        horizon_days: config.sync_horizon_days,
        retention_days: config.snapshot_retention_days,
        run_lock: Arc::new(Mutex::new(())),
    };
    let sync_state: SharedSyncState =
        Arc::new(RwLock::new(SyncState::new(config.sync_interval_secs)));
    tokio::spawn(run_window_sync(
        sync.clone(),
        sync_state.clone(),
        Duration::from_secs(config.sync_interval_secs),
    ));

    // Build shared application state
    let app_state = AppState {
        pool: pool.clone(),
        forecast,
        tuner,
        sync,
        sync_state: sync_state.clone(),
        snapshot_retention_days: config.snapshot_retention_days,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);

    // Build router
    // Engine routes use AppState; health and status routes use narrower state.
    let engine_routes = Router::new()
        .route(
            "/api/v1/weather/ride-days",
            get(routes::ride_days::get_ride_days),
        )
        .route(
            "/api/v1/weather/settings",
            get(routes::settings::get_settings).patch(routes::settings::update_settings),
        )
        .route(
            "/api/v1/footing-feedback",
            post(routes::feedback::create_feedback).get(routes::feedback::get_feedback_for_date),
        )
        .route(
            "/api/v1/footing-feedback/accuracy",
            get(routes::feedback::get_accuracy),
        )
        .route("/api/v1/ride-windows", get(routes::windows::list_windows))
        .route(
            "/api/v1/ride-windows/sync",
            post(routes::windows::trigger_sync),
        )
        .route(
            "/api/v1/ride-windows/:id",
            delete(routes::windows::delete_window),
        )
        .with_state(app_state);

    // Health check uses PgPool to verify DB connectivity
    let health_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .with_state(pool);

    let sync_status_routes = Router::new()
        .route("/api/v1/sync/status", get(routes::status::get_sync_status))
        .with_state(sync_state);

    let tuner_status_routes = Router::new()
        .route("/api/v1/tuner/status", get(routes::status::get_tuner_status))
        .with_state(tuner_state);

    let app = Router::new()
        .merge(health_routes)
        .merge(engine_routes)
        .merge(sync_status_routes)
        .merge(tuner_status_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
