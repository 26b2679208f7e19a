//! Value-Set Store Node
//!
//! Hosts an in-memory data space for a group of linked model processes and
//! exposes it over HTTP, so fulfillers and tools outside the process can
//! take requests and publish value sets.
//!
//! # Endpoints
//!
//! ## Value sets
//! - `GET /api/v1/values?key=..` - Fetch a published value set
//! - `POST /api/v1/values` - Publish a value set (via the write-behind queue)
//! - `GET /api/v1/element-sets/{id}` - Element-set metadata
//!
//! ## Fulfillers
//! - `GET /api/v1/requests/next?wait_ms=..` - Take the next pending request
//!
//! ## Admin
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics
//! - `GET /api/v1/stats` - Store sizes and statistics
//!
//! # Configuration
//!
//! The server reads configuration from:
//! 1. `VALUESET_SERVER_CONFIG` environment variable (path to TOML file)
//! 2. `./valueset-server.toml` in current directory
//! 3. Default configuration
//!
//! # Example
//!
//! ```bash
//! # Start server with default config
//! ./server
//!
//! # Publish a value set
//! curl -X POST http://localhost:8080/api/v1/values \
//!   -H "Content-Type: application/json" \
//!   -d '{"service_id": "ws", "quantity_id": "head", "element_set_id": "wells",
//!        "timestamp": "2000-01-01T00:00:00", "scenario_id": "S000000", "values": [1.5]}'
//!
//! # Wait up to 5 s for a request to fulfill
//! curl "http://localhost:8080/api/v1/requests/next?wait_ms=5000"
//! ```

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{signal, time::Instant};
use tracing::{error, info, warn};
use valueset_cache::{
    config,
    entry::ValueSetEntry,
    services::{QueueDrainConfig, QueueDrainService, ServiceConfig, ServiceManager},
    stats::{self, MetricStats, PrometheusConfig, PrometheusExporter},
    store::DataSpace,
    types::ValueSetAddress,
    Statistics,
};

// =============================================================================
// Server Configuration
// =============================================================================

const CONFIG_ENV: &str = "VALUESET_SERVER_CONFIG";
const CONFIG_FILE: &str = "valueset-server.toml";

/// Server configuration loaded from TOML or environment
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Capacity of the request queue
    #[serde(default = "default_queue_capacity")]
    pub request_queue_capacity: usize,

    /// Capacity of the write-behind value-set queue
    #[serde(default = "default_queue_capacity")]
    pub value_queue_capacity: usize,

    /// Enable Prometheus metrics endpoint
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Upper bound on `wait_ms` for request polling
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// How long the drain service blocks on an empty queue
    #[serde(default = "default_drain_poll_ms")]
    pub drain_poll_ms: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_max_wait_ms() -> u64 {
    30_000
}

fn default_drain_poll_ms() -> u64 {
    500
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            request_queue_capacity: default_queue_capacity(),
            value_queue_capacity: default_queue_capacity(),
            enable_metrics: true,
            max_wait_ms: default_max_wait_ms(),
            drain_poll_ms: default_drain_poll_ms(),
        }
    }
}

// =============================================================================
// Application State
// =============================================================================

/// Shared application state
struct AppState {
    data: DataSpace,
    config: ServerConfig,
    statistics: Arc<Statistics>,
    exporter: PrometheusExporter,
}

impl AppState {
    fn new(config: ServerConfig) -> Self {
        let data = DataSpace::in_memory(config.request_queue_capacity, config.value_queue_capacity);
        let statistics = Arc::new(Statistics::new("server", "store"));
        let exporter = PrometheusExporter::new(PrometheusConfig::default(), statistics.clone());
        Self {
            data,
            config,
            statistics,
            exporter,
        }
    }
}

// =============================================================================
// API Request/Response Types
// =============================================================================

/// Value lookup parameters
#[derive(Debug, Deserialize)]
struct ValueParams {
    key: String,
}

/// Published value set
#[derive(Debug, Serialize)]
struct ValueSetResponse {
    key: String,
    #[serde(flatten)]
    address: ValueSetAddress,
    needs_upload: bool,
    values: Vec<f64>,
}

/// Publish request body
#[derive(Debug, Deserialize)]
struct PublishRequest {
    #[serde(flatten)]
    address: ValueSetAddress,
    #[serde(default)]
    needs_upload: bool,
    values: Vec<f64>,
}

/// Publish response
#[derive(Debug, Serialize)]
struct PublishResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Request polling parameters
#[derive(Debug, Deserialize)]
struct NextRequestParams {
    #[serde(default)]
    wait_ms: u64,
}

/// Stats response
#[derive(Debug, Serialize)]
struct StatsResponse {
    value_sets: usize,
    element_sets: usize,
    services: usize,
    clients: usize,
    pending_requests: usize,
    queued_values: usize,
    statistics: BTreeMap<String, MetricStats>,
}

/// Health response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

// =============================================================================
// API Handlers
// =============================================================================

/// Health check endpoint
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    if !state.config.enable_metrics {
        return StatusCode::NOT_FOUND.into_response();
    }
    let (body, content_type) = state.exporter.export_http();
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

/// Store sizes and statistics
async fn get_stats(State(state): State<Arc<AppState>>) -> Response {
    let data = &state.data;
    let sizes = async {
        Ok::<_, valueset_cache::Error>(StatsResponse {
            value_sets: data.value_sets.len().await?,
            element_sets: data.element_sets.len().await?,
            services: data.services.len().await?,
            clients: data.clients.len().await?,
            pending_requests: data.requests.len().await?,
            queued_values: data.value_queue.len().await?,
            statistics: state.statistics.snapshot(),
        })
    };

    match sizes.await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            error!(error = %e, "Stats failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Fetch a value set by key
async fn get_value(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ValueParams>,
) -> Response {
    let entry = match state.data.value_sets.get(&params.key).await {
        Ok(Some(entry)) => entry,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Value set not found"),
        Err(e) => {
            error!(error = %e, key = %params.key, "Value lookup failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    match entry.values() {
        Ok(values) => Json(ValueSetResponse {
            key: params.key,
            address: entry.address,
            needs_upload: entry.needs_upload,
            values,
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, key = %params.key, "Stored payload does not decode");
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}

/// Publish a value set through the write-behind queue
async fn publish_value(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PublishRequest>,
) -> impl IntoResponse {
    let entry = match ValueSetEntry::from_values(req.address, req.needs_upload, &req.values) {
        Ok(entry) => entry,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(PublishResponse {
                    success: false,
                    key: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    };
    let key = entry.key();

    let started = Instant::now();
    match state.data.value_queue.put(&entry).await {
        Ok(()) => {
            state
                .statistics
                .record_duration(stats::ENTRY_INSERT_TIME_MS, started.elapsed());
            (
                StatusCode::ACCEPTED,
                Json(PublishResponse {
                    success: true,
                    key: Some(key.to_string()),
                    error: None,
                }),
            )
        }
        Err(e) => {
            error!(error = %e, key = %key, "Publish failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PublishResponse {
                    success: false,
                    key: Some(key.to_string()),
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

/// Take the next pending request, waiting up to `wait_ms`
async fn next_request(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NextRequestParams>,
) -> Response {
    let wait = Duration::from_millis(params.wait_ms.min(state.config.max_wait_ms));
    match state.data.requests.poll(wait).await {
        Ok(Some(request)) => {
            state.statistics.increment("RequestsServed");
            Json(request).into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!(error = %e, "Request poll failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Element-set metadata by id
async fn get_element_set(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.data.element_sets.get(&id).await {
        Ok(Some(element_set)) => Json(element_set).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Element set not found"),
        Err(e) => {
            error!(error = %e, element_set = %id, "Element set lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// =============================================================================
// Server Initialization
// =============================================================================

/// Load configuration from file or environment
fn load_config() -> ServerConfig {
    config::load_layered(CONFIG_ENV, CONFIG_FILE, |path| config::read_toml(path))
}

/// Build the router with all endpoints
fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health and metrics
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        // API v1
        .route("/api/v1/values", get(get_value).post(publish_value))
        .route("/api/v1/requests/next", get(next_request))
        .route("/api/v1/element-sets/:id", get(get_element_set))
        .route("/api/v1/stats", get(get_stats))
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("valueset_cache=info".parse()?)
                .add_directive("server=info".parse()?),
        )
        .init();

    info!("Value-set store node starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = load_config();
    info!("Listen address: {}", config.listen_addr);

    let state = Arc::new(AppState::new(config.clone()));

    // Background write-behind drain
    let mut services = ServiceManager::new(ServiceConfig::default());
    services.register(Arc::new(QueueDrainService::new(
        QueueDrainConfig {
            poll_timeout: Duration::from_millis(config.drain_poll_ms),
        },
        state.data.clone(),
    )));
    services.start_all();

    let app = build_router(state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    services.shutdown().await?;
    info!("Server shutdown complete");
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
