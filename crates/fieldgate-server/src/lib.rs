//! Fieldgate gateway library logic.
//!
//! Devices publish telemetry, intrusion and registration events over a
//! pub-sub transport. The gateway persists readings, evaluates them against
//! the rule store, raises alerts, dispatches named callbacks (which publish
//! alerts back to devices or consult an external classifier), and keeps a
//! live registry of devices pruned by periodic health probes.

pub mod alerts;
pub mod api;
pub mod api_devices;
pub mod api_transport;
pub mod callbacks;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod ingest;
pub mod liveness;
pub mod registry;
pub mod transport;

use alerts::AlertLog;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use callbacks::{CallbackRegistry, Dispatcher};
use classifier::ClassifierClient;
use config::Config;
use engine::RuleEngine;
use fieldgate_db::DbPool;
use ingest::Ingestor;
use liveness::HealthProber;
use registry::ClientRegistry;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use transport::{BroadcastPublisher, InboundMessage};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Devices currently known to the gateway.
    pub clients: ClientRegistry,
    /// Active alerts.
    pub alerts: AlertLog,
    /// Feeds the ingestion pipeline.
    pub inbound_tx: mpsc::Sender<InboundMessage>,
    /// Outbound transport bus; the SSE bridge subscribes to it.
    pub outbound: BroadcastPublisher,
    /// Topic assumed for bridged messages that do not name one.
    pub subscribe_topic: String,
    /// HTTP client for settings passthrough, with a bounded timeout.
    pub device_http: reqwest::Client,
}

/// Every long-lived component of a running gateway.
///
/// `state` serves the HTTP surface; the caller is expected to spawn
/// [`ingest::run_pipeline`] with `ingestor`, `inbound_rx` and `max_in_flight`, and
/// [`liveness::start_liveness_task`] with `prober`.
pub struct Gateway {
    pub state: AppState,
    pub ingestor: Ingestor,
    pub inbound_rx: mpsc::Receiver<InboundMessage>,
    /// Concurrency limit for the ingestion pipeline.
    pub max_in_flight: usize,
    pub prober: HealthProber,
}

impl Gateway {
    /// Wires the registry, alert log, dispatcher, engine and transport.
    pub fn new(pool: DbPool, config: &Config) -> Self {
        let clients = ClientRegistry::new();
        let alerts = AlertLog::new();
        let outbound = BroadcastPublisher::new(config.transport.outbound_capacity);
        let (inbound_tx, inbound_rx) =
            transport::inbound_channel(config.transport.inbound_capacity);

        let classifier = ClassifierClient::new(&config.classifier.url, config.classifier.timeout());
        let dispatcher = Dispatcher::new(
            CallbackRegistry::with_builtins(),
            Arc::new(outbound.clone()),
            clients.clone(),
            classifier,
            &config.transport.alert_topic_base,
        );
        let engine = RuleEngine::new(pool.clone(), alerts.clone(), dispatcher);
        let ingestor = Ingestor::new(pool.clone(), clients.clone(), engine);

        let device_http = reqwest::Client::builder()
            .timeout(config.devices.request_timeout())
            .build()
            .unwrap_or_default();

        Self {
            state: AppState {
                pool,
                clients,
                alerts,
                inbound_tx,
                outbound,
                subscribe_topic: config.transport.subscribe_topic.clone(),
                device_http,
            },
            ingestor,
            inbound_rx,
            max_in_flight: config.transport.max_in_flight,
            prober: HealthProber::new(config.liveness.probe_timeout()),
        }
    }
}

/// Maximum request body size (64 KiB). Device events and settings are small.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/devices", get(api::list_devices_handler))
        .route("/api/devices/{deviceId}", get(api::get_device_handler))
        .route(
            "/api/devices/{deviceId}/settings",
            get(api_devices::get_settings_handler).post(api_devices::update_settings_handler),
        )
        .route("/api/alerts", get(api::list_alerts_handler))
        .route("/api/alerts/dismiss", post(api::dismiss_alert_at_handler))
        .route("/api/alerts/{alertId}", delete(api::dismiss_alert_handler))
        .route("/api/events", get(api::list_events_handler))
        .route("/api/rules", get(api::list_rules_handler))
        .route("/api/transport/inbound", post(api_transport::inbound_handler))
        .route("/api/transport/outbound", get(api_transport::outbound_stream_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
