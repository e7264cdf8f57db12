// HTTP + WebSocket routes

mod error;
mod http;
mod ws;

pub use error::ApiError;

use axum::{
    Router,
    routing::{get, put},
};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::{broadcast, watch};
use tower_http::cors::{Any, CorsLayer};

use crate::models::ThroughputEvent;
use crate::orchestrator::Orchestrator;
use crate::settings::SettingsStore;
use crate::status::StatusInspector;
use crate::sysinfo_repo::SysinfoRepo;

/// Everything the handlers need; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub inspector: Arc<StatusInspector>,
    pub sysinfo_repo: Arc<SysinfoRepo>,
    pub throughput_tx: broadcast::Sender<ThroughputEvent>,
    /// Interface the sampler follows.
    pub selected_tx: Arc<watch::Sender<Option<String>>>,
    pub settings: Arc<SettingsStore>,
    pub ws_throughput_connections: Arc<AtomicUsize>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "NetThrottle: traffic shaping daemon" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/capabilities", get(http::capabilities_handler)) // GET /api/capabilities
        .route("/api/interfaces", get(http::list_interfaces)) // GET /api/interfaces
        .route(
            "/api/selection",
            get(http::get_selection).put(http::put_selection),
        ) // GET, PUT /api/selection
        .route(
            "/api/interfaces/{name}/limits",
            get(http::get_limits).delete(http::remove_all),
        ) // GET, DELETE /api/interfaces/{name}/limits
        .route(
            "/api/interfaces/{name}/limits/{direction}",
            put(http::set_limit),
        ) // PUT /api/interfaces/{name}/limits/{direction}
        .route("/api/interfaces/{name}/status", get(http::describe)) // GET /api/interfaces/{name}/status
        .route("/ws/throughput", get(ws::ws_throughput)) // WS /ws/throughput
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
