// REST handlers: capabilities, interfaces, selection, limits, status

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};
use crate::error::validate_interface;
use crate::models::{CounterSample, Direction, ShapingState};
use crate::rate::RateUnit;
use crate::version::{NAME, VERSION};

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/capabilities: whether limits can be applied on this host.
pub(super) async fn capabilities_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.capabilities())
}

/// GET /api/interfaces: non-loopback interfaces with an IPv4 address.
pub(super) async fn list_interfaces(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let interfaces = state.sysinfo_repo.get_interfaces().await?;
    Ok(Json(interfaces))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub interface: Option<String>,
}

/// GET /api/selection: interface the throughput sampler follows.
pub(super) async fn get_selection(State(state): State<AppState>) -> impl IntoResponse {
    Json(Selection {
        interface: state.selected_tx.borrow().clone(),
    })
}

/// PUT /api/selection: switch the sampled interface and remember it.
pub(super) async fn put_selection(
    State(state): State<AppState>,
    Json(body): Json<Selection>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(name) = &body.interface {
        validate_interface(name)?;
    }
    state.selected_tx.send_replace(body.interface.clone());
    tracing::info!(interface = ?body.interface, "selected interface changed");

    let settings = state.settings.clone();
    let selected = body.interface.clone();
    let limits = selected
        .as_deref()
        .map(|name| state.orchestrator.get_state(name))
        .unwrap_or_default();
    tokio::task::spawn_blocking(move || {
        settings.update(|s| {
            s.interface = selected;
            s.record_state(&limits);
        })
    })
    .await?;
    Ok(Json(body))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsResponse {
    pub interface: String,
    #[serde(flatten)]
    pub state: ShapingState,
    pub redirect_holder: Option<String>,
}

fn limits_response(state: &AppState, interface: String) -> LimitsResponse {
    LimitsResponse {
        state: state.orchestrator.get_state(&interface),
        redirect_holder: state.orchestrator.redirect_holder(),
        interface,
    }
}

/// Persist limits when they belong to the selected interface.
async fn remember_limits(state: &AppState, interface: &str) -> Result<(), ApiError> {
    if state.selected_tx.borrow().as_deref() != Some(interface) {
        return Ok(());
    }
    let limits = state.orchestrator.get_state(interface);
    let settings = state.settings.clone();
    tokio::task::spawn_blocking(move || settings.update(|s| s.record_state(&limits))).await?;
    Ok(())
}

/// GET /api/interfaces/{name}/limits: in-memory shaping state, no kernel query.
pub(super) async fn get_limits(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_interface(&name)?;
    Ok(Json(limits_response(&state, name)))
}

/// Rate as typed by the operator; a bare JSON number is accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RateValue {
    Text(String),
    Number(f64),
}

impl RateValue {
    fn as_text(&self) -> String {
        match self {
            RateValue::Text(s) => s.clone(),
            RateValue::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitRequest {
    pub value: RateValue,
    pub unit: RateUnit,
}

/// PUT /api/interfaces/{name}/limits/{direction}: body `{"value": "2", "unit": "mbps"}`.
pub(super) async fn set_limit(
    State(state): State<AppState>,
    Path((name, direction)): Path<(String, String)>,
    Json(body): Json<LimitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let direction: Direction = direction.parse().map_err(ApiError::BadRequest)?;
    let orchestrator = state.orchestrator.clone();
    let interface = name.clone();
    let value = body.value.as_text();
    let limit = tokio::task::spawn_blocking(move || {
        orchestrator.set_limit(&interface, direction, &value, body.unit)
    })
    .await??;
    tracing::info!(interface = %name, %direction, kbps = limit.kbps, "limit set via API");
    remember_limits(&state, &name).await?;
    Ok(Json(limits_response(&state, name)))
}

/// DELETE /api/interfaces/{name}/limits: remove both limits (idempotent).
pub(super) async fn remove_all(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let orchestrator = state.orchestrator.clone();
    let interface = name.clone();
    tokio::task::spawn_blocking(move || orchestrator.remove_all(&interface)).await??;
    remember_limits(&state, &name).await?;
    Ok(Json(limits_response(&state, name)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub interface: String,
    /// Raw `tc` output; empty when nothing is installed or shaping is unsupported.
    pub qdiscs: String,
    pub counters: Option<CounterSample>,
    pub limits: ShapingState,
    pub diagnostics: Vec<String>,
}

/// GET /api/interfaces/{name}/status: installed qdiscs plus raw counters.
pub(super) async fn describe(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_interface(&name)?;
    let inspector = state.inspector.clone();
    let interface = name.clone();
    let qdiscs = tokio::task::spawn_blocking(move || inspector.describe(&interface)).await?;
    let counters = state.sysinfo_repo.get_counters(name.clone()).await?;
    Ok(Json(StatusResponse {
        limits: state.orchestrator.get_state(&name),
        diagnostics: state.orchestrator.diagnostics(),
        interface: name,
        qdiscs,
        counters,
    }))
}
