//! Axum router and all HTTP handlers for spk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Tests compose the bare router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use spk_engine::EngineError;
use spk_registry::{AnalyticsRange, RegistryError, DEFAULT_RECENT_LIMIT};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info};

use crate::{
    api_types::{
        CheckInRequest, ErrorResponse, HealthResponse, RangeQuery, RecentQuery, ReserveRequest,
        ReserveResponse, SensorUpdateRequest, SensorUpdateResponse, SpaceAckResponse,
    },
    state::{AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/stream", get(stream))
        .route("/api/node/update", post(node_update))
        .route("/api/reserve", post(reserve))
        .route("/api/checkin", post(check_in))
        .route("/api/parking/status", get(parking_status))
        .route("/api/parking/status/:node_id", get(parking_status_one))
        .route("/api/admin/maintenance/:node_id", post(admin_maintenance))
        .route("/api/admin/resume/:node_id", post(admin_resume))
        .route("/api/admin/analytics/usage-by-node", get(usage_by_node))
        .route("/api/admin/analytics/summary", get(usage_summary))
        .route("/api/admin/analytics/recent-sessions", get(recent_sessions))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Registry failure or bad request parameter, rendered as
/// `{ "error": "<CODE>: <message>" }`.
pub enum ApiError {
    Registry(RegistryError),
    BadRequest(String),
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        ApiError::Registry(e)
    }
}

pub fn status_for(e: &RegistryError) -> StatusCode {
    match e {
        RegistryError::UnknownNode(_) => StatusCode::NOT_FOUND,
        RegistryError::Engine(EngineError::NotFound) => StatusCode::NOT_FOUND,
        RegistryError::Engine(EngineError::PreconditionFailed)
        | RegistryError::Engine(EngineError::InvalidReading) => StatusCode::BAD_REQUEST,
        RegistryError::Engine(EngineError::AlreadyCheckedIn) | RegistryError::Conflict { .. } => {
            StatusCode::CONFLICT
        }
        RegistryError::Engine(EngineError::InvalidToken) => StatusCode::FORBIDDEN,
        RegistryError::Engine(EngineError::DeadlineOutOfRange) | RegistryError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Registry(e) => {
                let status = status_for(&e);
                if status.is_server_error() {
                    error!(error = %e, "request failed");
                }
                (status, e.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, format!("BAD_REQUEST: {msg}")),
        };
        (status, Json(ErrorResponse { error: msg })).into_response()
    }
}

fn parse_range(raw: Option<&str>) -> Result<AnalyticsRange, ApiError> {
    raw.map(str::parse::<AnalyticsRange>)
        .transpose()
        .map(Option::unwrap_or_default)
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// Space operations
// ---------------------------------------------------------------------------

pub(crate) async fn node_update(
    State(st): State<Arc<AppState>>,
    Json(req): Json<SensorUpdateRequest>,
) -> Result<Json<SensorUpdateResponse>, ApiError> {
    let ack = st
        .registry
        .update_sensor(&req.node_id, req.sensor_status, req.distance_cm, st.now())
        .await?;
    st.publish(&ack.view);
    Ok(Json(ack.into()))
}

pub(crate) async fn reserve(
    State(st): State<Arc<AppState>>,
    Json(req): Json<ReserveRequest>,
) -> Result<Json<ReserveResponse>, ApiError> {
    let ticket = st
        .registry
        .reserve(&req.node_id, req.reserved, st.now())
        .await?;
    info!(node_id = %req.node_id, reserved = req.reserved, "reserve");
    st.publish(&ticket.view);
    Ok(Json(ticket.into()))
}

pub(crate) async fn check_in(
    State(st): State<Arc<AppState>>,
    Json(req): Json<CheckInRequest>,
) -> Result<Json<SpaceAckResponse>, ApiError> {
    let ack = st
        .registry
        .check_in(&req.node_id, &req.qr_token, st.now())
        .await?;
    info!(node_id = %req.node_id, "check-in");
    st.publish(&ack.view);
    Ok(Json(ack.into()))
}

pub(crate) async fn admin_maintenance(
    State(st): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> Result<Json<SpaceAckResponse>, ApiError> {
    let ack = st.registry.set_maintenance(&node_id, st.now()).await?;
    st.publish(&ack.view);
    let _ = st.bus.send(BusMsg::LogLine {
        level: "WARN".to_string(),
        msg: format!("{node_id} placed under maintenance"),
    });
    Ok(Json(ack.into()))
}

pub(crate) async fn admin_resume(
    State(st): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> Result<Json<SpaceAckResponse>, ApiError> {
    let ack = st.registry.resume(&node_id, st.now()).await?;
    st.publish(&ack.view);
    let _ = st.bus.send(BusMsg::LogLine {
        level: "INFO".to_string(),
        msg: format!("{node_id} resumed"),
    });
    Ok(Json(ack.into()))
}

// ---------------------------------------------------------------------------
// Status reads
// ---------------------------------------------------------------------------

pub(crate) async fn parking_status(State(st): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let views = st.registry.status_snapshot(st.now()).await?;
    Ok((StatusCode::OK, Json(views)).into_response())
}

pub(crate) async fn parking_status_one(
    State(st): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> Result<Response, ApiError> {
    let view = st.registry.space(&node_id, st.now()).await?;
    Ok((StatusCode::OK, Json(view)).into_response())
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

pub(crate) async fn usage_by_node(
    State(st): State<Arc<AppState>>,
    Query(q): Query<RangeQuery>,
) -> Result<Response, ApiError> {
    let range = parse_range(q.range.as_deref())?;
    let rows = st.registry.usage_by_node(range, st.now()).await?;
    Ok(Json(rows).into_response())
}

pub(crate) async fn usage_summary(
    State(st): State<Arc<AppState>>,
    Query(q): Query<RangeQuery>,
) -> Result<Response, ApiError> {
    let range = parse_range(q.range.as_deref())?;
    let summary = st.registry.usage_summary(range, st.now()).await?;
    Ok(Json(summary).into_response())
}

pub(crate) async fn recent_sessions(
    State(st): State<Arc<AppState>>,
    Query(q): Query<RecentQuery>,
) -> Result<Response, ApiError> {
    let range = parse_range(q.range.as_deref())?;
    let limit = q.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    let rows = st.registry.recent_sessions(limit, range, st.now()).await?;
    Ok(Json(rows).into_response())
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Space(_) => "space",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
