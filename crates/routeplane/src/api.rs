//! Admin API endpoints

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use routeplane_sdk::Message;
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::control::{ControlChannel, ControlError, SignalOutcome};
use crate::engine::{EngineStatus, RouteSummary, RoutingEngine};
use crate::environment;
use crate::runtime::actor::ActorError;

/// Shared application state
pub struct AppState {
    pub channel: ControlChannel,
    pub engine: Arc<RoutingEngine>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()) }
    }
}

/// Build the admin router.
pub fn admin_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/routes", get(list_routes))
        .route("/control", post(send_control))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub engine: EngineStatus,
    pub routes: usize,
    pub terminated: bool,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Health>> {
    Json(ApiResponse::ok(Health {
        status: "healthy",
        engine: state.engine.status(),
        routes: state.engine.route_count(),
        terminated: state.channel.termination().is_terminated(),
    }))
}

/// List installed routes
pub async fn list_routes(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<RouteSummary>>> {
    Json(ApiResponse::ok(state.engine.routes()))
}

/// Forward a control message to the control channel.
///
/// The `signal` and `payload-classifier` request headers become message
/// headers; the request body becomes the message body.
pub async fn send_control(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<ApiResponse<SignalOutcome>>) {
    let mut message = if body.is_empty() {
        Message::new()
    } else {
        Message::with_body(body)
    };
    for name in [environment::SIGNAL, environment::PAYLOAD_CLASSIFIER] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            message.set_header(name, value);
        }
    }

    match state.channel.request(message).await {
        Ok(outcome) => (StatusCode::OK, Json(ApiResponse::ok(outcome))),
        Err(e) => {
            tracing::warn!(error = %e, "Control request rejected");
            (status_for(&e), Json(ApiResponse::err(e.to_string())))
        }
    }
}

fn status_for(error: &ControlError) -> StatusCode {
    match error {
        ControlError::Actor(ActorError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        ControlError::Actor(ActorError::ChannelClosed) => StatusCode::SERVICE_UNAVAILABLE,
        ControlError::Actor(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}
