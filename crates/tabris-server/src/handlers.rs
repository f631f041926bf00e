//! Debug endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, header};
use axum::response::Response;
use serde::Serialize;
use tabris_session::ConnectParams;

use crate::state::AppState;

/// Response of `GET /debug/session`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionResponse {
    pub(crate) session_id: u64,
    pub(crate) url: String,
}

/// `GET /debug`: hand the WebSocket to the session manager.
pub(crate) async fn debug_socket(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    state.sessions.upgrade(ws, params)
}

/// `GET /debug/session`: issue a session id and the URL to connect with.
///
/// The URL uses the `Host` the device reached us through.
pub(crate) async fn new_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<SessionResponse> {
    let authority = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    let session_id = state.sessions.new_session_id();
    tracing::info!(session_id, "Issued debug session");
    Json(SessionResponse {
        session_id,
        url: state.sessions.connection_url(authority, session_id),
    })
}
