//! WebSocket transport for debug sessions.
//!
//! Upgrades `GET /debug?id=<sessionId>&server=<serverId>` requests and
//! drives one admitted [`Session`] per connection: inbound frames,
//! outbound commands and the heartbeat all run in a single task.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};

use crate::manager::{Admission, SessionManager};
use crate::protocol::{CLOSE_GOING_AWAY, CLOSE_OUTDATED};
use crate::session::{Heartbeat, Outbound, Session};

/// Query parameters of a debug connection request.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Client-declared session id.
    pub id: Option<String>,
    /// Server instance the id was issued by.
    pub server: Option<String>,
}

impl From<ConnectParams> for Admission {
    fn from(params: ConnectParams) -> Self {
        Self {
            // An unparsable id can never match the issued one.
            session_id: params.id.and_then(|id| id.trim().parse().ok()),
            server_id: params.server,
        }
    }
}

/// Axum handler for the debug endpoint.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(manager): State<SessionManager>,
) -> Response {
    manager.upgrade(ws, params)
}

impl SessionManager {
    /// Complete a WebSocket upgrade and run the resulting session.
    pub fn upgrade(&self, ws: WebSocketUpgrade, params: ConnectParams) -> Response {
        let manager = self.clone();
        ws.on_upgrade(move |socket| async move { manager.accept(socket, params.into()).await })
    }

    /// Admit an established socket and run it until the session ends.
    ///
    /// Rejected connections receive a close frame with code 4900.
    pub async fn accept(&self, mut socket: WebSocket, admission: Admission) {
        let Some((session, outbound)) = self.admit(&admission) else {
            let _ = socket.send(close_message(CLOSE_OUTDATED)).await;
            return;
        };
        self.run_session(socket, &session, outbound).await;
        self.release(&session);
    }

    async fn run_session(
        &self,
        socket: WebSocket,
        session: &Arc<Session>,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
    ) {
        let (mut sink, mut stream) = socket.split();
        let period = self.heartbeat_interval();
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                biased;

                Some(message) = outbound.recv() => match message {
                    Outbound::Text(command) => {
                        if sink.send(Message::Text(command.into())).await.is_err() {
                            session.peer_closed();
                            break;
                        }
                    }
                    Outbound::Close(code) => {
                        let _ = sink.send(close_message(code)).await;
                        break;
                    }
                },

                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => session.handle_frame(text.as_str()),
                    Some(Ok(Message::Close(_)) | Err(_)) | None => {
                        session.peer_closed();
                        break;
                    }
                    // Pong, ping and binary frames only count as traffic.
                    Some(Ok(_)) => session.mark_alive(),
                },

                _ = ticker.tick() => match session.heartbeat() {
                    Heartbeat::Probe => {
                        if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                            session.peer_closed();
                            break;
                        }
                    }
                    Heartbeat::Expired => {
                        tracing::warn!(session_id = session.id(), "Heartbeat missed, closing session");
                        let _ = sink.send(close_message(CLOSE_GOING_AWAY)).await;
                        break;
                    }
                    Heartbeat::Stopped => break,
                },
            }
        }
    }
}

fn close_message(code: u16) -> Message {
    let reason = match code {
        CLOSE_OUTDATED => "outdated",
        CLOSE_GOING_AWAY => "heartbeat timeout",
        _ => "",
    };
    Message::Close(Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    }))
}
