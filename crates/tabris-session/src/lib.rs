//! Debug session manager for tabris apps running on a remote device.
//!
//! A device opens a WebSocket to `/debug?id=<sessionId>&server=<serverId>`.
//! The [`SessionManager`] admits at most one such connection at a time,
//! probes it with a heartbeat and exposes it through:
//!
//! - [`SessionManager::send`] for raw commands evaluated by the runtime
//! - [`SessionManager::subscribe`] for [`SessionEvent`] notifications
//! - [`SessionManager::close`] for operator-initiated teardown
//!
//! Connections presenting anything but the most recently issued session
//! id, or an id from another server instance, are closed with
//! [`CLOSE_OUTDATED`].
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use tabris_session::{SessionManager, ws_handler};
//!
//! let sessions = SessionManager::default();
//! let app = Router::new()
//!     .route("/debug", get(ws_handler))
//!     .with_state(sessions.clone());
//!
//! let id = sessions.new_session_id();
//! println!("{}", sessions.connection_url("192.168.0.2:8080", id));
//! ```

mod event;
mod manager;
mod protocol;
mod session;
mod websocket;

pub use event::{DisconnectReason, SessionEvent};
pub use manager::{Admission, DEFAULT_HEARTBEAT, SessionManager};
pub use protocol::{
    CLOSE_GOING_AWAY, CLOSE_NORMAL, CLOSE_OUTDATED, ClientMessage, Device, ProtocolError,
};
pub use websocket::{ConnectParams, ws_handler};

/// Something that can deliver a raw command to the device runtime.
///
/// Implemented by [`SessionManager`]; the reload watcher depends on this
/// trait only.
pub trait CommandSender: Send + Sync {
    /// Deliver `command`. Returns `false` if it was not sent.
    fn send(&self, command: &str) -> bool;
}

impl CommandSender for SessionManager {
    fn send(&self, command: &str) -> bool {
        SessionManager::send(self, command)
    }
}
