//! Notifications published by the session manager.

use crate::protocol::Device;

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Closed by the server with the given close code (operator close or
    /// superseded by a newer session).
    Closed(u16),
    /// The peer did not answer a heartbeat probe within one interval.
    HeartbeatTimeout,
    /// The peer closed the channel or the transport failed.
    PeerClosed,
}

/// Event delivered to [`SessionManager::subscribe`](crate::SessionManager::subscribe) receivers.
///
/// Each event fires at most once per occurrence; `Connected` and
/// `Disconnected` fire at most once per session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The runtime introduced itself.
    Connected {
        /// Session that sent the `connect` message.
        session_id: u64,
        /// Device descriptor from the message.
        device: Device,
    },
    /// A console log record from the runtime.
    Log {
        /// Originating session.
        session_id: u64,
        /// Record exactly as received.
        record: serde_json::Value,
    },
    /// Result of an interactive command.
    ActionResponse {
        /// Originating session.
        session_id: u64,
        /// Result exactly as received.
        result: serde_json::Value,
    },
    /// The session ended.
    Disconnected {
        /// Session that ended.
        session_id: u64,
        /// Cause of the disconnect.
        reason: DisconnectReason,
    },
}

impl SessionEvent {
    /// Session the event belongs to.
    #[must_use]
    pub fn session_id(&self) -> u64 {
        match self {
            Self::Connected { session_id, .. }
            | Self::Log { session_id, .. }
            | Self::ActionResponse { session_id, .. }
            | Self::Disconnected { session_id, .. } => *session_id,
        }
    }
}
