//! State of a single debug session.
//!
//! A [`Session`] is transport-agnostic: the WebSocket loop feeds it inbound
//! frames and heartbeat ticks and drains its outbound queue. All state
//! transitions happen here so they can be exercised without a socket.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::sync::{broadcast, mpsc};

use crate::event::{DisconnectReason, SessionEvent};
use crate::protocol::{ClientMessage, Device};

/// Lifecycle state of a session.
///
/// ```text
/// Connecting ──► Alive ⇄ Suspect ──► Closed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SessionState {
    /// Raw connection accepted, not yet admitted as current.
    Connecting,
    /// Admitted and known to be responsive.
    Alive,
    /// A heartbeat probe is outstanding.
    Suspect,
    /// Ended; never reused.
    Closed,
}

/// Instruction for the transport loop.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outbound {
    /// Transmit a raw command string.
    Text(String),
    /// Send a close frame with the given code and stop.
    Close(u16),
}

/// Outcome of a heartbeat tick.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Heartbeat {
    /// Send a liveness probe.
    Probe,
    /// The previous probe went unanswered; the session is now closed.
    Expired,
    /// The session is already closed.
    Stopped,
}

pub(crate) struct Session {
    id: u64,
    state: Mutex<SessionState>,
    device: OnceLock<Device>,
    outbound: mpsc::UnboundedSender<Outbound>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Create a session in the `Connecting` state together with the
    /// receiving end of its outbound queue.
    pub(crate) fn new(
        id: u64,
        events: broadcast::Sender<SessionEvent>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id,
            state: Mutex::new(SessionState::Connecting),
            device: OnceLock::new(),
            outbound,
            events,
        });
        (session, rx)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.lock_state()
    }

    pub(crate) fn device(&self) -> Option<Device> {
        self.device.get().cloned()
    }

    /// Promote a freshly admitted session to `Alive`.
    pub(crate) fn activate(&self) {
        let mut state = self.lock_state();
        if *state == SessionState::Connecting {
            *state = SessionState::Alive;
        }
    }

    /// Queue a raw command.
    ///
    /// Returns `false` for an empty command or a session that is not
    /// `Alive`, including one awaiting its heartbeat answer.
    pub(crate) fn send(&self, command: &str) -> bool {
        if command.is_empty() || self.state() != SessionState::Alive {
            return false;
        }
        self.outbound.send(Outbound::Text(command.to_owned())).is_ok()
    }

    /// Close the session with `code`.
    ///
    /// Fires the disconnect notification before the close frame is queued.
    /// Returns `false` if the session was already closed.
    pub(crate) fn close(&self, code: u16) -> bool {
        if !self.finish(DisconnectReason::Closed(code)) {
            return false;
        }
        let _ = self.outbound.send(Outbound::Close(code));
        true
    }

    /// Advance the heartbeat state machine by one interval.
    pub(crate) fn heartbeat(&self) -> Heartbeat {
        let mut state = self.lock_state();
        match *state {
            SessionState::Alive => {
                *state = SessionState::Suspect;
                Heartbeat::Probe
            }
            SessionState::Connecting => Heartbeat::Probe,
            SessionState::Suspect => {
                drop(state);
                if self.finish(DisconnectReason::HeartbeatTimeout) {
                    Heartbeat::Expired
                } else {
                    Heartbeat::Stopped
                }
            }
            SessionState::Closed => Heartbeat::Stopped,
        }
    }

    /// Record traffic from the peer.
    pub(crate) fn mark_alive(&self) {
        let mut state = self.lock_state();
        if *state == SessionState::Suspect {
            *state = SessionState::Alive;
        }
    }

    /// The peer went away without a close from our side.
    pub(crate) fn peer_closed(&self) {
        self.finish(DisconnectReason::PeerClosed);
    }

    /// Handle one inbound text frame.
    ///
    /// Malformed frames are dropped; they count as traffic but never end
    /// the session.
    pub(crate) fn handle_frame(&self, text: &str) {
        if self.state() == SessionState::Closed {
            return;
        }
        self.mark_alive();

        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(session_id = self.id, error = %e, "Dropped inbound frame");
                return;
            }
        };

        match message {
            ClientMessage::Connect(device) => {
                if self.device.set(device.clone()).is_err() {
                    tracing::debug!(session_id = self.id, "Ignored repeated connect message");
                    return;
                }
                tracing::info!(
                    session_id = self.id,
                    platform = %device.platform,
                    model = %device.model,
                    "Device connected"
                );
                self.emit(SessionEvent::Connected {
                    session_id: self.id,
                    device,
                });
            }
            ClientMessage::Log(record) => self.emit(SessionEvent::Log {
                session_id: self.id,
                record,
            }),
            ClientMessage::ActionResponse(result) => self.emit(SessionEvent::ActionResponse {
                session_id: self.id,
                result,
            }),
        }
    }

    /// Transition to `Closed` and fire the disconnect notification.
    ///
    /// Returns `false` if the session was already closed.
    fn finish(&self, reason: DisconnectReason) -> bool {
        {
            let mut state = self.lock_state();
            if *state == SessionState::Closed {
                return false;
            }
            *state = SessionState::Closed;
        }
        tracing::info!(session_id = self.id, ?reason, "Debug session closed");
        self.emit(SessionEvent::Disconnected {
            session_id: self.id,
            reason,
        });
        true
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
