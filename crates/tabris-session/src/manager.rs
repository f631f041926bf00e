//! Session manager.
//!
//! Issues session identifiers, admits incoming connections and keeps track
//! of the single current session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::event::SessionEvent;
use crate::protocol::{CLOSE_OUTDATED, Device};
use crate::session::{Outbound, Session};

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(5);

/// Capacity of the event broadcast channel.
const EVENT_CAPACITY: usize = 100;

/// Connection parameters presented by a connecting device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Admission {
    /// Session id from the `id` query parameter. `None` when missing or
    /// not a number.
    pub session_id: Option<u64>,
    /// Server id from the `server` query parameter.
    pub server_id: Option<String>,
}

/// Manages the debug session of one server instance.
///
/// At most one session is current at a time. A newer admitted session
/// closes the previous one with close code 4900.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    server_id: Uuid,
    issued: AtomicU64,
    heartbeat: Duration,
    current: Mutex<Option<Arc<Session>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Create a manager with a fresh server id.
    #[must_use]
    pub fn new(heartbeat: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                server_id: Uuid::new_v4(),
                issued: AtomicU64::new(0),
                heartbeat,
                current: Mutex::new(None),
                events,
            }),
        }
    }

    /// Identifier of this server instance, fixed for its lifetime.
    #[must_use]
    pub fn server_id(&self) -> Uuid {
        self.inner.server_id
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        self.inner.heartbeat
    }

    /// Issue the next session id.
    ///
    /// Ids start at 1 and strictly increase. Issuing an id makes any
    /// connection presenting an older id outdated.
    pub fn new_session_id(&self) -> u64 {
        self.inner.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Most recently issued session id, 0 if none.
    #[must_use]
    pub fn current_session_id(&self) -> u64 {
        self.inner.issued.load(Ordering::SeqCst)
    }

    /// Id of the current session, if one is connected.
    #[must_use]
    pub fn active_session_id(&self) -> Option<u64> {
        self.lock_current().as_ref().map(|session| session.id())
    }

    /// Device descriptor of the current session, once it has introduced
    /// itself.
    #[must_use]
    pub fn current_device(&self) -> Option<Device> {
        self.lock_current().as_ref().and_then(|session| session.device())
    }

    /// Returns `true` if a session is current.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock_current().is_some()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Send a raw command to the current session.
    ///
    /// Returns `false` if there is no `Alive` session (including one whose
    /// heartbeat probe is unanswered) or the command is empty.
    pub fn send(&self, command: &str) -> bool {
        let Some(session) = self.lock_current().clone() else {
            return false;
        };
        session.send(command)
    }

    /// Close the current session with `code`.
    ///
    /// Idempotent: returns `false` if no session is current.
    pub fn close(&self, code: u16) -> bool {
        let Some(session) = self.lock_current().take() else {
            return false;
        };
        session.close(code)
    }

    /// Build the URL a device uses to open session `session_id`.
    ///
    /// `authority` is `host:port` as reachable from the device.
    #[must_use]
    pub fn connection_url(&self, authority: &str, session_id: u64) -> String {
        format!(
            "ws://{authority}/debug?id={session_id}&server={}",
            self.inner.server_id
        )
    }

    /// Admit a connection.
    ///
    /// Returns `None` if the connection targets another server instance or
    /// presents an id other than the most recently issued one. Otherwise the
    /// previous session, if any, is closed with close code 4900 and the new
    /// session becomes current.
    pub(crate) fn admit(
        &self,
        admission: &Admission,
    ) -> Option<(Arc<Session>, tokio::sync::mpsc::UnboundedReceiver<Outbound>)> {
        let server_matches = admission
            .server_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok())
            .is_some_and(|id| id == self.inner.server_id);
        if !server_matches {
            tracing::warn!(server = ?admission.server_id, "Rejected connection for another server");
            return None;
        }

        let mut current = self.lock_current();
        let latest = self.current_session_id();
        let Some(session_id) = admission.session_id.filter(|id| *id == latest && latest > 0)
        else {
            tracing::warn!(
                session_id = ?admission.session_id,
                latest,
                "Rejected outdated session"
            );
            return None;
        };

        if let Some(previous) = current.take() {
            tracing::warn!(session_id = previous.id(), "Closing outdated session");
            previous.close(CLOSE_OUTDATED);
        }

        let (session, outbound) = Session::new(session_id, self.inner.events.clone());
        session.activate();
        *current = Some(Arc::clone(&session));
        tracing::info!(session_id, "Debug session opened");
        Some((session, outbound))
    }

    /// Forget `session` if it is still current.
    pub(crate) fn release(&self, session: &Arc<Session>) {
        let mut current = self.lock_current();
        if current
            .as_ref()
            .is_some_and(|existing| Arc::ptr_eq(existing, session))
        {
            *current = None;
        }
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<Arc<Session>>> {
        self.inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("server_id", &self.inner.server_id)
            .field("current_session_id", &self.current_session_id())
            .field("active_session_id", &self.active_session_id())
            .finish_non_exhaustive()
    }
}
