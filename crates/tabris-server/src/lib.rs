//! Development server for tabris apps.
//!
//! Serves the project directory to a device and hosts its debug session:
//!
//! ```text
//! Device ──HTTP──► axum (tabris-server)
//!                    │
//!                    ├─► GET /debug          WebSocket ──► SessionManager
//!                    ├─► GET /debug/session  issue session id + URL
//!                    └─► GET /*              project files ──► ReloadWatcher::observe
//!
//! ReloadWatcher ──notify──► debounce ──► SessionManager::send("tabris.app.reload()")
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tabris_server::{DevServer, ServerOptions, shutdown_signal};
//!
//! let server = DevServer::bind(ServerOptions::new("./my-app")).await?;
//! println!("{}", server.debug_url()?);
//! server.run(shutdown_signal()).await?;
//! ```

mod app;
mod error;
mod handlers;
mod middleware;
mod state;
mod static_files;

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tabris_config::Config;
use tabris_session::{CLOSE_GOING_AWAY, CommandSender, SessionManager};
use tabris_watch::ReloadWatcher;
use tokio::net::TcpListener;

pub use error::ServerError;
use state::AppState;

/// Server options.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on (0 picks a free port).
    pub port: u16,
    /// Directory served to the device.
    pub project_dir: PathBuf,
    /// Reload the app when a delivered file changes.
    pub live_reload: bool,
    /// Quiet window before a reload.
    pub debounce: Duration,
    /// Session heartbeat interval.
    pub heartbeat: Duration,
}

impl ServerOptions {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
            project_dir: project_dir.into(),
            live_reload: true,
            debounce: tabris_watch::DEFAULT_DEBOUNCE,
            heartbeat: tabris_session::DEFAULT_HEARTBEAT,
        }
    }

    /// Options from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            project_dir: project_dir.into(),
            live_reload: config.live_reload.enabled,
            debounce: Duration::from_millis(config.live_reload.debounce_ms),
            heartbeat: Duration::from_millis(config.session.heartbeat_ms),
        }
    }
}

/// A bound, not yet running development server.
pub struct DevServer {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl DevServer {
    /// Validate the project directory and bind the listener.
    pub async fn bind(options: ServerOptions) -> Result<Self, ServerError> {
        if !options.project_dir.is_dir() {
            return Err(ServerError::NotADirectory(options.project_dir));
        }
        let project_dir = options.project_dir.canonicalize()?;

        let ip: IpAddr = options
            .host
            .parse()
            .map_err(|_| ServerError::InvalidAddress(options.host.clone()))?;
        let addr = SocketAddr::new(ip, options.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        let sessions = SessionManager::new(options.heartbeat);
        let watcher = if options.live_reload {
            let sender: Arc<dyn CommandSender> = Arc::new(sessions.clone());
            Some(Arc::new(ReloadWatcher::new(sender, options.debounce)?))
        } else {
            None
        };

        tracing::info!(address = %listener.local_addr()?, project = %project_dir.display(), "Server bound");
        Ok(Self {
            listener,
            state: Arc::new(AppState {
                project_dir,
                sessions,
                watcher,
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Session manager of this server.
    pub fn sessions(&self) -> &SessionManager {
        &self.state.sessions
    }

    /// Reload watcher, when live reload is enabled.
    pub fn watcher(&self) -> Option<&Arc<ReloadWatcher>> {
        self.state.watcher.as_ref()
    }

    /// `host:port` as reachable from a device on the network.
    pub fn external_authority(&self) -> Result<String, ServerError> {
        let addr = self.local_addr()?;
        let ip = if addr.ip().is_unspecified() {
            external_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
        } else {
            addr.ip()
        };
        Ok(SocketAddr::new(ip, addr.port()).to_string())
    }

    /// Issue a new session id and return the URL a device connects with.
    pub fn debug_url(&self) -> Result<String, ServerError> {
        let authority = self.external_authority()?;
        let id = self.state.sessions.new_session_id();
        Ok(self.state.sessions.connection_url(&authority, id))
    }

    /// Serve until `shutdown` completes.
    ///
    /// The reload watcher runs for the lifetime of the server. On shutdown
    /// the current session is closed so open WebSockets do not hold the
    /// server.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(watcher) = &self.state.watcher {
            watcher.start();
        }

        let sessions = self.state.sessions.clone();
        let watcher = self.state.watcher.clone();
        let app = app::create_router(Arc::clone(&self.state));

        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                sessions.close(CLOSE_GOING_AWAY);
                if let Some(watcher) = watcher {
                    watcher.stop();
                }
            })
            .await?;
        Ok(())
    }
}

/// Wait for Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Address of the interface used for outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
fn external_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::sync::oneshot;

    use super::*;

    fn options(dir: &std::path::Path) -> ServerOptions {
        ServerOptions {
            host: "127.0.0.1".to_owned(),
            port: 0,
            ..ServerOptions::new(dir)
        }
    }

    #[tokio::test]
    async fn test_bind_rejects_missing_project() {
        let dir = tempfile::tempdir().unwrap();
        let result = DevServer::bind(options(&dir.path().join("missing"))).await;
        assert!(matches!(result, Err(ServerError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_host() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = options(dir.path());
        options.host = "not an address".to_owned();
        let result = DevServer::bind(options).await;
        assert!(matches!(result, Err(ServerError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_debug_url_uses_bound_address() {
        let dir = tempfile::tempdir().unwrap();
        let server = DevServer::bind(options(dir.path())).await.unwrap();
        let port = server.local_addr().unwrap().port();

        let url = server.debug_url().unwrap();

        assert_eq!(
            url,
            format!(
                "ws://127.0.0.1:{port}/debug?id=1&server={}",
                server.sessions().server_id()
            )
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let server = DevServer::bind(options(dir.path())).await.unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(server.run(async move {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
