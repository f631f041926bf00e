//! Router construction.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::headers;
use crate::state::AppState;
use crate::static_files;

/// Create the application router.
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/debug", get(handlers::debug_socket))
        .route("/debug/session", get(handlers::new_session))
        .fallback(static_files::serve_file)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(headers::no_cache_layer())
                .layer(headers::content_type_options_layer()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use pretty_assertions::assert_eq;
    use tabris_session::{CommandSender, SessionManager};
    use tabris_watch::ReloadWatcher;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    fn project() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"main":"src/app.js"}"#).unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/app.js"), "console.log('hi');").unwrap();
        dir
    }

    fn state(project_dir: &Path, live_reload: bool) -> Arc<AppState> {
        let sessions = SessionManager::default();
        let watcher = live_reload.then(|| {
            let sender: Arc<dyn CommandSender> = Arc::new(sessions.clone());
            Arc::new(ReloadWatcher::new(sender, Duration::from_millis(100)).unwrap())
        });
        Arc::new(AppState {
            project_dir: project_dir.canonicalize().unwrap(),
            sessions,
            watcher,
        })
    }

    async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header(header::HOST, "192.168.0.2:8080")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_serves_project_file() {
        let dir = project();
        let (status, headers, body) = get(state(dir.path(), false), "/src/app.js").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "console.log('hi');");
        assert!(
            headers[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .contains("javascript")
        );
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = project();
        let (status, _, _) = get(state(dir.path(), false), "/src/missing.js").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_parent_components_are_rejected() {
        let dir = project();
        let (status, _, _) = get(state(dir.path(), false), "/src/%2e%2e/%2e%2e/etc/passwd").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_directory_listing() {
        let dir = project();
        let (status, headers, body) = get(state(dir.path(), false), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(
            headers[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
        assert!(body.contains(r#"<a href="/package.json">package.json</a>"#));
        assert!(body.contains(r#"<a href="/src/">src/</a>"#));
    }

    #[tokio::test]
    async fn test_delivered_file_is_observed() {
        let dir = project();
        let state = state(dir.path(), true);
        let watcher = Arc::clone(state.watcher.as_ref().unwrap());

        get(Arc::clone(&state), "/src/app.js").await;

        assert!(watcher.is_armed(&dir.path().join("src")));
        assert_eq!(watcher.armed_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_request_is_not_observed() {
        let dir = project();
        let state = state(dir.path(), true);
        let watcher = Arc::clone(state.watcher.as_ref().unwrap());

        get(Arc::clone(&state), "/src/missing.js").await;

        assert_eq!(watcher.armed_count(), 0);
    }

    #[tokio::test]
    async fn test_new_session_returns_id_and_url() {
        let dir = project();
        let state = state(dir.path(), false);
        let server_id = state.sessions.server_id();

        let (status, _, body) = get(Arc::clone(&state), "/debug/session").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["sessionId"], 1);
        assert_eq!(
            json["url"],
            format!("ws://192.168.0.2:8080/debug?id=1&server={server_id}")
        );

        let (_, _, body) = get(state, "/debug/session").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["sessionId"], 2);
    }
}
