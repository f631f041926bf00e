//! Project file serving.
//!
//! Serves files from the project directory and reports each delivered path
//! to the reload watcher. Directories are answered with a listing.

use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use percent_encoding::percent_decode_str;

use crate::state::AppState;

/// Serve a project file or directory listing.
pub(crate) async fn serve_file(State(state): State<Arc<AppState>>, req: Request<Body>) -> Response {
    let Some(relative) = validate_path(req.uri().path()) else {
        return (StatusCode::BAD_REQUEST, "Invalid path").into_response();
    };
    let path = state.project_dir.join(&relative);

    let Ok(metadata) = tokio::fs::metadata(&path).await else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let response = if metadata.is_dir() {
        match list_directory(&path, req.uri().path()).await {
            Ok(listing) => Html(listing).into_response(),
            Err(e) => return internal_error(&path, &e),
        }
    } else {
        match tokio::fs::read(&path).await {
            Ok(content) => (
                [(header::CONTENT_TYPE, mime_for(&path))],
                Body::from(content),
            )
                .into_response(),
            Err(e) => return internal_error(&path, &e),
        }
    };

    tracing::debug!(path = %relative.display(), "Delivered");
    if let Some(watcher) = &state.watcher
        && let Err(e) = watcher.observe(&path)
    {
        tracing::warn!(path = %path.display(), error = %e, "Failed to watch delivered file");
    }
    response
}

/// Decode a request path into a path relative to the project root.
///
/// Returns `None` for paths with `..` components or that do not decode.
pub(crate) fn validate_path(uri_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(uri_path).decode_utf8().ok()?;
    let mut relative = PathBuf::new();
    for component in Path::new(decoded.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(relative)
}

fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_owned()
}

async fn list_directory(dir: &Path, uri_path: &str) -> std::io::Result<String> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();

    let base = if uri_path.ends_with('/') {
        uri_path.to_owned()
    } else {
        format!("{uri_path}/")
    };
    let mut html = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Index of {0}</title></head>\n<body><h1>Index of {0}</h1>\n<ul>\n",
        escape_html(&base)
    );
    for name in names {
        let escaped = escape_html(&name);
        let _ = writeln!(html, "<li><a href=\"{}{escaped}\">{escaped}</a></li>", escape_html(&base));
    }
    html.push_str("</ul></body></html>\n");
    Ok(html)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn internal_error(path: &Path, error: &std::io::Error) -> Response {
    tracing::warn!(path = %path.display(), error = %error, "Failed to read project file");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}
