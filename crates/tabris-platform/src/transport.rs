//! HTTP transport for downloads.

use std::io::Read;
use std::time::Duration;

use ureq::Agent;

use crate::error::DownloadError;

/// Connect timeout; transfers themselves are unbounded.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A GET request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Response head plus a streaming body.
pub struct HttpResponse {
    pub status: u16,
    /// Declared `Content-Length`, if any.
    pub content_length: Option<u64>,
    pub body: Box<dyn Read>,
}

/// Performs GET requests. Status codes are never treated as errors here.
pub trait HttpTransport: Send + Sync {
    fn get(&self, request: &DownloadRequest) -> Result<HttpResponse, DownloadError>;
}

/// Transport backed by a `ureq` agent.
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    #[must_use]
    pub fn new() -> Self {
        let agent = Agent::config_builder()
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for UreqTransport {
    fn get(&self, request: &DownloadRequest) -> Result<HttpResponse, DownloadError> {
        let mut builder = self.agent.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.call()?;

        let status = response.status().as_u16();
        let content_length = response
            .headers()
            .get("content-length")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok());
        let body = Box::new(response.into_body().into_reader());

        Ok(HttpResponse {
            status,
            content_length,
            body,
        })
    }
}
