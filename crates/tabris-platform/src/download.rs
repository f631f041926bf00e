//! Progressive file downloader.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::error::DownloadError;
use crate::transport::{DownloadRequest, HttpTransport};

const CHUNK_SIZE: usize = 64 * 1024;

/// Bytes received so far during one download.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DownloadProgress {
    pub current: u64,
    /// Declared content length, if the server sent one.
    pub total: Option<u64>,
}

/// Streams a response body to a file, reporting progress per chunk.
#[derive(Clone)]
pub struct FileDownloader {
    transport: Arc<dyn HttpTransport>,
}

impl FileDownloader {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Download `request` into `destination`.
    ///
    /// Returns the number of bytes written. A non-200 status fails with
    /// [`DownloadError::UnexpectedStatus`] before `destination` is
    /// created. On any failure no file is left behind.
    pub fn download_file(
        &self,
        request: &DownloadRequest,
        destination: &Path,
        mut on_progress: impl FnMut(DownloadProgress),
    ) -> Result<u64, DownloadError> {
        let response = self.transport.get(request)?;
        if response.status != 200 {
            return Err(DownloadError::UnexpectedStatus {
                status: response.status,
            });
        }

        let total = response.content_length;
        let result = stream_to_file(response.body, destination, total, &mut on_progress);
        if result.is_err() {
            let _ = fs::remove_file(destination);
        }
        result
    }
}

fn stream_to_file(
    mut body: Box<dyn Read>,
    destination: &Path,
    total: Option<u64>,
    on_progress: &mut impl FnMut(DownloadProgress),
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(File::create(destination)?);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut current = 0u64;

    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        writer.write_all(&buf[..n])?;
        current += n as u64;
        on_progress(DownloadProgress { current, total });
    }
    writer.flush()?;

    if let Some(expected) = total
        && expected != current
    {
        return Err(DownloadError::Incomplete {
            expected,
            received: current,
        });
    }
    Ok(current)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::transport::HttpResponse;

    /// Canned response served by [`FakeTransport`].
    pub(crate) struct FakeResponse {
        pub status: u16,
        pub content_length: Option<u64>,
        pub body: Vec<u8>,
        /// Split the body into reads of this size.
        pub chunk: usize,
    }

    impl FakeResponse {
        pub(crate) fn ok(body: Vec<u8>) -> Self {
            Self {
                status: 200,
                content_length: Some(body.len() as u64),
                chunk: body.len().max(1),
                body,
            }
        }

        pub(crate) fn status(status: u16) -> Self {
            Self {
                status,
                content_length: None,
                body: Vec::new(),
                chunk: 1,
            }
        }
    }

    /// Serves queued responses in order and records requests.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        responses: Mutex<Vec<FakeResponse>>,
        pub requests: Mutex<Vec<DownloadRequest>>,
    }

    impl FakeTransport {
        pub(crate) fn new(responses: Vec<FakeResponse>) -> Arc<Self> {
            let mut responses = responses;
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn requests(&self) -> Vec<DownloadRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    /// Reader that yields at most `chunk` bytes per call.
    struct Chunked {
        inner: Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let len = buf.len().min(self.chunk);
            self.inner.read(&mut buf[..len])
        }
    }

    impl HttpTransport for FakeTransport {
        fn get(&self, request: &DownloadRequest) -> Result<HttpResponse, DownloadError> {
            self.requests.lock().unwrap().push(request.clone());
            let response = self
                .responses
                .lock()
                .unwrap()
                .pop()
                .expect("unexpected request");
            Ok(HttpResponse {
                status: response.status,
                content_length: response.content_length,
                body: Box::new(Chunked {
                    inner: Cursor::new(response.body),
                    chunk: response.chunk,
                }),
            })
        }
    }

    fn downloader(responses: Vec<FakeResponse>) -> FileDownloader {
        FileDownloader::new(FakeTransport::new(responses))
    }

    #[test]
    fn test_download_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("file");

        let written = downloader(vec![FakeResponse::ok(b"foo".to_vec())])
            .download_file(&DownloadRequest::new("https://x/file"), &destination, |_| {})
            .unwrap();

        assert_eq!(written, 3);
        assert_eq!(fs::read(&destination).unwrap(), b"foo");
    }

    #[test]
    fn test_download_reports_progress_per_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("file");
        let mut response = FakeResponse::ok(b"foobar".to_vec());
        response.chunk = 3;

        let mut progress = Vec::new();
        downloader(vec![response])
            .download_file(&DownloadRequest::new("https://x/file"), &destination, |p| {
                progress.push(p);
            })
            .unwrap();

        assert_eq!(
            progress,
            vec![
                DownloadProgress {
                    current: 3,
                    total: Some(6),
                },
                DownloadProgress {
                    current: 6,
                    total: Some(6),
                },
            ]
        );
    }

    #[test]
    fn test_unexpected_status_carries_code_and_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("file");

        let err = downloader(vec![FakeResponse::status(1234)])
            .download_file(&DownloadRequest::new("https://x/file"), &destination, |_| {})
            .unwrap_err();

        assert_eq!(err.status(), Some(1234));
        assert_eq!(err.to_string(), "Unexpected status code 1234");
        assert!(!destination.exists());
    }

    #[test]
    fn test_short_body_is_incomplete_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("file");
        let mut response = FakeResponse::ok(b"foo".to_vec());
        response.content_length = Some(1000);

        let err = downloader(vec![response])
            .download_file(&DownloadRequest::new("https://x/file"), &destination, |_| {})
            .unwrap_err();

        assert!(matches!(
            err,
            DownloadError::Incomplete {
                expected: 1000,
                received: 3,
            }
        ));
        assert!(!destination.exists());
    }

    #[test]
    fn test_missing_content_length_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("file");
        let mut response = FakeResponse::ok(b"foo".to_vec());
        response.content_length = None;

        let mut last = None;
        downloader(vec![response])
            .download_file(&DownloadRequest::new("https://x/file"), &destination, |p| {
                last = Some(p);
            })
            .unwrap();

        assert_eq!(
            last,
            Some(DownloadProgress {
                current: 3,
                total: None,
            })
        );
    }

    #[test]
    fn test_request_is_passed_to_transport() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new(vec![FakeResponse::ok(Vec::new())]);
        let request = DownloadRequest::new("https://x/file").header("X-Test", "1");

        FileDownloader::new(Arc::clone(&transport) as Arc<dyn HttpTransport>)
            .download_file(&request, &dir.path().join("file"), |_| {})
            .unwrap();

        assert_eq!(transport.requests(), vec![request]);
    }
}
