// In-memory transport and concatenator for exercising the pipeline without network or ffmpeg.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

use crate::hls::assembler::{Concatenator, ToolOutput};
use crate::hls::fetcher::{ByteRange, ByteStream, FetchedText, HttpTransport};
use crate::{FetchError, VodError};

#[derive(Debug, Clone)]
struct Route {
    body: Result<Bytes, u16>,
    delay: Duration,
    effective_url: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub url: String,
    pub referer: Option<String>,
    pub range: Option<ByteRange>,
}

/// Routes by exact URL. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub(crate) struct FakeTransport {
    routes: HashMap<String, Route>,
    requests: Mutex<Vec<RecordedRequest>>,
    attempts: Mutex<HashMap<String, usize>>,
    /// url -> number of leading attempts answered with 503
    flaky: HashMap<String, usize>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, url: &str, body: &str) -> Self {
        self.with_bytes(url, body.as_bytes().to_vec())
    }

    pub fn with_bytes(mut self, url: &str, body: impl Into<Bytes>) -> Self {
        self.routes.insert(
            url.to_string(),
            Route {
                body: Ok(body.into()),
                delay: Duration::ZERO,
                effective_url: None,
            },
        );
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.routes.insert(
            url.to_string(),
            Route {
                body: Err(status),
                delay: Duration::ZERO,
                effective_url: None,
            },
        );
        self
    }

    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        if let Some(route) = self.routes.get_mut(url) {
            route.delay = delay;
        }
        self
    }

    pub fn with_redirect(mut self, url: &str, effective_url: &str) -> Self {
        if let Some(route) = self.routes.get_mut(url) {
            route.effective_url = Some(effective_url.to_string());
        }
        self
    }

    /// The first `failures` requests for `url` answer 503.
    pub fn with_flaky(mut self, url: &str, failures: usize) -> Self {
        self.flaky.insert(url.to_string(), failures);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn attempts(&self, url: &str) -> usize {
        self.attempts.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    async fn respond(
        &self,
        url: &str,
        referer: Option<&str>,
        range: Option<ByteRange>,
    ) -> Result<(Bytes, String), FetchError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            referer: referer.map(str::to_string),
            range,
        });
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let Some(route) = self.routes.get(url) else {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            });
        };
        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }
        if self.flaky.get(url).is_some_and(|failures| attempt <= *failures) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 503,
            });
        }

        match &route.body {
            Ok(body) => Ok((
                body.clone(),
                route
                    .effective_url
                    .clone()
                    .unwrap_or_else(|| url.to_string()),
            )),
            Err(status) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn fetch_text(
        &self,
        url: &str,
        referer: Option<&str>,
        _timeout: Duration,
    ) -> Result<FetchedText, FetchError> {
        let (body, effective_url) = self.respond(url, referer, None).await?;
        Ok(FetchedText {
            body: String::from_utf8_lossy(&body).into_owned(),
            effective_url,
        })
    }

    async fn open_stream(
        &self,
        url: &str,
        referer: Option<&str>,
        range: Option<ByteRange>,
        _timeout: Duration,
    ) -> Result<ByteStream, FetchError> {
        let (mut body, _) = self.respond(url, referer, range).await?;
        if let Some(range) = range {
            let start = (range.start as usize).min(body.len());
            let end = (start + range.length as usize).min(body.len());
            body = body.slice(start..end);
        }
        // Two chunks, to exercise the chunked write path
        let middle = body.len() / 2;
        let chunks = vec![Ok(body.slice(..middle)), Ok(body.slice(middle..))];
        Ok(stream::iter(chunks).boxed())
    }
}

/// Concatenates the files named by the manifest, like `ffmpeg -f concat -c copy` would.
#[derive(Debug, Default)]
pub(crate) struct FakeConcatenator {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeConcatenator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes some bytes to the output and then exits non-zero.
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn manifest_paths(manifest: &str) -> Vec<String> {
    manifest
        .lines()
        .filter_map(|line| line.strip_prefix("file '")?.strip_suffix('\''))
        .map(|path| path.replace("'\\''", "'"))
        .collect()
}

#[async_trait]
impl Concatenator for FakeConcatenator {
    async fn concat(&self, manifest: &Path, output: &Path) -> Result<ToolOutput, VodError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let listing = tokio::fs::read_to_string(manifest)
            .await
            .map_err(|e| VodError::io("reading manifest", e))?;

        let mut joined = Vec::new();
        for path in manifest_paths(&listing) {
            let data = tokio::fs::read(&path)
                .await
                .map_err(|e| VodError::io(format!("reading {path}"), e))?;
            joined.extend_from_slice(&data);
        }

        if self.fail {
            tokio::fs::write(output, b"truncated")
                .await
                .map_err(|e| VodError::io("writing output", e))?;
            return Err(VodError::Concatenation {
                code: Some(1),
                stdout: String::new(),
                stderr: "Invalid data found when processing input".to_string(),
            });
        }

        tokio::fs::write(output, &joined)
            .await
            .map_err(|e| VodError::io("writing output", e))?;
        Ok(ToolOutput {
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}
