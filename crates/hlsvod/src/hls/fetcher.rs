// HTTP transport: playlist text and streamed segment bodies.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::header::{RANGE, REFERER};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::FetchError;

/// Chunked response body
pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

#[derive(Debug, Clone)]
pub struct FetchedText {
    pub body: String,
    /// URL after redirects. Relative URIs in the body resolve against this.
    pub effective_url: String,
}

/// Inclusive byte window of a sub-range segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn header_value(&self) -> String {
        let end = (self.start + self.length).saturating_sub(1);
        format!("bytes={}-{}", self.start, end)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET a text document. Non-2xx, connect failures and timeouts are errors.
    async fn fetch_text(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Duration,
    ) -> Result<FetchedText, FetchError>;

    /// GET a body as a stream of chunks. `timeout` bounds the whole exchange.
    async fn open_stream(
        &self,
        url: &str,
        referer: Option<&str>,
        range: Option<ByteRange>,
        timeout: Duration,
    ) -> Result<ByteStream, FetchError>;
}

/// Transport over one shared reqwest client, cheap to clone.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn send(
        &self,
        url: &str,
        referer: Option<&str>,
        range: Option<ByteRange>,
        timeout: Duration,
    ) -> Result<reqwest::Response, FetchError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn fetch_text(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Duration,
    ) -> Result<FetchedText, FetchError> {
        let response = self.send(url, referer, None, timeout).await?;
        let effective_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        debug!(url = %url, effective_url = %effective_url, bytes = body.len(), "Fetched playlist");
        Ok(FetchedText {
            body,
            effective_url,
        })
    }

    async fn open_stream(
        &self,
        url: &str,
        referer: Option<&str>,
        range: Option<ByteRange>,
        timeout: Duration,
    ) -> Result<ByteStream, FetchError> {
        let response = self.send(url, referer, range, timeout).await?;
        let status = response.status();
        let owned_url = url.to_string();
        let body = response
            .bytes_stream()
            .map_err(move |e| FetchError::from_reqwest(&owned_url, e))
            .boxed();

        match range {
            Some(range) if status != StatusCode::PARTIAL_CONTENT => {
                warn!(
                    url = %url,
                    status = status.as_u16(),
                    range = %range.header_value(),
                    "Server ignored Range, cutting the window from the full body"
                );
                Ok(slice_body(body, range))
            }
            _ => Ok(body),
        }
    }
}

/// Keep only the bytes of `range` from a body that starts at offset 0.
/// Stops reading once the window is complete.
fn slice_body(body: ByteStream, range: ByteRange) -> ByteStream {
    body.scan(
        (range.start, range.length),
        |(skip, remaining), item| {
            let next = match item {
                Err(e) => Some(Err(e)),
                Ok(_) if *remaining == 0 => None,
                Ok(chunk) => {
                    let len = chunk.len() as u64;
                    if *skip >= len {
                        *skip -= len;
                        Some(Ok(Bytes::new()))
                    } else {
                        let chunk = chunk.slice(*skip as usize..);
                        *skip = 0;
                        let take = (*remaining).min(chunk.len() as u64);
                        *remaining -= take;
                        Some(Ok(chunk.slice(..take as usize)))
                    }
                }
            };
            future::ready(next)
        },
    )
    .try_filter(|chunk| future::ready(!chunk.is_empty()))
    .boxed()
}
