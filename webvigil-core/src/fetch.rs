//! Conditional HTTP fetching with size caps and cancellation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderName};
use reqwest::{Client, Response, StatusCode, redirect};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::pool::BufferPool;

const ERROR_BODY_EXCERPT_LIMIT: usize = 1024;
const MAX_REDIRECTS: usize = 5;

/// Conditional headers carried forward from the previous observation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheHints {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheHints {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Body-bearing result of a 2xx fetch.
#[derive(Clone, Debug)]
pub struct FetchResult {
    pub url: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub http_status: u16,
    pub fetched_at: DateTime<Utc>,
}

/// Successful fetch outcomes, including the 304 short-circuit.
#[derive(Clone, Debug)]
pub enum FetchOutcome {
    Fetched(FetchResult),
    /// Server confirmed the cached representation; headers only.
    NotModified {
        etag: Option<String>,
        last_modified: Option<String>,
        http_status: u16,
    },
}

/// Issues conditional GETs against monitored URLs.
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: Client,
    max_content_size: usize,
    pool: Arc<BufferPool>,
}

impl Fetcher {
    /// Build a fetcher (and its HTTP client) from the monitor config.
    pub fn new(config: &MonitorConfig, pool: Arc<BufferPool>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()?;
        Ok(Self {
            client,
            max_content_size: config.max_content_size,
            pool,
        })
    }

    /// Wrap an externally configured client, for embedders that share one.
    pub fn with_client(client: Client, max_content_size: usize, pool: Arc<BufferPool>) -> Self {
        Self {
            client,
            max_content_size,
            pool,
        }
    }

    /// Fetch `url`, sending conditional headers from `hints` unless
    /// `bypass_cache` is set.
    pub async fn fetch(
        &self,
        url: &str,
        token: &CancellationToken,
        hints: &CacheHints,
        bypass_cache: bool,
    ) -> Result<FetchOutcome> {
        let mut request = self.client.get(url);
        if !bypass_cache {
            if let Some(etag) = hints.etag.as_deref().filter(|etag| !etag.is_empty()) {
                request = request.header(header::IF_NONE_MATCH, etag);
            }
            if let Some(modified) = hints
                .last_modified
                .as_deref()
                .filter(|modified| !modified.is_empty())
            {
                request = request.header(header::IF_MODIFIED_SINCE, modified);
            }
        }

        let response = tokio::select! {
            _ = token.cancelled() => {
                return Err(MonitorError::Cancelled(format!("fetch aborted for {url}")));
            }
            sent = request.send() => sent?,
        };

        let status = response.status();
        let etag = header_string(&response, header::ETAG);
        let last_modified = header_string(&response, header::LAST_MODIFIED);
        let content_type = header_string(&response, header::CONTENT_TYPE).unwrap_or_default();

        if status == StatusCode::NOT_MODIFIED {
            trace!(url, "not modified");
            return Ok(FetchOutcome::NotModified {
                etag,
                last_modified,
                http_status: status.as_u16(),
            });
        }

        if !status.is_success() {
            let excerpt = self.read_excerpt(response, token).await;
            return Err(MonitorError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                excerpt,
            });
        }

        let body = self.read_body(url, response, token).await?;
        debug!(url, bytes = body.len(), status = status.as_u16(), "fetched");
        Ok(FetchOutcome::Fetched(FetchResult {
            url: url.to_string(),
            body,
            content_type,
            etag,
            last_modified,
            http_status: status.as_u16(),
            fetched_at: Utc::now(),
        }))
    }

    /// Stream the body, enforcing the configured size cap.
    async fn read_body(
        &self,
        url: &str,
        mut response: Response,
        token: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let hint = response
            .content_length()
            .map(|len| len.min(self.max_content_size as u64) as usize)
            .unwrap_or(0);
        let mut body = Vec::with_capacity(hint);

        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => {
                    return Err(MonitorError::Cancelled(format!("body read aborted for {url}")));
                }
                chunk = response.chunk() => chunk?,
            };
            let Some(chunk) = chunk else { break };
            if body.len() + chunk.len() > self.max_content_size {
                return Err(MonitorError::ContentTooLarge {
                    url: url.to_string(),
                    limit: self.max_content_size,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    /// Read up to 1 KiB of an error body for diagnostics. Best effort.
    async fn read_excerpt(&self, mut response: Response, token: &CancellationToken) -> String {
        let mut scratch = self.pool.acquire();
        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => break,
                chunk = response.chunk() => match chunk {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) | Err(_) => break,
                },
            };
            let remaining = ERROR_BODY_EXCERPT_LIMIT - scratch.len();
            scratch.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
            if scratch.len() >= ERROR_BODY_EXCERPT_LIMIT {
                break;
            }
        }
        String::from_utf8_lossy(&scratch).into_owned()
    }
}

fn header_string(response: &Response, name: HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
