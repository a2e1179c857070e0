//! HTTP transport seam.
//!
//! The dispatcher talks to hosts through [`Transport`] so failover logic can be
//! exercised without a network. [`HttpTransport`] is the production
//! implementation over `reqwest`.

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use url::Url;

use crate::config::EsClientConfig;
use crate::error::{EsClientError, Result};

/// Content type of JSON request bodies.
pub const JSON: &str = "application/json";

/// Content type of newline-delimited bulk bodies.
pub const NDJSON: &str = "application/x-ndjson";

/// A single attempt against one host.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Fully resolved URL.
    pub url: Url,
    /// Materialized body, shared between attempts.
    pub body: Option<Bytes>,
    /// Content type of the body.
    pub content_type: &'static str,
}

/// A response as received, before any status classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response body.
    pub body: Bytes,
}

impl RawResponse {
    /// Create a response.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status signals an application-level error (>= 400).
    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }
}

/// Executes one HTTP exchange.
///
/// Implementations must return [`EsClientError::Transport`] when no response
/// was obtained and a [`RawResponse`] for every received status, including
/// error statuses.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request to the host named in its URL.
    async fn send(&self, request: TransportRequest) -> Result<RawResponse>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    inner: reqwest::Client,
    username: Option<String>,
    password: Option<String>,
}

impl HttpTransport {
    /// Build a transport from client configuration.
    pub fn new(config: &EsClientConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(config.gzip)
            .build()
            .map_err(|e| EsClientError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            inner,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Get the underlying reqwest client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse> {
        let host = request.url.origin().ascii_serialization();

        let mut builder = self
            .inner
            .request(request.method, request.url)
            .header(http::header::CONTENT_TYPE, request.content_type);

        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| EsClientError::Transport {
            host: host.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        // The host answered, so the request may already have been applied.
        // A body lost after the status line must not be replayed elsewhere.
        let body = response.bytes().await.map_err(|e| {
            EsClientError::Protocol(format!(
                "Failed to read {} response body from {}: {}",
                status, host, e
            ))
        })?;

        Ok(RawResponse { status, body })
    }
}
