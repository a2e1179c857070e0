//! Client configuration.

use crate::error::{EsClientError, Result};
use std::time::Duration;

/// Default number of actions per bulk request.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Upper bound on the number of actions per bulk request.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// What to do when a host answers with an error status (>= 400).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Surface the response as [`EsClientError::Application`].
    #[default]
    Propagate,
    /// Log the response and resolve with no value.
    ///
    /// Scroll streams in this mode end quietly on a failed page instead of
    /// yielding the error.
    BestEffort,
}

impl ErrorPolicy {
    /// Parse a policy name (`propagate`, `best-effort`).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "propagate" | "strict" => Some(Self::Propagate),
            "best-effort" | "best_effort" | "besteffort" | "lenient" => Some(Self::BestEffort),
            _ => None,
        }
    }
}

/// Elasticsearch client configuration.
#[derive(Debug, Clone)]
pub struct EsClientConfig {
    /// Base URLs of the cluster hosts.
    pub hosts: Vec<String>,
    /// Basic auth username.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout.
    pub request_timeout: Duration,
    /// How long a host stays out of rotation after a transport failure.
    pub cool_down: Duration,
    /// Default number of actions per bulk request.
    pub batch_size: usize,
    /// Default scroll context lifetime.
    pub scroll_ttl: Duration,
    /// Document type segment used in document paths.
    pub doc_type: String,
    /// Handling of error status responses.
    pub error_policy: ErrorPolicy,
    /// User agent string.
    pub user_agent: String,
    /// Enable gzip response decompression.
    pub gzip: bool,
}

impl Default for EsClientConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            cool_down: Duration::from_secs(60),
            batch_size: DEFAULT_BATCH_SIZE,
            scroll_ttl: Duration::from_secs(60),
            doc_type: "_doc".to_string(),
            error_policy: ErrorPolicy::Propagate,
            user_agent: format!("esops/{}", env!("CARGO_PKG_VERSION")),
            gzip: true,
        }
    }
}

impl EsClientConfig {
    /// Create a configuration for a single host.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            hosts: vec![url.into()],
            ..Default::default()
        }
    }

    /// Create a configuration for several hosts of one cluster.
    pub fn cluster<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: urls.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Create a new configuration builder.
    pub fn builder() -> EsClientConfigBuilder {
        EsClientConfigBuilder::default()
    }

    /// Load configuration from `ESOPS_*` environment variables.
    ///
    /// - `ESOPS_HOSTS` - comma separated host URLs (required)
    /// - `ESOPS_USERNAME` / `ESOPS_PASSWORD` - basic auth
    /// - `ESOPS_COOL_DOWN_SECS`, `ESOPS_SCROLL_TTL_SECS`, `ESOPS_REQUEST_TIMEOUT_SECS`
    /// - `ESOPS_BATCH_SIZE`, `ESOPS_DOC_TYPE`
    /// - `ESOPS_ERROR_POLICY=propagate|best-effort`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let hosts: Vec<String> = lookup("ESOPS_HOSTS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if hosts.is_empty() {
            return Err(EsClientError::Config("ESOPS_HOSTS is not set".to_string()));
        }

        let mut config = Self::cluster(hosts);
        config.username = lookup("ESOPS_USERNAME");
        config.password = lookup("ESOPS_PASSWORD");

        if let Some(secs) = parse_var(&lookup, "ESOPS_COOL_DOWN_SECS")? {
            config.cool_down = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "ESOPS_SCROLL_TTL_SECS")? {
            config.scroll_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "ESOPS_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = parse_var(&lookup, "ESOPS_BATCH_SIZE")? {
            config.batch_size = clamp_batch_size(size as usize);
        }
        if let Some(doc_type) = lookup("ESOPS_DOC_TYPE") {
            config.doc_type = doc_type;
        }
        if let Some(policy) = lookup("ESOPS_ERROR_POLICY") {
            config.error_policy = ErrorPolicy::from_str(&policy).ok_or_else(|| {
                EsClientError::Config(format!("Unknown ESOPS_ERROR_POLICY: {}", policy))
            })?;
        }

        Ok(config)
    }

    /// Resolve the batch size for one bulk call, falling back to the configured default.
    pub fn effective_batch_size(&self, requested: Option<usize>) -> usize {
        clamp_batch_size(requested.unwrap_or(self.batch_size))
    }

    /// Check the configuration before building a client.
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(EsClientError::Config("No hosts provided".to_string()));
        }
        Ok(())
    }
}

fn parse_var<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map_err(|e| EsClientError::Config(format!("Invalid {}: {}", key, e)))
        })
        .transpose()
}

/// Clamp a batch size into `[1, MAX_BATCH_SIZE]`.
pub fn clamp_batch_size(size: usize) -> usize {
    size.clamp(1, MAX_BATCH_SIZE)
}

/// Builder for client configuration.
#[derive(Debug, Default)]
pub struct EsClientConfigBuilder {
    config: EsClientConfig,
}

impl EsClientConfigBuilder {
    /// Add a host URL.
    pub fn host(mut self, url: impl Into<String>) -> Self {
        self.config.hosts.push(url.into());
        self
    }

    /// Replace the host list.
    pub fn hosts<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.hosts = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Set basic authentication credentials.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the host cool-down interval.
    pub fn cool_down(mut self, cool_down: Duration) -> Self {
        self.config.cool_down = cool_down;
        self
    }

    /// Set the default bulk batch size (clamped to `[1, 10000]`).
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = clamp_batch_size(size);
        self
    }

    /// Set the default scroll lifetime.
    pub fn scroll_ttl(mut self, ttl: Duration) -> Self {
        self.config.scroll_ttl = ttl;
        self
    }

    /// Set the document type path segment.
    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.config.doc_type = doc_type.into();
        self
    }

    /// Set the error status policy.
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.config.error_policy = policy;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Enable or disable gzip.
    pub fn gzip(mut self, enable: bool) -> Self {
        self.config.gzip = enable;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> EsClientConfig {
        self.config
    }
}
