use std::sync::Arc;
use std::time::Duration;

use eureka_auth::TokenProvider;
use eureka_http::{HttpClientConfig, RetryConfig, TlsConfig, TransportSecurity};
use url::Url;

use crate::error::RegistryError;

pub const DEFAULT_USER_AGENT: &str = concat!("eureka-client/", env!("CARGO_PKG_VERSION"));

/// Largest registry response body read by default.
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Everything needed to build a [`Client`](crate::Client).
///
/// Start from [`ClientConfig::new`] and override fields with struct-update
/// syntax:
///
/// ```ignore
/// let config = ClientConfig {
///     retry: RetryConfig::new(3, RetryDelay::Constant(Duration::from_millis(250))),
///     ..ClientConfig::new(["http://registry-1:8761/eureka", "http://registry-2:8761/eureka"])
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Registry base URLs, tried in order. Their paths (e.g. `/eureka`) are kept.
    pub endpoints: Vec<String>,

    /// Attempt limit and delay strategy, applied per endpoint (default: one attempt).
    pub retry: RetryConfig,

    /// Timeout of a single attempt (default: 30 s).
    pub request_timeout: Duration,

    /// Deadline across all attempts on one endpoint (default: none).
    pub total_timeout: Option<Duration>,

    pub tls: TlsConfig,

    /// Plain-HTTP policy (default: allowed, with a warning at construction).
    pub transport: TransportSecurity,

    pub user_agent: String,

    /// Responses with a longer body fail to decode (default: 10 MiB).
    /// Full registry snapshots of large fleets may need more.
    pub max_body_size: usize,

    /// Source of the bearer token attached to every attempt.
    pub auth: Option<Arc<dyn TokenProvider>>,
}

impl ClientConfig {
    #[must_use]
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            total_timeout: None,
            tls: TlsConfig::default(),
            transport: TransportSecurity::AllowInsecureHttp,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            auth: None,
        }
    }

    /// Parse and check the endpoint list and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Config`] if the endpoint list is empty, an
    /// endpoint is not an absolute `http`/`https` URL (or is `http` while
    /// transport security is `TlsOnly`), or a timeout, the attempt limit or
    /// the body limit is zero.
    pub fn validate(&self) -> Result<Vec<Url>, RegistryError> {
        if self.endpoints.is_empty() {
            return Err(RegistryError::Config(
                "at least one endpoint is required".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(RegistryError::Config(
                "request_timeout must be greater than zero".into(),
            ));
        }
        if self.total_timeout.is_some_and(|t| t.is_zero()) {
            return Err(RegistryError::Config(
                "total_timeout must be greater than zero".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(RegistryError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.max_body_size == 0 {
            return Err(RegistryError::Config(
                "max_body_size must be greater than zero".into(),
            ));
        }

        self.endpoints
            .iter()
            .map(|raw| self.parse_endpoint(raw))
            .collect()
    }

    fn parse_endpoint(&self, raw: &str) -> Result<Url, RegistryError> {
        let url = Url::parse(raw)
            .map_err(|e| RegistryError::Config(format!("invalid endpoint '{raw}': {e}")))?;

        match url.scheme() {
            "https" => {}
            "http" if self.transport == TransportSecurity::AllowInsecureHttp => {}
            "http" => {
                return Err(RegistryError::Config(format!(
                    "endpoint '{raw}' uses http but transport security is TlsOnly"
                )));
            }
            other => {
                return Err(RegistryError::Config(format!(
                    "endpoint '{raw}' has unsupported scheme '{other}'"
                )));
            }
        }
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(RegistryError::Config(format!(
                "endpoint '{raw}' has no host"
            )));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(RegistryError::Config(format!(
                "endpoint '{raw}' must not carry a query or fragment"
            )));
        }
        Ok(url)
    }

    pub(crate) fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            request_timeout: self.request_timeout,
            total_timeout: self.total_timeout,
            user_agent: self.user_agent.clone(),
            retry: Some(self.retry.clone()),
            max_body_size: self.max_body_size,
            transport: self.transport,
            tls: self.tls,
            ..HttpClientConfig::default()
        }
    }
}

/// Settings for [`Client::watch_with`](crate::Client::watch_with).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    /// Time between polls; the first poll happens one interval after start.
    pub poll_interval: Duration,
    /// Capacity of the event channel. A full channel pauses polling.
    pub event_buffer: usize,
}

impl WatchConfig {
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..Self::default()
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            event_buffer: 64,
        }
    }
}
