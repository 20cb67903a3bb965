//! Assembly of the tower stack behind [`HttpClient`](crate::HttpClient).
//!
//! A request passes, outermost first, through
//! `Buffer → Retry → [auth] → error mapping → Timeout → User-Agent →
//! Decompression → connection pool`. Redirects are not followed, so a 3xx
//! is a non-2xx answer like any other.

use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tower::buffer::Buffer;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{Layer, ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

use crate::config::{HttpClientConfig, RetryConfig, TlsConfig, TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::{RetryLayer, UserAgentLayer};
use crate::response::ResponseBody;
use crate::tls;

/// A single request attempt: pool, decompression, User-Agent and the
/// per-attempt timeout. Auth layers wrap it and hand the same type back.
pub type AttemptService =
    BoxCloneService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

type Pool = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;
type AuthWrap = Box<dyn FnOnce(AttemptService) -> AttemptService + Send>;

/// Builds an [`HttpClient`](crate::HttpClient) from an [`HttpClientConfig`].
///
/// Most callers fill in a config and use [`with_config`](Self::with_config);
/// the setters cover the fields tests tweak most often.
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    auth: Option<AuthWrap>,
}

impl HttpClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self { config, auth: None }
    }

    /// Per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// `None` leaves the retry layer out of the stack.
    #[must_use]
    pub fn retry(mut self, retry: Option<RetryConfig>) -> Self {
        self.config.retry = retry;
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Shorthand for `.transport(TransportSecurity::AllowInsecureHttp)`,
    /// available in debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(self) -> Self {
        self.transport(TransportSecurity::AllowInsecureHttp)
    }

    /// Wrap every attempt in an auth layer.
    ///
    /// The wrapper sits inside the retry loop, so it runs again for each
    /// attempt and sees a refreshed credential. A later call replaces an
    /// earlier one.
    #[must_use]
    pub fn with_auth_layer(
        mut self,
        wrap: impl FnOnce(AttemptService) -> AttemptService + Send + 'static,
    ) -> Self {
        self.auth = Some(Box::new(wrap));
        self
    }

    /// # Errors
    ///
    /// Returns [`HttpError::Tls`] if the TLS setup fails (e.g. an empty OS
    /// store with [`TlsRootConfig::Native`]) and
    /// [`HttpError::InvalidHeaderValue`] for an unusable User-Agent.
    pub fn build(self) -> Result<crate::HttpClient, HttpError> {
        let Self { config, auth } = self;
        warn_about_weak_security(&config);

        let mut service = attempt_service(connection_pool(&config)?, &config)?;
        if let Some(wrap) = auth {
            service = wrap(service);
        }
        if let Some(retry) = config.retry.clone() {
            service = RetryLayer::with_total_timeout(retry, config.total_timeout)
                .layer(service)
                .boxed_clone();
        }

        // Buffer panics on a zero bound.
        let service = Buffer::new(service, config.buffer_capacity.max(1));
        Ok(crate::HttpClient {
            service,
            max_body_size: config.max_body_size,
            transport_security: config.transport,
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn warn_about_weak_security(config: &HttpClientConfig) {
    if config.transport == TransportSecurity::AllowInsecureHttp {
        tracing::warn!(
            target: "eureka_http::security",
            "plain http:// endpoints allowed, their traffic is unencrypted"
        );
    }
    if config.tls.skip_verify {
        tracing::warn!(
            target: "eureka_http::security",
            "TLS certificate verification disabled, any server certificate is accepted"
        );
    }
}

fn connection_pool(config: &HttpClientConfig) -> Result<Pool, HttpError> {
    let connector = https_connector(config.tls, config.transport)?;

    let mut builder = Client::builder(TokioExecutor::new());
    // Idle connections are only reaped once a timer is installed.
    builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.pool_max_idle_per_host);
    if let Some(idle) = config.pool_idle_timeout {
        builder.pool_idle_timeout(idle);
    }
    Ok(builder.build(connector))
}

fn attempt_service(pool: Pool, config: &HttpClientConfig) -> Result<AttemptService, HttpError> {
    let timeout = config.request_timeout;
    let user_agent = UserAgentLayer::try_new(&config.user_agent)?;

    Ok(ServiceBuilder::new()
        .layer(TimeoutLayer::new(timeout))
        .layer(user_agent)
        .layer(DecompressionLayer::new())
        .service(pool)
        .map_response(boxed_body)
        .map_err(move |e| attempt_error(e, timeout))
        .boxed_clone())
}

/// Turn a tower error into an [`HttpError`]. An elapsed timer reports the
/// configured timeout, a boxed `HttpError` is unwrapped, the rest is
/// `Transport`.
fn attempt_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }
    match err.downcast::<HttpError>() {
        Ok(http) => *http,
        Err(other) => HttpError::Transport(other),
    }
}

fn boxed_body<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<tower::BoxError>,
{
    response.map(|body| body.map_err(Into::into).boxed())
}

/// TLS connector offering h2 and http/1.1 over ALPN. Plain `http://` is
/// only connected when the transport policy allows it.
fn https_connector(
    tls: TlsConfig,
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let tls_failure = |message: String| HttpError::Tls(message.into());

    let builder = match (tls.skip_verify, tls.roots) {
        (true, _) => HttpsConnectorBuilder::new()
            .with_tls_config(tls::insecure_client_config().map_err(tls_failure)?),
        (false, TlsRootConfig::Native) => HttpsConnectorBuilder::new()
            .with_tls_config(tls::native_roots_client_config().map_err(tls_failure)?),
        (false, TlsRootConfig::WebPki) => HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(tls::get_crypto_provider())
            .map_err(|e| HttpError::Tls(Box::new(e)))?,
    };

    Ok(match transport {
        TransportSecurity::AllowInsecureHttp => builder.https_or_http().enable_all_versions().build(),
        TransportSecurity::TlsOnly => builder.https_only().enable_all_versions().build(),
    })
}
