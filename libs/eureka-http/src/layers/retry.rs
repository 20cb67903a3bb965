use crate::config::RetryConfig;
use crate::error::HttpError;
use crate::response::ResponseBody;
use bytes::Bytes;
use http::{HeaderValue, Request, Response};
use http_body_util::{BodyExt, Full};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service, ServiceExt};

/// Header name for retry attempt number (1-indexed).
/// Added to retried requests to indicate which retry attempt this is.
pub const RETRY_ATTEMPT_HEADER: &str = "X-Retry-Attempt";

/// What made an attempt fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RetryTrigger {
    /// Server answered with this non-2xx status code
    Status(u16),
    /// Connection-level failure (refused, reset, DNS, TLS)
    TransportError,
    /// The attempt hit the per-request timeout
    Timeout,
    /// Local failure that another attempt would not fix
    NonRetryable,
}

impl RetryTrigger {
    /// Classify an error returned by the inner service
    #[must_use]
    pub fn from_error(err: &HttpError) -> Self {
        match err {
            HttpError::Transport(_) | HttpError::Tls(_) => Self::TransportError,
            HttpError::Timeout(_) => Self::Timeout,
            // DeadlineExceeded, ServiceClosed and request-building errors
            _ => Self::NonRetryable,
        }
    }

    /// Whether another attempt may succeed where this one failed
    #[must_use]
    pub fn is_retryable(self) -> bool {
        match self {
            Self::Status(code) => !(200..300).contains(&code),
            Self::TransportError | Self::Timeout => true,
            Self::NonRetryable => false,
        }
    }
}

/// Tower layer that re-sends failed requests
///
/// An attempt fails when the inner service returns a transport error or a
/// timeout, or when the server answers with a non-2xx status. Failed attempts
/// are repeated, whatever the HTTP method, until `RetryConfig::max_attempts`
/// is reached. The wait between attempts comes from `RetryConfig::delay`.
#[derive(Clone)]
pub struct RetryLayer {
    config: RetryConfig,
    total_timeout: Option<Duration>,
}

impl RetryLayer {
    /// Create a new `RetryLayer` with the specified configuration
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            total_timeout: None,
        }
    }

    /// Create a new `RetryLayer` with total timeout (deadline across all attempts)
    #[must_use]
    pub fn with_total_timeout(config: RetryConfig, total_timeout: Option<Duration>) -> Self {
        Self {
            config,
            total_timeout,
        }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            config: self.config.clone(),
            total_timeout: self.total_timeout,
        }
    }
}

/// Service that implements the retry loop
///
/// Once attempts are exhausted the last response is returned as
/// `Ok(Response)` whatever its status, and the last error as `Err`.
/// Failed response bodies are drained up to the configured limit before the
/// next attempt so the connection can be reused.
///
/// # Total Timeout (Deadline)
///
/// When `total_timeout` is set, all attempts and delays together must
/// complete within that duration, otherwise `HttpError::DeadlineExceeded`.
#[derive(Clone)]
pub struct RetryService<S> {
    inner: S,
    config: RetryConfig,
    total_timeout: Option<Duration>,
}

impl<S> Service<Request<Full<Bytes>>> for RetryService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = S::Response;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        // Swap so we consume the instance that was poll_ready'd,
        // leaving a fresh clone for the next poll_ready cycle.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let config = self.config.clone();
        let total_timeout = self.total_timeout;

        let (parts, body_bytes) = req.into_parts();

        // Parts::clone drops version and non-Clone extensions; keep both
        let http_version = parts.version;
        let extensions = parts.extensions.clone();

        let parts = std::sync::Arc::new(parts);

        Box::pin(async move {
            let method = parts.method.clone();
            let url_host = parts
                .uri
                .authority()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown".to_owned());

            let deadline_info = total_timeout.map(|t| (tokio::time::Instant::now() + t, t));

            let mut attempt = 0usize;
            loop {
                if let Some((deadline, timeout_duration)) = deadline_info
                    && tokio::time::Instant::now() >= deadline
                {
                    return Err(HttpError::DeadlineExceeded(timeout_duration));
                }

                let mut req = Request::from_parts((*parts).clone(), body_bytes.clone());
                *req.version_mut() = http_version;
                *req.extensions_mut() = extensions.clone();

                if attempt > 0
                    && let Ok(value) = HeaderValue::try_from(attempt.to_string())
                {
                    req.headers_mut().insert(RETRY_ATTEMPT_HEADER, value);
                }

                let mut svc = inner.clone();
                svc.ready().await?;

                let result = svc.call(req).await;
                attempt += 1;

                let trigger = match &result {
                    Ok(resp) => RetryTrigger::Status(resp.status().as_u16()),
                    Err(err) => RetryTrigger::from_error(err),
                };

                if !trigger.is_retryable() || !config.has_attempts_left(attempt) {
                    return result;
                }

                let delay = config.delay.delay_for(attempt);

                match result {
                    Ok(resp) => {
                        if should_drain(&resp, &config) {
                            let drain_limit = config.retry_response_drain_limit;
                            if let Err(e) = drain_response_body(resp, drain_limit).await {
                                tracing::debug!(
                                    error = %e,
                                    "Failed to drain response body before retry; connection may not be reused"
                                );
                            }
                        }
                    }
                    Err(err) => {
                        tracing::debug!(
                            attempt,
                            error = %err,
                            method = %method,
                            host = %url_host,
                            "Request attempt failed"
                        );
                    }
                }

                let effective_delay = if let Some((deadline, timeout_duration)) = deadline_info {
                    let remaining =
                        deadline.saturating_duration_since(tokio::time::Instant::now());
                    if remaining.is_zero() {
                        return Err(HttpError::DeadlineExceeded(timeout_duration));
                    }
                    delay.min(remaining)
                } else {
                    delay
                };

                tracing::debug!(
                    retry = attempt,
                    max_attempts = config.max_attempts,
                    trigger = ?trigger,
                    method = %method,
                    host = %url_host,
                    delay_ms = effective_delay.as_millis(),
                    "Retrying request"
                );

                if !effective_delay.is_zero() {
                    tokio::time::sleep(effective_delay).await;
                }
            }
        })
    }
}

fn should_drain(resp: &Response<ResponseBody>, config: &RetryConfig) -> bool {
    if config.skip_drain_on_retry {
        tracing::trace!("Skipping drain: skip_drain_on_retry enabled");
        return false;
    }

    let content_length = resp
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());

    match content_length {
        // Large error bodies are not worth decompressing just to reuse a connection
        Some(len) if len > config.retry_response_drain_limit as u64 => {
            tracing::debug!(
                content_length = len,
                drain_limit = config.retry_response_drain_limit,
                "Skipping drain: Content-Length exceeds limit"
            );
            false
        }
        _ => true,
    }
}

/// Drain response body up to `limit` bytes to allow connection reuse.
///
/// HTTP/1.1 connections only go back to the pool once the body has been
/// consumed. The limit applies to decompressed bytes; bodies larger than it
/// are abandoned and the next attempt opens a new connection.
async fn drain_response_body(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<(), HttpError> {
    let (_parts, body) = response.into_parts();
    let mut body = std::pin::pin!(body);
    let mut drained = 0usize;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            drained += chunk.len();
            if drained >= limit {
                break;
            }
        }
    }

    Ok(())
}
