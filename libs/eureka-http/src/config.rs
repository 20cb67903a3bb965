use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("eureka-http/", env!("CARGO_PKG_VERSION"));

/// Default drain limit for response bodies before retry (64 KiB)
pub const DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT: usize = 64 * 1024;

/// Exponential backoff configuration for retries
///
/// Computes delay as: `min(initial * multiplier^n, max)` with optional jitter,
/// where `n` is the zero-based index of the retry.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Initial backoff duration (default: 100ms)
    pub initial: Duration,

    /// Maximum backoff duration (default: 10s)
    pub max: Duration,

    /// Backoff multiplier for exponential growth (default: 2.0)
    pub multiplier: f64,

    /// Add a random 0-25% to each backoff (default: true)
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    /// Create backoff with custom initial and max durations
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Default::default()
        }
    }

    /// Backoff before the retry with zero-based index `retry_index`.
    ///
    /// NaN, infinite and negative inputs are sanitized instead of panicking.
    #[must_use]
    pub fn backoff(&self, retry_index: usize) -> Duration {
        // One day; anything beyond is not a meaningful retry delay
        const MAX_BACKOFF_SECS: f64 = 86400.0;

        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);

        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 0.0 {
            self.multiplier
        } else {
            1.0
        };

        let initial_secs = self.initial.as_secs_f64();
        let max_secs = self.max.as_secs_f64().min(MAX_BACKOFF_SECS);

        let base = initial_secs * multiplier.powi(exponent);
        let clamped = if base.is_finite() {
            base.min(max_secs).max(0.0)
        } else {
            max_secs
        };
        let duration = Duration::from_secs_f64(clamped);

        let duration = if self.jitter {
            let factor = rand::rng().random_range(0.0..=0.25);
            duration + duration.mul_f64(factor)
        } else {
            duration
        };

        duration.min(Duration::from_secs_f64(max_secs))
    }
}

/// User-supplied delay function, called with the 1-based number of the
/// attempt that just failed.
pub type DelayFn = Arc<dyn Fn(usize) -> Duration + Send + Sync>;

/// Wait strategy between two attempts of the same request
#[derive(Clone, Default)]
#[non_exhaustive]
pub enum RetryDelay {
    /// Retry immediately
    #[default]
    None,
    /// Same wait before every retry
    Constant(Duration),
    /// `step * n` before the n-th retry, capped at `max`
    Linear { step: Duration, max: Duration },
    /// Exponential growth with optional jitter
    Exponential(ExponentialBackoff),
    /// Arbitrary function of the failed attempt number
    Custom(DelayFn),
}

impl RetryDelay {
    /// Wrap a closure as a [`RetryDelay::Custom`] strategy.
    #[must_use]
    pub fn custom(f: impl Fn(usize) -> Duration + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Wait before retrying after `failed_attempt` (1-based) failed.
    #[must_use]
    pub fn delay_for(&self, failed_attempt: usize) -> Duration {
        let failed_attempt = failed_attempt.max(1);
        match self {
            Self::None => Duration::ZERO,
            Self::Constant(d) => *d,
            Self::Linear { step, max } => {
                let n = u32::try_from(failed_attempt).unwrap_or(u32::MAX);
                step.saturating_mul(n).min(*max)
            }
            Self::Exponential(backoff) => backoff.backoff(failed_attempt - 1),
            Self::Custom(f) => f(failed_attempt),
        }
    }
}

impl fmt::Debug for RetryDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Constant(d) => f.debug_tuple("Constant").field(d).finish(),
            Self::Linear { step, max } => f
                .debug_struct("Linear")
                .field("step", step)
                .field("max", max)
                .finish(),
            Self::Exponential(b) => f.debug_tuple("Exponential").field(b).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Retry policy: how many attempts a request gets and how long to wait
/// between them.
///
/// A request is retried while attempts remain whenever the server answers
/// with a non-2xx status or the attempt fails with a transport error or a
/// per-attempt timeout. The HTTP method does not matter.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one (default: 1, i.e. no retry).
    /// Values below 1 are treated as 1.
    pub max_attempts: usize,

    /// Delay strategy between attempts
    pub delay: RetryDelay,

    /// Maximum bytes to drain from a failed response body before retrying,
    /// so the connection can go back to the pool. Default: 64 KiB.
    ///
    /// Applies to decompressed bytes.
    pub retry_response_drain_limit: usize,

    /// Skip draining failed response bodies entirely (default: false)
    pub skip_drain_on_retry: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: RetryDelay::Exponential(ExponentialBackoff::default()),
            retry_response_drain_limit: DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT,
            skip_drain_on_retry: false,
        }
    }
}

impl RetryConfig {
    /// Create a policy with the given attempt limit and delay strategy
    #[must_use]
    pub fn new(max_attempts: usize, delay: RetryDelay) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            ..Default::default()
        }
    }

    /// Create config that never retries
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(1, RetryDelay::None)
    }

    /// Whether another attempt is allowed after `attempts_made` attempts
    #[must_use]
    pub fn has_attempts_left(&self, attempts_made: usize) -> bool {
        attempts_made < self.max_attempts.max(1)
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// TLS settings for outbound connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// Root certificate strategy (default: `WebPki`)
    pub roots: TlsRootConfig,

    /// Accept any server certificate (default: false)
    ///
    /// **WARNING**: disables server authentication. Only meant for registries
    /// fronted by self-signed certificates on trusted networks.
    pub skip_verify: bool,
}

impl TlsConfig {
    /// TLS settings that skip server certificate verification
    #[must_use]
    pub fn insecure_skip_verify() -> Self {
        Self {
            roots: TlsRootConfig::default(),
            skip_verify: true,
        }
    }
}

/// Transport security configuration
///
/// Controls whether the client enforces TLS or allows insecure HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only)
    #[default]
    TlsOnly,
    /// Allow plain HTTP connections as well as HTTPS
    AllowInsecureHttp,
}

/// Overall HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-attempt timeout (default: 30 seconds)
    pub request_timeout: Duration,

    /// Total timeout spanning all retry attempts (default: None)
    ///
    /// When set, the whole operation including backoff delays must finish
    /// within this duration or fail with `HttpError::DeadlineExceeded`.
    pub total_timeout: Option<Duration>,

    /// Maximum response body size in bytes (default: 10 MB)
    pub max_body_size: usize,

    /// User-Agent header value
    pub user_agent: String,

    /// Retry policy configuration (`None` disables the retry layer)
    pub retry: Option<RetryConfig>,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// TLS settings
    pub tls: TlsConfig,

    /// Buffer capacity for concurrent request handling (default: 1024)
    ///
    /// The client queues requests through a `tower::buffer::Buffer`; this is
    /// the maximum number of requests waiting for the worker.
    pub buffer_capacity: usize,

    /// Timeout for idle pooled connections (default: 90 seconds)
    ///
    /// `None` keeps hyper-util's default.
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            total_timeout: None,
            max_body_size: 10 * 1024 * 1024, // 10 MB
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            retry: Some(RetryConfig::default()),
            transport: TransportSecurity::TlsOnly,
            tls: TlsConfig::default(),
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl HttpClientConfig {
    /// Create configuration for `OAuth2` token endpoints
    ///
    /// Three attempts with exponential backoff.
    #[must_use]
    pub fn token_endpoint() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1 MB
            retry: Some(RetryConfig::new(
                3,
                RetryDelay::Exponential(ExponentialBackoff::default()),
            )),
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(60)),
            pool_max_idle_per_host: 4,
            ..Default::default()
        }
    }

    /// Create configuration for testing with mock servers (allows insecure HTTP)
    ///
    /// **WARNING**: This configuration allows plain HTTP connections.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024, // 1 MB
            retry: None,
            transport: TransportSecurity::AllowInsecureHttp,
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Default::default()
        }
    }
}
