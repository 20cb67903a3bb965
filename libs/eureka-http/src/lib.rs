#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP transport for the Eureka registry client
//!
//! This crate provides a hyper-based HTTP client with:
//! - TLS via rustls, with an explicit opt-in for plain HTTP
//! - Optional skipping of server certificate verification
//! - Connection pooling
//! - Per-attempt and total timeouts
//! - A retry layer driven by an attempt limit and a pluggable delay strategy
//! - User-Agent header injection
//! - Transparent response decompression (gzip, brotli, deflate)
//!
//! # Retry semantics
//!
//! Every request, whatever its method, is retried while attempts remain when
//! the server answers with a non-2xx status or the attempt fails at the
//! transport level. Once attempts are exhausted the last response is returned
//! as `Ok(HttpResponse)` (callers decide what a non-2xx status means) or the
//! last transport error is returned as `Err`.
//!
//! # Example
//!
//! ```ignore
//! use eureka_http::{HttpClient, RetryConfig, RetryDelay};
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .timeout(Duration::from_secs(10))
//!     .retry(Some(RetryConfig::new(3, RetryDelay::Constant(Duration::from_millis(200)))))
//!     .build()?;
//!
//! let body = client
//!     .get("https://registry.example.com/eureka/apps")
//!     .header("accept", "application/xml")
//!     .send()
//!     .await?
//!     .checked_bytes()
//!     .await?;
//! ```

mod builder;
mod client;
mod config;
mod error;
mod layers;
mod request;
mod response;
mod tls;

pub use builder::{AttemptService, HttpClientBuilder};
pub use client::HttpClient;
pub use config::{
    DEFAULT_USER_AGENT, DelayFn, ExponentialBackoff, HttpClientConfig, RetryConfig, RetryDelay,
    TlsConfig, TlsRootConfig, TransportSecurity,
};
pub use error::{HttpError, InvalidUriKind};
pub use layers::{
    RETRY_ATTEMPT_HEADER, RetryLayer, RetryService, RetryTrigger, UserAgentLayer, UserAgentService,
};
pub use request::RequestBuilder;
pub use response::{HttpResponse, ResponseBody};
