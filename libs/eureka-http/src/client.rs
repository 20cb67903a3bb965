use crate::builder::HttpClientBuilder;
use crate::config::TransportSecurity;
use crate::error::HttpError;
use crate::request::RequestBuilder;
use crate::response::ResponseBody;
use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use tower::Service;
use tower::buffer::Buffer;

/// Future type of the inner service
pub type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

/// Buffered service handle shared by all clones of [`HttpClient`]
pub type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// HTTP client over a tower middleware stack (timeout, retry, User-Agent,
/// decompression, optional auth).
///
/// `HttpClient` is `Clone + Send + Sync` and cloning is cheap: requests go
/// through a `tower::buffer::Buffer`, so no external locking is needed.
///
/// ```ignore
/// let client = HttpClient::builder().build()?;
/// let apps = client
///     .get("https://registry.example.com/eureka/apps")
///     .header("accept", "application/xml")
///     .send()
///     .await?
///     .checked_bytes()
///     .await?;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: BufferedService,
    pub(crate) max_body_size: usize,
    pub(crate) transport_security: TransportSecurity,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    /// Create a builder for configuring the HTTP client
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Create a request builder for an arbitrary method
    ///
    /// The URL must be absolute. Relative URLs are rejected with
    /// [`HttpError::InvalidUri`] when the request is sent.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(
            self.service.clone(),
            self.max_body_size,
            method,
            url.to_owned(),
            self.transport_security,
        )
    }

    /// Create a GET request builder
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Create a POST request builder
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Create a PUT request builder
    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Create a DELETE request builder
    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }
}

/// Map buffer errors to `HttpError`
///
/// Errors from the inner service come back boxed and are unwrapped; anything
/// else means the buffer worker is gone.
pub fn map_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(
                error = %err,
                "buffer worker closed unexpectedly; service unavailable"
            );
            HttpError::ServiceClosed
        }
    }
}

/// Reserve a buffer slot without waiting.
///
/// Returns `HttpError::Overloaded` immediately when the queue is full.
pub async fn try_acquire_buffer_slot(service: &mut BufferedService) -> Result<(), HttpError> {
    use std::task::Poll;

    let poll_result = std::future::poll_fn(|cx| match service.poll_ready(cx) {
        Poll::Ready(result) => Poll::Ready(Some(result)),
        Poll::Pending => Poll::Ready(None),
    })
    .await;

    match poll_result {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(map_buffer_error(e)),
        None => Err(HttpError::Overloaded),
    }
}
