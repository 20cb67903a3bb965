use crate::client::{BufferedService, map_buffer_error, try_acquire_buffer_slot};
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::{HttpResponse, ResponseBody};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{Request, Response};
use http_body_util::Full;
use tower::Service;

#[derive(Clone, Debug)]
enum BodyKind {
    Empty,
    Bytes(Bytes),
    Form(Bytes),
}

/// HTTP request builder with fluent API
///
/// Created by [`HttpClient::get`](crate::HttpClient::get) and friends.
/// Header errors are deferred and reported by [`send()`](RequestBuilder::send).
///
/// Query strings are not composed here; build the final URL with `url::Url`
/// and pass it as a string.
///
/// ```ignore
/// let resp = client
///     .post("https://registry.example.com/eureka/apps/BILLING")
///     .header("content-type", "application/xml")
///     .body_bytes(xml)
///     .send()
///     .await?;
/// ```
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    service: BufferedService,
    max_body_size: usize,
    method: http::Method,
    url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: BodyKind,
    error: Option<HttpError>,
    transport_security: TransportSecurity,
}

impl RequestBuilder {
    pub(crate) fn new(
        service: BufferedService,
        max_body_size: usize,
        method: http::Method,
        url: String,
        transport_security: TransportSecurity,
    ) -> Self {
        Self {
            service,
            max_body_size,
            method,
            url,
            headers: Vec::new(),
            body: BodyKind::Empty,
            error: None,
            transport_security,
        }
    }

    /// Add a single header to the request
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            (Err(e), _) => self.error = Some(HttpError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(HttpError::InvalidHeaderValue(e)),
        }
        self
    }

    /// Add a pre-validated header, e.g. one marked sensitive
    pub fn typed_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    /// Set request body as form URL-encoded
    ///
    /// Content-Type defaults to `application/x-www-form-urlencoded` unless already set.
    ///
    /// # Errors
    ///
    /// Returns `Err(HttpError::FormEncode)` if encoding fails, or any deferred header error.
    pub fn form(mut self, fields: &[(&str, &str)]) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        self.body = BodyKind::Form(Bytes::from(serde_urlencoded::to_string(fields)?));
        Ok(self)
    }

    /// Set request body as raw bytes (no default Content-Type)
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = BodyKind::Bytes(body.into());
        self
    }

    /// Parse the URL and check its scheme against the transport security mode.
    fn validate_url(&self) -> Result<http::Uri, HttpError> {
        let uri: http::Uri =
            self.url
                .parse()
                .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
                    url: self.url.clone(),
                    kind: InvalidUriKind::ParseError,
                    reason: e.to_string(),
                })?;

        if uri.authority().is_none() {
            return Err(HttpError::InvalidUri {
                url: self.url.clone(),
                kind: InvalidUriKind::MissingAuthority,
                reason: "missing host/authority".to_owned(),
            });
        }

        match uri.scheme_str() {
            Some("https") => Ok(uri),
            Some("http") => match self.transport_security {
                TransportSecurity::AllowInsecureHttp => Ok(uri),
                TransportSecurity::TlsOnly => Err(HttpError::InvalidScheme {
                    scheme: "http".to_owned(),
                    reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
                }),
            },
            Some(scheme) => Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            }),
            None => Err(HttpError::InvalidUri {
                url: self.url.clone(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            }),
        }
    }

    /// Send the request and return the response
    ///
    /// Non-2xx statuses are returned as `Ok`; use
    /// [`HttpResponse::error_for_status`] or [`HttpResponse::checked_bytes`] to
    /// turn them into errors.
    ///
    /// # Errors
    ///
    /// Returns `HttpError` on invalid headers or URL, a scheme not allowed by the
    /// transport security mode, transport failures, timeouts, or a full request queue.
    pub async fn send(mut self) -> Result<HttpResponse, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let uri = self.validate_url()?;

        let mut builder = Request::builder().method(self.method).uri(uri);

        if matches!(self.body, BodyKind::Form(_))
            && !self.headers.iter().any(|(name, _)| name == CONTENT_TYPE)
        {
            builder = builder.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        }

        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }

        let body_bytes = match self.body {
            BodyKind::Empty => Bytes::new(),
            BodyKind::Bytes(b) | BodyKind::Form(b) => b,
        };

        let request = builder.body(Full::new(body_bytes))?;

        try_acquire_buffer_slot(&mut self.service).await?;

        let inner: Response<ResponseBody> =
            self.service.call(request).await.map_err(map_buffer_error)?;

        Ok(HttpResponse {
            inner,
            max_body_size: self.max_body_size,
        })
    }
}
