//! Endpoint selection and response classification on top of `eureka-http`.
//!
//! The retry policy itself lives in the HTTP client's tower stack; this
//! layer walks the configured endpoints in order and moves to the next one
//! only when a request never got an answer.

use std::sync::Arc;

use bytes::Bytes;
use eureka_auth::HttpClientBuilderExt;
use eureka_http::{HttpClient, HttpClientBuilder, HttpError};
use http::Method;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use url::Url;

use crate::codec::{CodecError, XML_CONTENT_TYPE};
use crate::config::ClientConfig;
use crate::error::RegistryError;

/// One logical registry call, relative to an endpoint base URL.
#[derive(Debug)]
pub struct RegistryRequest<'a> {
    pub method: Method,
    pub segments: &'a [&'a str],
    pub query: Option<(&'a str, &'a str)>,
    pub body: Option<String>,
}

impl<'a> RegistryRequest<'a> {
    #[must_use]
    pub fn new(method: Method, segments: &'a [&'a str]) -> Self {
        Self {
            method,
            segments,
            query: None,
            body: None,
        }
    }

    #[must_use]
    pub fn query(mut self, name: &'a str, value: &'a str) -> Self {
        self.query = Some((name, value));
        self
    }

    #[must_use]
    pub fn body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Clone)]
pub struct Transport {
    http: HttpClient,
    endpoints: Arc<[Url]>,
}

impl Transport {
    pub fn new(config: ClientConfig) -> Result<Self, RegistryError> {
        let endpoints = config.validate()?;

        let mut builder = HttpClientBuilder::with_config(config.http_config());
        if let Some(provider) = config.auth {
            builder = builder.with_bearer_auth(provider);
        }
        let http = builder
            .build()
            .map_err(|e| RegistryError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoints: endpoints.into(),
        })
    }

    #[must_use]
    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }

    /// Run `request` against the endpoints in order and return the body of
    /// the first 2xx answer.
    pub async fn execute(&self, request: RegistryRequest<'_>) -> Result<Bytes, RegistryError> {
        let mut last_failure = None;

        for (index, base) in self.endpoints.iter().enumerate() {
            let url = endpoint_url(base, request.segments, request.query)?;

            match self.send(&request, &url).await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        return Err(RegistryError::UnexpectedStatus {
                            code: status.as_u16(),
                        });
                    }
                    return response.bytes().await.map_err(body_error);
                }
                Err(e) if moves_to_next_endpoint(&e) => {
                    let remaining = self.endpoints.len() - index - 1;
                    if remaining > 0 {
                        tracing::warn!(
                            endpoint = %base,
                            method = %request.method,
                            remaining,
                            error = %e,
                            "registry endpoint unreachable, trying next"
                        );
                    }
                    last_failure = Some(e);
                }
                Err(e) => return Err(RegistryError::Transport(e)),
            }
        }

        Err(last_failure.map_or_else(
            || RegistryError::Config("at least one endpoint is required".into()),
            RegistryError::Transport,
        ))
    }

    async fn send(
        &self,
        request: &RegistryRequest<'_>,
        url: &Url,
    ) -> Result<eureka_http::HttpResponse, HttpError> {
        let mut builder = self
            .http
            .request(request.method.clone(), url.as_str())
            .typed_header(ACCEPT, HeaderValue::from_static(XML_CONTENT_TYPE));

        if let Some(body) = &request.body {
            builder = builder
                .typed_header(CONTENT_TYPE, HeaderValue::from_static(XML_CONTENT_TYPE))
                .body_bytes(body.clone());
        }

        builder.send().await
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field(
                "endpoints",
                &self.endpoints.iter().map(Url::as_str).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// A 2xx body over the size limit is an unusable document, not a
/// connection problem.
fn body_error(err: HttpError) -> RegistryError {
    match err {
        HttpError::BodyTooLarge { limit, actual } => {
            RegistryError::Decode(CodecError::TooLarge { limit, actual })
        }
        other => RegistryError::Transport(other),
    }
}

fn moves_to_next_endpoint(err: &HttpError) -> bool {
    err.is_transport_failure() || matches!(err, HttpError::DeadlineExceeded(_))
}

/// Append percent-encoded `segments` to the base path and set the query.
fn endpoint_url(
    base: &Url,
    segments: &[&str],
    query: Option<(&str, &str)>,
) -> Result<Url, RegistryError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| RegistryError::Config(format!("endpoint '{base}' cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);

    if let Some((name, value)) = query {
        url.query_pairs_mut().append_pair(name, value);
    }
    Ok(url)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn base(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn base_path_is_kept() {
        let url = endpoint_url(&base("http://registry:8761/eureka"), &["apps"], None).unwrap();
        assert_eq!(url.as_str(), "http://registry:8761/eureka/apps");
    }

    #[test]
    fn trailing_slash_does_not_double() {
        let url = endpoint_url(
            &base("http://registry:8761/eureka/"),
            &["apps", "BILLING"],
            None,
        )
        .unwrap();
        assert_eq!(url.as_str(), "http://registry:8761/eureka/apps/BILLING");
    }

    #[test]
    fn root_base() {
        let url = endpoint_url(&base("http://registry:8761"), &["instances", "i-1"], None).unwrap();
        assert_eq!(url.as_str(), "http://registry:8761/instances/i-1");
    }

    #[test]
    fn segments_are_percent_encoded() {
        let url = endpoint_url(
            &base("http://registry/eureka"),
            &["apps", "my app", "host:app/8080"],
            None,
        )
        .unwrap();
        assert_eq!(
            url.path(),
            "/eureka/apps/my%20app/host:app%2F8080",
            "{url}"
        );
    }

    #[test]
    fn query_value_is_form_encoded() {
        let url = endpoint_url(
            &base("http://registry/eureka"),
            &["apps", "A", "i-1", "status"],
            Some(("value", "OUT_OF_SERVICE")),
        )
        .unwrap();
        assert_eq!(url.query(), Some("value=OUT_OF_SERVICE"));
    }

    #[test]
    fn deadline_moves_to_next_endpoint() {
        use std::time::Duration;
        assert!(moves_to_next_endpoint(&HttpError::DeadlineExceeded(
            Duration::from_secs(1)
        )));
        assert!(moves_to_next_endpoint(&HttpError::Timeout(Duration::from_secs(1))));
        assert!(!moves_to_next_endpoint(&HttpError::Overloaded));
    }

    #[test]
    fn oversized_body_is_a_decode_failure() {
        let err = body_error(HttpError::BodyTooLarge {
            limit: 1024,
            actual: 1500,
        });
        assert!(
            matches!(
                err,
                RegistryError::Decode(CodecError::TooLarge {
                    limit: 1024,
                    actual: 1500
                })
            ),
            "{err:?}"
        );

        let err = body_error(HttpError::Timeout(std::time::Duration::from_secs(1)));
        assert!(matches!(err, RegistryError::Transport(_)), "{err:?}");
    }

    #[tokio::test]
    async fn debug_lists_endpoints() {
        let transport = Transport::new(ClientConfig::new([
            "http://registry-1/eureka",
            "http://registry-2/eureka",
        ]))
        .unwrap();
        let debug = format!("{transport:?}");
        assert!(debug.contains("registry-1"), "{debug}");
        assert!(debug.contains("registry-2"), "{debug}");
        assert_eq!(transport.endpoints().len(), 2);
    }
}
