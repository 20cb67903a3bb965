use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use eureka_http::{HttpClientBuilder, HttpError};
use http::header::AUTHORIZATION;
use http::{HeaderValue, Request, Response};
use tower::{Layer, Service, ServiceExt};

use crate::provider::TokenProvider;

/// Tower layer writing `Authorization: Bearer <token>` into each request.
///
/// Installed inside the retry loop, so every attempt asks the provider
/// again and picks up a refreshed token.
#[derive(Clone, Debug)]
pub struct BearerAuthLayer {
    provider: Arc<dyn TokenProvider>,
}

impl BearerAuthLayer {
    #[must_use]
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self { provider }
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService {
            inner,
            provider: Arc::clone(&self.provider),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BearerAuthService<S> {
    inner: S,
    provider: Arc<dyn TokenProvider>,
}

impl<S> BearerAuthService<S> {
    fn authorization(&self) -> Result<HeaderValue, HttpError> {
        // No token yet is a failed attempt like a refused connection, so the
        // retry layer and endpoint failover treat it the same way.
        let token = self
            .provider
            .access_token()
            .map_err(|e| HttpError::Transport(Box::new(e)))?;
        let raw = zeroize::Zeroizing::new(format!("Bearer {}", token.expose()));
        let mut value = HeaderValue::from_str(&raw)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl<S, B, ResBody> Service<Request<B>> for BearerAuthService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    B: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, HttpError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), HttpError>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let value = match self.authorization() {
            Ok(value) => value,
            Err(e) => return Box::pin(std::future::ready(Err(e))),
        };
        req.headers_mut().insert(AUTHORIZATION, value);

        // The ready clone answers this call; a fresh clone waits for the next.
        let fresh = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, fresh);
        Box::pin(ready.oneshot(req))
    }
}

/// Bearer auth for [`HttpClientBuilder`].
pub trait HttpClientBuilderExt {
    /// Authenticate every attempt with a token from `provider`.
    #[must_use]
    fn with_bearer_auth(self, provider: Arc<dyn TokenProvider>) -> Self;
}

impl HttpClientBuilderExt for HttpClientBuilder {
    fn with_bearer_auth(self, provider: Arc<dyn TokenProvider>) -> Self {
        let layer = BearerAuthLayer::new(provider);
        self.with_auth_layer(move |inner| layer.layer(inner).boxed_clone())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::error::TokenError;
    use crate::provider::StaticToken;
    use crate::secret::SecretString;
    use bytes::Bytes;
    use eureka_http::{HttpClientConfig, RetryConfig, RetryDelay};
    use http::StatusCode;
    use http_body_util::Full;
    use httpmock::prelude::*;
    use std::sync::Mutex;

    /// Hands out a fixed sequence of answers, repeating the last one.
    #[derive(Debug)]
    struct Scripted(Mutex<Vec<Result<&'static str, ()>>>);

    impl TokenProvider for Scripted {
        fn access_token(&self) -> Result<SecretString, TokenError> {
            let mut script = self.0.lock().unwrap();
            let next = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0]
            };
            next.map(SecretString::new).map_err(|()| TokenError::Expired)
        }
    }

    /// Remembers the `Authorization` header of every request, answers 200.
    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Option<HeaderValue>>>>);

    impl Service<Request<Full<Bytes>>> for Recorder {
        type Response = Response<Full<Bytes>>;
        type Error = HttpError;
        type Future = std::future::Ready<Result<Self::Response, HttpError>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), HttpError>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            self.0
                .lock()
                .unwrap()
                .push(req.headers().get(AUTHORIZATION).cloned());
            std::future::ready(Ok(Response::new(Full::new(Bytes::new()))))
        }
    }

    fn heartbeat() -> Request<Full<Bytes>> {
        Request::put("http://registry.local/eureka/apps/BILLING/billing-1")
            .header(AUTHORIZATION, "Bearer stale")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn provider(token: &str) -> Arc<dyn TokenProvider> {
        Arc::new(StaticToken::new(token))
    }

    #[tokio::test]
    async fn replaces_header_with_sensitive_bearer() {
        let recorder = Recorder::default();
        BearerAuthLayer::new(provider("tok-layer"))
            .layer(recorder.clone())
            .oneshot(heartbeat())
            .await
            .unwrap();

        let seen = recorder.0.lock().unwrap();
        let value = seen[0].as_ref().unwrap();
        assert_eq!(value, "Bearer tok-layer");
        assert!(value.is_sensitive());
    }

    #[tokio::test]
    async fn missing_token_fails_the_attempt() {
        let recorder = Recorder::default();
        let err = BearerAuthLayer::new(Arc::new(Scripted(Mutex::new(vec![Err(())]))))
            .layer(recorder.clone())
            .oneshot(heartbeat())
            .await
            .unwrap_err();

        assert!(err.is_transport_failure(), "{err:?}");
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn each_attempt_asks_the_provider_again() {
        let registry = MockServer::start();
        let first = registry.mock(|when, then| {
            when.method(PUT).header("authorization", "Bearer tok-1");
            then.status(500);
        });
        let second = registry.mock(|when, then| {
            when.method(PUT).header("authorization", "Bearer tok-2");
            then.status(200);
        });

        let client = HttpClientBuilder::with_config(HttpClientConfig {
            retry: Some(RetryConfig::new(3, RetryDelay::None)),
            ..HttpClientConfig::for_testing()
        })
        .with_bearer_auth(Arc::new(Scripted(Mutex::new(vec![
            Ok("tok-1"),
            Err(()),
            Ok("tok-2"),
        ]))))
        .build()
        .unwrap();

        let resp = client
            .put(&registry.url("/eureka/apps/BILLING/billing-1"))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        first.assert_calls(1);
        second.assert_calls(1);
    }

    #[tokio::test]
    async fn without_bearer_auth_no_header_is_sent() {
        let registry = MockServer::start();
        let authed = registry.mock(|when, then| {
            when.header_exists("authorization");
            then.status(200);
        });
        let anonymous = registry.mock(|when, then| {
            when.method(GET).path("/eureka/apps");
            then.status(200);
        });

        let client = HttpClientBuilder::with_config(HttpClientConfig::for_testing())
            .build()
            .unwrap();
        client
            .get(&registry.url("/eureka/apps"))
            .send()
            .await
            .unwrap();

        authed.assert_calls(0);
        anonymous.assert_calls(1);
    }

    #[test]
    fn debug_hides_token() {
        let layer = BearerAuthLayer::new(provider("super-secret"));
        assert!(!format!("{layer:?}").contains("super-secret"));
    }
}
