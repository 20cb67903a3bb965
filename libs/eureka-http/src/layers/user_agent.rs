use crate::error::HttpError;
use http::{HeaderValue, Request, Response, header::USER_AGENT};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that stamps a default User-Agent on outgoing requests
#[derive(Clone)]
pub struct UserAgentLayer {
    user_agent: HeaderValue,
}

impl UserAgentLayer {
    /// Create a new `UserAgentLayer` with the specified user agent string
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if the string is not a valid header value
    pub fn try_new(user_agent: impl AsRef<str>) -> Result<Self, HttpError> {
        let user_agent = HeaderValue::from_str(user_agent.as_ref())?;
        Ok(Self { user_agent })
    }
}

impl<S> Layer<S> for UserAgentLayer {
    type Service = UserAgentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserAgentService {
            inner,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Service produced by [`UserAgentLayer`]
#[derive(Clone)]
pub struct UserAgentService<S> {
    inner: S,
    user_agent: HeaderValue,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for UserAgentService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // A caller-supplied User-Agent wins
        req.headers_mut()
            .entry(USER_AGENT)
            .or_insert_with(|| self.user_agent.clone());
        self.inner.call(req)
    }
}
