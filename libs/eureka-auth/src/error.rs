use eureka_http::HttpError;
use thiserror::Error;

/// Failure to obtain or hand out a registry access token.
///
/// Never carries the client secret, the access token or a token endpoint
/// response body.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenError {
    #[error("invalid client credentials: {0}")]
    Credentials(String),

    /// The request never got a usable answer (connection, TLS, timeout,
    /// oversized body).
    #[error("token request failed: {0}")]
    Http(#[source] HttpError),

    /// The token endpoint answered with a non-2xx status.
    #[error("token endpoint rejected the request with status {status}")]
    Rejected { status: u16 },

    #[error("malformed token response: {0}")]
    Malformed(String),

    #[error("token type '{0}' is not bearer")]
    NotBearer(String),

    /// The cached token ran out and the background refresh has not replaced
    /// it yet.
    #[error("access token expired, refresh pending")]
    Expired,
}

impl From<HttpError> for TokenError {
    fn from(err: HttpError) -> Self {
        match err {
            // The status error embeds a body preview; keep only the code.
            HttpError::HttpStatus { status, .. } => Self::Rejected {
                status: status.as_u16(),
            },
            other => Self::Http(other),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn status_error_drops_body() {
        let err = TokenError::from(HttpError::HttpStatus {
            status: http::StatusCode::UNAUTHORIZED,
            body_preview: r#"{"error":"invalid_client","client_secret":"leaked"}"#.into(),
            content_type: Some("application/json".into()),
        });
        assert!(matches!(err, TokenError::Rejected { status: 401 }), "{err}");
        assert!(!err.to_string().contains("leaked"));
    }

    #[test]
    fn transport_errors_keep_their_source() {
        let err = TokenError::from(HttpError::Timeout(Duration::from_secs(5)));
        assert!(err.to_string().starts_with("token request failed: "), "{err}");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn messages() {
        assert_eq!(
            TokenError::Rejected { status: 401 }.to_string(),
            "token endpoint rejected the request with status 401"
        );
        assert_eq!(
            TokenError::NotBearer("mac".into()).to_string(),
            "token type 'mac' is not bearer"
        );
        assert_eq!(
            TokenError::Expired.to_string(),
            "access token expired, refresh pending"
        );
    }
}
