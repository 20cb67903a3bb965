//! One client-credentials round trip, driven by `aliri_tokens` for refresh.

use std::time::Duration;

use aliri_clock::DurationSecs;
use aliri_tokens::sources::AsyncTokenSource;
use aliri_tokens::{AccessToken, IdToken, TokenLifetimeConfig, TokenWithLifetime};
use async_trait::async_trait;
use eureka_http::{HttpClient, HttpClientBuilder, HttpClientConfig, HttpError, HttpResponse};
use http::HeaderValue;
use http::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use url::Url;

use crate::credentials::ClientCredentials;
use crate::error::TokenError;
use crate::secret::SecretString;

pub(crate) struct Exchange {
    http: HttpClient,
    token_uri: Url,
    authorization: SecretString,
    scope: Option<String>,
    refresh_before_expiry: Duration,
    default_lifetime: Duration,
}

impl Exchange {
    pub(crate) fn new(credentials: &ClientCredentials) -> Result<Self, TokenError> {
        let config = credentials
            .http
            .clone()
            .unwrap_or_else(HttpClientConfig::token_endpoint);
        let http = HttpClientBuilder::with_config(config).build()?;

        Ok(Self {
            http,
            token_uri: credentials.token_uri.clone(),
            authorization: credentials.basic_authorization(),
            scope: (!credentials.scopes.is_empty()).then(|| credentials.scopes.join(" ")),
            refresh_before_expiry: credentials.refresh_before_expiry,
            default_lifetime: credentials.default_lifetime,
        })
    }

    async fn post(&self) -> Result<HttpResponse, HttpError> {
        let mut authorization = HeaderValue::from_str(self.authorization.expose())?;
        authorization.set_sensitive(true);

        let mut form = vec![("grant_type", "client_credentials")];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.as_str()));
        }

        self.http
            .post(self.token_uri.as_str())
            .typed_header(AUTHORIZATION, authorization)
            .typed_header(ACCEPT, HeaderValue::from_static("application/json"))
            .form(&form)?
            .send()
            .await
    }

    /// When the token turns stale, counted from issue.
    fn stale_after(&self, lifetime: Duration) -> Duration {
        lifetime
            .checked_sub(self.refresh_before_expiry)
            .filter(|early| !early.is_zero())
            .unwrap_or(lifetime / 2)
    }
}

#[async_trait]
impl AsyncTokenSource for Exchange {
    type Error = TokenError;

    async fn request_token(&mut self) -> Result<TokenWithLifetime, TokenError> {
        let response = self.post().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TokenError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let grant: Grant =
            serde_json::from_slice(&body).map_err(|e| TokenError::Malformed(e.to_string()))?;
        if let Some(kind) = grant.token_type
            && !kind.eq_ignore_ascii_case("bearer")
        {
            return Err(TokenError::NotBearer(kind));
        }
        if grant.access_token.is_empty() {
            return Err(TokenError::Malformed("empty access_token".into()));
        }

        let lifetime = grant
            .expires_in
            .map_or(self.default_lifetime, Duration::from_secs);
        let stale_after = self.stale_after(lifetime);
        tracing::debug!(
            token_uri = %self.token_uri,
            lifetime_secs = lifetime.as_secs(),
            refresh_in_secs = stale_after.as_secs(),
            "registry access token issued"
        );

        // Staleness comes from the floor alone, not from a lifetime ratio.
        let policy = TokenLifetimeConfig::new(0.0, DurationSecs(stale_after.as_secs()));
        Ok(policy.create_token(
            AccessToken::new(grant.access_token),
            None::<IdToken>,
            DurationSecs(lifetime.as_secs()),
        ))
    }
}

/// Successful token endpoint answer. Never serialized back out.
#[derive(Deserialize)]
struct Grant {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    token_type: Option<String>,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn credentials(uaa: &MockServer) -> ClientCredentials {
        ClientCredentials {
            http: Some(HttpClientConfig::for_testing()),
            ..ClientCredentials::new(
                Url::parse(&uaa.url("/oauth/token")).unwrap(),
                "registry-client",
                SecretString::new("registry-secret"),
            )
        }
    }

    fn answer(uaa: &MockServer, status: u16, body: &str) {
        uaa.mock(|when, then| {
            when.method(POST).path("/oauth/token");
            then.status(status)
                .header("content-type", "application/json")
                .body(body);
        });
    }

    async fn exchange(credentials: &ClientCredentials) -> Result<TokenWithLifetime, TokenError> {
        Exchange::new(credentials).unwrap().request_token().await
    }

    #[tokio::test]
    async fn posts_client_credentials_grant() {
        let uaa = MockServer::start();
        let mock = uaa.mock(|when, then| {
            when.method(POST)
                .path("/oauth/token")
                .header(
                    "authorization",
                    "Basic cmVnaXN0cnktY2xpZW50OnJlZ2lzdHJ5LXNlY3JldA==",
                )
                .header("accept", "application/json")
                .header("content-type", "application/x-www-form-urlencoded")
                .body("grant_type=client_credentials");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"tok-reg","expires_in":43199,"token_type":"bearer","jti":"5a0d"}"#);
        });

        let token = exchange(&credentials(&uaa)).await.unwrap();
        assert_eq!(token.access_token().as_str(), "tok-reg");
        assert_eq!(token.lifetime(), DurationSecs(43_199));
        assert_eq!(token.stale() - token.issued(), DurationSecs(43_199 - 300));
        mock.assert();
    }

    #[tokio::test]
    async fn scopes_are_space_joined() {
        let uaa = MockServer::start();
        let mock = uaa.mock(|when, then| {
            when.method(POST)
                .path("/oauth/token")
                .body("grant_type=client_credentials&scope=registry.read+registry.write");
            then.status(200).body(r#"{"access_token":"tok"}"#);
        });

        let scoped = ClientCredentials {
            scopes: vec!["registry.read".into(), "registry.write".into()],
            ..credentials(&uaa)
        };
        exchange(&scoped).await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn missing_expires_in_uses_default_lifetime() {
        let uaa = MockServer::start();
        answer(&uaa, 200, r#"{"access_token":"tok"}"#);

        let token = exchange(&credentials(&uaa)).await.unwrap();
        assert_eq!(token.lifetime(), DurationSecs(300));
        // 5 min lifetime is not longer than the 5 min refresh margin
        assert_eq!(token.stale() - token.issued(), DurationSecs(150));
    }

    #[tokio::test]
    async fn rejected_request_reports_status_only() {
        let uaa = MockServer::start();
        answer(
            &uaa,
            401,
            r#"{"error":"unauthorized","error_description":"Bad credentials"}"#,
        );

        let err = exchange(&credentials(&uaa)).await.unwrap_err();
        assert!(matches!(err, TokenError::Rejected { status: 401 }), "{err}");
        assert!(!err.to_string().contains("Bad credentials"));
    }

    #[tokio::test]
    async fn odd_answers_are_refused() {
        let cases = [
            (r#"{"token_type":"bearer"}"#, "malformed"),
            (r#"{"access_token":""}"#, "empty access_token"),
            (r#"{"access_token":"tok","token_type":"mac"}"#, "'mac'"),
            ("<html>login</html>", "malformed"),
        ];
        for (body, expected) in cases {
            let uaa = MockServer::start();
            answer(&uaa, 200, body);
            let err = exchange(&credentials(&uaa)).await.unwrap_err();
            assert!(err.to_string().contains(expected), "{body}: {err}");
        }
    }

    #[tokio::test]
    async fn stale_point_keeps_refresh_margin() {
        let uaa = MockServer::start();
        let source = Exchange::new(&credentials(&uaa)).unwrap();

        assert_eq!(
            source.stale_after(Duration::from_secs(3600)),
            Duration::from_secs(3300)
        );
        assert_eq!(
            source.stale_after(Duration::from_secs(300)),
            Duration::from_secs(150)
        );
        assert_eq!(
            source.stale_after(Duration::from_secs(120)),
            Duration::from_secs(60)
        );
        assert_eq!(source.stale_after(Duration::ZERO), Duration::ZERO);
    }
}
