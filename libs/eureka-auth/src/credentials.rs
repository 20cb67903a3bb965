use std::time::Duration;

use eureka_http::HttpClientConfig;
use url::Url;

use crate::error::TokenError;
use crate::secret::SecretString;

/// Client-credentials grant for a token-protected registry, typically the
/// UAA client a platform binds to the application.
///
/// The secret is sent as HTTP Basic auth. `Debug` redacts it.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub token_uri: Url,
    pub client_id: String,
    pub client_secret: SecretString,
    /// Requested scopes, space-joined on the wire; empty sends none.
    pub scopes: Vec<String>,
    /// Refresh this long before the token expires. Tokens that live
    /// shorter than this are refreshed halfway through.
    pub refresh_before_expiry: Duration,
    /// Assumed lifetime when the endpoint omits `expires_in`.
    pub default_lifetime: Duration,
    /// First wait after a failed refresh; doubles up to 30 times this.
    pub retry_delay: Duration,
    /// Token endpoint HTTP settings, `HttpClientConfig::token_endpoint()`
    /// when unset.
    pub http: Option<HttpClientConfig>,
}

impl ClientCredentials {
    #[must_use]
    pub fn new(token_uri: Url, client_id: impl Into<String>, client_secret: SecretString) -> Self {
        Self {
            token_uri,
            client_id: client_id.into(),
            client_secret,
            scopes: Vec::new(),
            refresh_before_expiry: Duration::from_secs(5 * 60),
            default_lifetime: Duration::from_secs(5 * 60),
            retry_delay: Duration::from_secs(10),
            http: None,
        }
    }

    /// # Errors
    ///
    /// Returns [`TokenError::Credentials`] for a blank client id, an empty
    /// secret, a token URI that is not `http`/`https`, or a zero retry delay.
    pub fn validate(&self) -> Result<(), TokenError> {
        let problem = if self.client_id.trim().is_empty() {
            "client id is empty".to_owned()
        } else if self.client_secret.is_empty() {
            "client secret is empty".to_owned()
        } else if !matches!(self.token_uri.scheme(), "http" | "https") {
            format!("token URI scheme '{}' is not http(s)", self.token_uri.scheme())
        } else if self.retry_delay.is_zero() {
            "retry delay must be positive".to_owned()
        } else {
            return Ok(());
        };
        Err(TokenError::Credentials(problem))
    }

    /// Value of the `Authorization` header sent to the token endpoint.
    pub(crate) fn basic_authorization(&self) -> SecretString {
        use base64::Engine as _;

        let pair = zeroize::Zeroizing::new(format!(
            "{}:{}",
            self.client_id,
            self.client_secret.expose()
        ));
        let encoded =
            zeroize::Zeroizing::new(base64::engine::general_purpose::STANDARD.encode(pair.as_bytes()));
        SecretString::new(format!("Basic {}", encoded.as_str()))
    }
}
