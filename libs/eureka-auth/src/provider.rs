use std::fmt;

use aliri_clock::DurationSecs;
use aliri_tokens::backoff::ErrorBackoffConfig;
use aliri_tokens::jitter::RandomEarlyJitter;
use aliri_tokens::{TokenStatus, TokenWatcher};

use crate::credentials::ClientCredentials;
use crate::error::TokenError;
use crate::exchange::Exchange;
use crate::secret::SecretString;

/// Source of the bearer token attached to registry requests.
///
/// Called once per attempt and must not block.
pub trait TokenProvider: fmt::Debug + Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns [`TokenError`] when no valid token is available right now.
    fn access_token(&self) -> Result<SecretString, TokenError>;
}

/// A token obtained out of band that never changes.
#[derive(Debug, Clone)]
pub struct StaticToken(SecretString);

impl StaticToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token))
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Result<SecretString, TokenError> {
        Ok(self.0.clone())
    }
}

/// Client-credentials token kept fresh by a background `aliri_tokens`
/// watcher. Clones share the watcher.
#[derive(Clone)]
pub struct Token {
    watcher: TokenWatcher,
}

impl Token {
    /// Exchange `credentials` for a first token and start refreshing it.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Credentials`] for invalid credentials, or the
    /// failure of the first exchange.
    pub async fn fetch(credentials: ClientCredentials) -> Result<Self, TokenError> {
        credentials.validate()?;

        let exchange = Exchange::new(&credentials)?;
        // Spread refreshes of many instances over a tenth of the margin.
        let jitter = RandomEarlyJitter::new(DurationSecs(
            (credentials.refresh_before_expiry / 10).as_secs().max(1),
        ));
        let backoff = ErrorBackoffConfig::new(
            credentials.retry_delay,
            credentials.retry_delay * 30,
            2,
        );
        let watcher = TokenWatcher::spawn_from_token_source(exchange, jitter, backoff).await?;

        tracing::info!(
            token_uri = %credentials.token_uri,
            client_id = %credentials.client_id,
            "registry access token acquired"
        );
        Ok(Self { watcher })
    }
}

impl TokenProvider for Token {
    fn access_token(&self) -> Result<SecretString, TokenError> {
        let current = self.watcher.token();
        match current.token_status() {
            TokenStatus::Expired => Err(TokenError::Expired),
            TokenStatus::Fresh | TokenStatus::Stale => {
                Ok(SecretString::new(current.access_token().as_str()))
            }
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token").finish_non_exhaustive()
    }
}
