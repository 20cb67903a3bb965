#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Bearer-token authentication for registry requests
//!
//! Registries behind an `OAuth2` gateway expect `Authorization: Bearer
//! <token>` on every call. [`BearerAuthLayer`] writes that header from any
//! [`TokenProvider`]: a fixed [`StaticToken`], or a [`Token`] obtained with
//! the client-credentials grant and refreshed in the background.
//!
//! ```ignore
//! use eureka_auth::{ClientCredentials, HttpClientBuilderExt, Token};
//!
//! let token = Token::fetch(ClientCredentials::new(token_uri, client_id, secret)).await?;
//! let http = HttpClientBuilder::new().with_bearer_auth(Arc::new(token)).build()?;
//! ```

mod bearer;
mod credentials;
mod error;
mod exchange;
mod provider;
mod secret;

pub use bearer::{BearerAuthLayer, BearerAuthService, HttpClientBuilderExt};
pub use credentials::ClientCredentials;
pub use error::TokenError;
pub use provider::{StaticToken, Token, TokenProvider};
pub use secret::SecretString;
