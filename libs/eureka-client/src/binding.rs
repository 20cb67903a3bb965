//! Registry discovery from platform service bindings.
//!
//! A [`BindingProvider`] turns whatever the platform injects into the
//! application environment into registry endpoints and OAuth credentials.
//! [`CloudFoundryBinding`] reads the `VCAP_*` variables set by Cloud Foundry
//! for a bound `p-service-registry` service instance.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use eureka_auth::{ClientCredentials, SecretString, Token, TokenProvider};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::ClientConfig;
use crate::error::RegistryError;
use crate::model::{Instance, Port, Status};

pub const SERVICE_REGISTRY_LABEL: &str = "p-service-registry";

const VCAP_SERVICES: &str = "VCAP_SERVICES";
const VCAP_APPLICATION: &str = "VCAP_APPLICATION";
const PORT: &str = "PORT";
const CF_INSTANCE_IP: &str = "CF_INSTANCE_IP";
const CF_INSTANCE_GUID: &str = "CF_INSTANCE_GUID";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BindingError {
    #[error("environment variable {0} is not set")]
    MissingVariable(&'static str),

    #[error("{variable} is not valid JSON: {source}")]
    InvalidJson {
        variable: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("service '{0}' is not bound to this application")]
    ServiceNotBound(String),

    #[error("service '{0}' has no bindings")]
    EmptyBinding(String),

    #[error(
        "service '{0}' binding has incomplete OAuth credentials \
         (client_id, client_secret and access_token_uri go together)"
    )]
    IncompleteCredentials(String),

    #[error("PORT value '{0}' is not a valid port number")]
    InvalidPort(String),

    #[error("VCAP_APPLICATION lists no application URIs")]
    MissingApplicationUri,

    #[error("invalid {field} '{url}': {source}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Source of registry endpoints and credentials.
pub trait BindingProvider {
    /// # Errors
    ///
    /// Returns [`BindingError`] when the platform data is missing or malformed.
    fn resolve(&self) -> Result<RegistryBinding, BindingError>;
}

/// OAuth2 client credentials issued with a registry binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub token_uri: Url,
}

impl From<OAuthCredentials> for ClientCredentials {
    fn from(credentials: OAuthCredentials) -> Self {
        ClientCredentials::new(
            credentials.token_uri,
            credentials.client_id,
            credentials.client_secret,
        )
    }
}

/// Registry endpoints plus optional credentials, as found in a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryBinding {
    pub endpoints: Vec<String>,
    pub credentials: Option<OAuthCredentials>,
}

impl RegistryBinding {
    /// Build a client configuration, fetching the first token when the
    /// binding carries credentials.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Auth`] if the token exchange fails.
    pub async fn into_client_config(self) -> Result<ClientConfig, RegistryError> {
        let auth = match self.credentials {
            Some(credentials) => {
                let token = Token::fetch(credentials.into()).await?;
                Some(Arc::new(token) as Arc<dyn TokenProvider>)
            }
            None => None,
        };
        Ok(ClientConfig {
            auth,
            ..ClientConfig::new(self.endpoints)
        })
    }
}

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Cloud Foundry environment binding.
#[derive(Clone)]
pub struct CloudFoundryBinding {
    lookup: Lookup,
}

impl CloudFoundryBinding {
    /// Read from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Read variables through `lookup` instead of the process environment.
    #[must_use]
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    /// Describe this application instance for registration.
    ///
    /// The host name is `ip:port`, both VIP addresses are the instance IP, and
    /// the status and health check URLs hang off the first application URI.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError`] if a variable is missing or malformed, or the
    /// application has no routes.
    pub fn local_instance(&self) -> Result<Instance, BindingError> {
        let raw_port = self.var(PORT)?;
        let port = raw_port
            .trim()
            .parse::<u16>()
            .map_err(|_| BindingError::InvalidPort(raw_port.clone()))?;
        let ip = self.var(CF_INSTANCE_IP)?;
        let guid = self.var(CF_INSTANCE_GUID)?;
        let application: VcapApplication = self.json(VCAP_APPLICATION)?;

        let home = application
            .application_uris
            .into_iter()
            .next()
            .ok_or(BindingError::MissingApplicationUri)?;

        Ok(Instance {
            id: guid,
            host_name: format!("{ip}:{port}"),
            app_name: application.application_name,
            vip_address: ip.clone(),
            secure_vip_address: ip.clone(),
            ip_addr: ip,
            status: Status::Up,
            status_override: Status::Unknown,
            port: Port::enabled(port),
            secure_port: Port::enabled(port),
            status_page_url: format!("{home}/status"),
            health_check_url: format!("{home}/health"),
            home_page_url: home,
            ..Instance::default()
        })
    }

    fn var(&self, name: &'static str) -> Result<String, BindingError> {
        (self.lookup)(name).ok_or(BindingError::MissingVariable(name))
    }

    fn json<T: serde::de::DeserializeOwned>(&self, name: &'static str) -> Result<T, BindingError> {
        let raw = self.var(name)?;
        serde_json::from_str(&raw).map_err(|source| BindingError::InvalidJson {
            variable: name,
            source,
        })
    }
}

impl BindingProvider for CloudFoundryBinding {
    fn resolve(&self) -> Result<RegistryBinding, BindingError> {
        let services: HashMap<String, serde_json::Value> = self.json(VCAP_SERVICES)?;
        let bindings = services
            .get(SERVICE_REGISTRY_LABEL)
            .ok_or_else(|| BindingError::ServiceNotBound(SERVICE_REGISTRY_LABEL.to_owned()))?;
        let bindings = Vec::<ServiceBinding>::deserialize(bindings).map_err(|source| {
            BindingError::InvalidJson {
                variable: VCAP_SERVICES,
                source,
            }
        })?;
        let credentials = bindings
            .into_iter()
            .next()
            .ok_or_else(|| BindingError::EmptyBinding(SERVICE_REGISTRY_LABEL.to_owned()))?
            .credentials;

        let endpoint = format!("{}/eureka", credentials.uri.trim_end_matches('/'));
        let oauth = match (
            credentials.client_id,
            credentials.client_secret,
            credentials.access_token_uri,
        ) {
            (Some(client_id), Some(client_secret), Some(token_uri)) => Some(OAuthCredentials {
                client_id,
                client_secret: SecretString::new(client_secret),
                token_uri: Url::parse(&token_uri).map_err(|source| BindingError::InvalidUrl {
                    field: "access_token_uri",
                    url: token_uri.clone(),
                    source,
                })?,
            }),
            (None, None, None) => None,
            _ => {
                return Err(BindingError::IncompleteCredentials(
                    SERVICE_REGISTRY_LABEL.to_owned(),
                ));
            }
        };

        tracing::debug!(
            endpoint = %endpoint,
            oauth = oauth.is_some(),
            "resolved registry binding"
        );

        Ok(RegistryBinding {
            endpoints: vec![endpoint],
            credentials: oauth,
        })
    }
}

impl fmt::Debug for CloudFoundryBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudFoundryBinding").finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct VcapApplication {
    application_name: String,
    #[serde(default)]
    application_uris: Vec<String>,
}

#[derive(Deserialize)]
struct ServiceBinding {
    credentials: RegistryCredentials,
}

#[derive(Deserialize)]
struct RegistryCredentials {
    uri: String,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    access_token_uri: Option<String>,
}
