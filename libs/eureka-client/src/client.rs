use std::time::Duration;

use http::Method;
use serde::de::DeserializeOwned;

use crate::codec;
use crate::config::{ClientConfig, WatchConfig};
use crate::error::RegistryError;
use crate::heartbeat::HeartbeatTask;
use crate::model::{App, AppsResponse, Instance, Status};
use crate::transport::{RegistryRequest, Transport};
use crate::watcher::Watcher;

/// Registry client.
///
/// Cheap to clone; clones share the connection pool and can be used from
/// any number of tasks at once.
///
/// ```ignore
/// let client = Client::new(ClientConfig::new(["http://registry:8761/eureka"]))?;
/// client.register(&instance).await?;
/// for app in client.apps().await? {
///     println!("{}: {} instances", app.name, app.instances.len());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    transport: Transport,
}

impl Client {
    /// Validate `config` and build the HTTP stack. Must be called within a
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Config`] if the configuration is invalid.
    pub fn new(config: ClientConfig) -> Result<Self, RegistryError> {
        Ok(Self {
            transport: Transport::new(config)?,
        })
    }

    /// Validated endpoint base URLs, in failover order.
    #[must_use]
    pub fn endpoints(&self) -> &[url::Url] {
        self.transport.endpoints()
    }

    /// Announce `instance` under its app name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the body cannot be encoded or the
    /// registry does not accept it.
    pub async fn register(&self, instance: &Instance) -> Result<(), RegistryError> {
        let body = codec::encode(instance).map_err(RegistryError::Encode)?;
        self.transport
            .execute(
                RegistryRequest::new(Method::POST, &["apps", instance.app_name.as_str()])
                    .body(body),
            )
            .await?;
        Ok(())
    }

    /// Remove `instance` from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on transport failure or a non-2xx answer.
    pub async fn deregister(&self, instance: &Instance) -> Result<(), RegistryError> {
        self.transport
            .execute(RegistryRequest::new(
                Method::DELETE,
                &["apps", instance.app_name.as_str(), instance.id.as_str()],
            ))
            .await?;
        Ok(())
    }

    /// Renew the lease of `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on transport failure or a non-2xx answer;
    /// a 404 means the registry no longer knows the instance.
    pub async fn heartbeat(&self, instance: &Instance) -> Result<(), RegistryError> {
        self.transport
            .execute(RegistryRequest::new(
                Method::PUT,
                &["apps", instance.app_name.as_str(), instance.id.as_str()],
            ))
            .await?;
        Ok(())
    }

    /// All registered apps, in the order the registry lists them.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on transport failure, a non-2xx answer or
    /// an undecodable body.
    pub async fn apps(&self) -> Result<Vec<App>, RegistryError> {
        let response: AppsResponse = self
            .get(RegistryRequest::new(Method::GET, &["apps"]))
            .await?;
        Ok(response.apps)
    }

    /// # Errors
    ///
    /// Returns [`RegistryError`] on transport failure, a non-2xx answer or
    /// an undecodable body.
    pub async fn app(&self, name: &str) -> Result<App, RegistryError> {
        self.get(RegistryRequest::new(Method::GET, &["apps", name]))
            .await
    }

    /// # Errors
    ///
    /// Returns [`RegistryError`] on transport failure, a non-2xx answer or
    /// an undecodable body.
    pub async fn app_instance(&self, app: &str, id: &str) -> Result<Instance, RegistryError> {
        self.get(RegistryRequest::new(Method::GET, &["apps", app, id]))
            .await
    }

    /// Look an instance up by id alone.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on transport failure, a non-2xx answer or
    /// an undecodable body.
    pub async fn instance(&self, id: &str) -> Result<Instance, RegistryError> {
        self.get(RegistryRequest::new(Method::GET, &["instances", id]))
            .await
    }

    /// Set an administrative status override on `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on transport failure or a non-2xx answer.
    pub async fn status_override(
        &self,
        instance: &Instance,
        status: Status,
    ) -> Result<(), RegistryError> {
        self.transport
            .execute(
                RegistryRequest::new(Method::PUT, &status_path(instance))
                    .query("value", status.as_str()),
            )
            .await?;
        Ok(())
    }

    /// Clear the override on `instance`; the registry reports `fallback`
    /// until the instance sends its own status again.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on transport failure or a non-2xx answer.
    pub async fn remove_status_override(
        &self,
        instance: &Instance,
        fallback: Status,
    ) -> Result<(), RegistryError> {
        self.transport
            .execute(
                RegistryRequest::new(Method::DELETE, &status_path(instance))
                    .query("value", fallback.as_str()),
            )
            .await?;
        Ok(())
    }

    /// Start polling `apps()` every `poll_interval` and emit change events.
    #[must_use]
    pub fn watch(&self, poll_interval: Duration) -> Watcher {
        self.watch_with(WatchConfig::new(poll_interval))
    }

    #[must_use]
    pub fn watch_with(&self, config: WatchConfig) -> Watcher {
        Watcher::spawn(self.clone(), config)
    }

    /// Send a heartbeat for `instance` now and then every `interval` until
    /// the returned task is stopped or dropped.
    #[must_use]
    pub fn spawn_heartbeat(&self, instance: Instance, interval: Duration) -> HeartbeatTask {
        HeartbeatTask::spawn(self.clone(), instance, interval)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        request: RegistryRequest<'_>,
    ) -> Result<T, RegistryError> {
        let body = self.transport.execute(request).await?;
        codec::decode(&body).map_err(RegistryError::Decode)
    }
}

fn status_path(instance: &Instance) -> [&str; 4] {
    ["apps", &instance.app_name, &instance.id, "status"]
}
