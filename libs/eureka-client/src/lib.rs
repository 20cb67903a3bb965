#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Client for REST/XML service registries (Eureka protocol)
//!
//! - [`Client`]: register, deregister, heartbeat, queries and status overrides
//! - [`Watcher`]: polls the registry and emits [`Event`]s for membership and
//!   status changes
//! - [`HeartbeatTask`]: keeps a registration alive in the background
//! - [`binding`]: endpoint and credential discovery from platform bindings
//!
//! Every call goes through the `eureka-http` stack: attempts are limited and
//! spaced by the configured [`RetryConfig`], then endpoints are tried in
//! order while requests fail without an answer. A non-2xx answer on the
//! last attempt becomes [`RegistryError::UnexpectedStatus`].
//!
//! # Example
//!
//! ```ignore
//! use eureka::{Client, ClientConfig, EventKind};
//! use std::time::Duration;
//!
//! let client = Client::new(ClientConfig::new(["http://registry:8761/eureka"]))?;
//! client.register(&instance).await?;
//! let heartbeat = client.spawn_heartbeat(instance.clone(), Duration::from_secs(30));
//!
//! let mut watcher = client.watch(Duration::from_secs(30));
//! while let Some(event) = watcher.events().recv().await {
//!     if event.kind == EventKind::InstanceRegistered {
//!         println!("{} joined", event.instance.id);
//!     }
//! }
//! ```

pub mod binding;
mod client;
pub mod codec;
mod config;
mod error;
mod heartbeat;
mod model;
mod task;
mod transport;
mod watcher;

pub use binding::{
    BindingError, BindingProvider, CloudFoundryBinding, OAuthCredentials, RegistryBinding,
};
pub use client::Client;
pub use config::{ClientConfig, DEFAULT_USER_AGENT, WatchConfig};
pub use error::RegistryError;
pub use heartbeat::HeartbeatTask;
pub use model::{
    AmazonMetadata, App, AppsResponse, DataCenter, DataCenterType, Event, EventKind, Instance,
    InstanceKey, Lease, ParseStatusError, Port, Status,
};
pub use task::StopHandle;
pub use watcher::{EventReceiver, Watcher};

pub use eureka_auth::{ClientCredentials, StaticToken, Token, TokenProvider};
pub use eureka_http::{
    ExponentialBackoff, RetryConfig, RetryDelay, TlsConfig, TlsRootConfig, TransportSecurity,
};
