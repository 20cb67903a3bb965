//! Registry data model.
//!
//! Values are plain snapshots decoded fresh from every response. The serde
//! attributes describe the registry's XML schema and are driven by
//! [`codec`](crate::codec).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

/// Availability state of an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    Up,
    Down,
    Starting,
    OutOfService,
    #[default]
    Unknown,
}

impl Status {
    /// Wire name, e.g. `OUT_OF_SERVICE`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Starting => "STARTING",
            Self::OutOfService => "OUT_OF_SERVICE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a status name outside the registry's vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown instance status '{0}'")]
pub struct ParseStatusError(pub String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "UP" => Ok(Self::Up),
            "DOWN" => Ok(Self::Down),
            "STARTING" => Ok(Self::Starting),
            "OUT_OF_SERVICE" => Ok(Self::OutOfService),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(ParseStatusError(other.to_owned())),
        }
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// A port number plus the registry's `enabled` flag:
/// `<port enabled="true">8080</port>`.
///
/// A missing `enabled` attribute reads as enabled, and so does the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    #[serde(rename = "@enabled", default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(rename = "$text")]
    pub number: u16,
}

fn enabled_by_default() -> bool {
    true
}

impl Default for Port {
    fn default() -> Self {
        Self::enabled(0)
    }
}

impl Port {
    #[must_use]
    pub fn enabled(number: u16) -> Self {
        Self {
            enabled: true,
            number,
        }
    }

    #[must_use]
    pub fn disabled(number: u16) -> Self {
        Self {
            enabled: false,
            number,
        }
    }
}

impl From<u16> for Port {
    fn from(number: u16) -> Self {
        Self::enabled(number)
    }
}

/// Keep-alive contract communicated by the registry.
///
/// Intervals travel as whole seconds, timestamps as Unix epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    #[serde(rename = "renewalIntervalInSecs", with = "seconds", default = "default_renewal")]
    pub renewal_interval: Duration,
    #[serde(rename = "durationInSecs", with = "seconds", default = "default_duration")]
    pub duration: Duration,
    #[serde(rename = "registrationTimestamp", with = "epoch_millis", default = "epoch")]
    pub registration_time: OffsetDateTime,
    #[serde(rename = "lastRenewalTimestamp", with = "epoch_millis", default = "epoch")]
    pub last_renewal_time: OffsetDateTime,
    #[serde(rename = "evictionTimestamp", with = "epoch_millis", default = "epoch")]
    pub eviction_time: OffsetDateTime,
    #[serde(rename = "serviceUpTimestamp", with = "epoch_millis", default = "epoch")]
    pub service_up_time: OffsetDateTime,
}

fn default_renewal() -> Duration {
    Duration::from_secs(30)
}

fn default_duration() -> Duration {
    Duration::from_secs(90)
}

fn epoch() -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH
}

impl Default for Lease {
    fn default() -> Self {
        Self {
            renewal_interval: default_renewal(),
            duration: default_duration(),
            registration_time: epoch(),
            last_renewal_time: epoch(),
            eviction_time: epoch(),
            service_up_time: epoch(),
        }
    }
}

/// Where the instance runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataCenterType {
    Amazon,
    #[default]
    MyOwn,
}

impl DataCenterType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amazon => "Amazon",
            Self::MyOwn => "MyOwn",
        }
    }
}

impl Serialize for DataCenterType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DataCenterType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.trim() {
            "Amazon" => Ok(Self::Amazon),
            "MyOwn" => Ok(Self::MyOwn),
            other => Err(D::Error::custom(format!(
                "unknown data center name '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCenter {
    #[serde(rename = "name")]
    pub kind: DataCenterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AmazonMetadata>,
}

/// EC2 instance metadata, as published by AWS-hosted instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmazonMetadata {
    #[serde(rename = "hostname")]
    pub host_name: String,
    #[serde(rename = "public-hostname")]
    pub public_host_name: String,
    #[serde(rename = "local-hostname")]
    pub local_host_name: String,
    #[serde(rename = "public-ipv4")]
    pub public_ipv4: String,
    #[serde(rename = "local-ipv4")]
    pub local_ipv4: String,
    #[serde(rename = "availability-zone")]
    pub availability_zone: String,
    #[serde(rename = "instance-id")]
    pub instance_id: String,
    #[serde(rename = "instance-type")]
    pub instance_type: String,
    #[serde(rename = "ami-id")]
    pub ami_id: String,
    #[serde(rename = "ami-launch-index")]
    pub ami_launch_index: String,
    #[serde(rename = "ami-manifest-path")]
    pub ami_manifest_path: String,
}

/// Identity of an instance within the registry: `(app name, instance id)`.
pub type InstanceKey = (String, String);

/// One registered service endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "instance", try_from = "InstanceWire")]
pub struct Instance {
    pub id: String,
    #[serde(rename = "hostName")]
    pub host_name: String,
    #[serde(rename = "app")]
    pub app_name: String,
    #[serde(rename = "ipAddr")]
    pub ip_addr: String,
    #[serde(rename = "vipAddress")]
    pub vip_address: String,
    #[serde(rename = "secureVipAddress")]
    pub secure_vip_address: String,
    pub status: Status,
    /// Administrative override; `Unknown` means none.
    #[serde(rename = "overriddenStatus")]
    pub status_override: Status,
    pub port: Port,
    #[serde(rename = "securePort")]
    pub secure_port: Port,
    #[serde(rename = "homePageUrl")]
    pub home_page_url: String,
    #[serde(rename = "statusPageUrl")]
    pub status_page_url: String,
    #[serde(rename = "healthCheckUrl")]
    pub health_check_url: String,
    #[serde(rename = "leaseInfo")]
    pub lease: Lease,
    #[serde(rename = "dataCenterInfo")]
    pub data_center: DataCenter,
    pub metadata: BTreeMap<String, String>,
}

impl Instance {
    #[must_use]
    pub fn key(&self) -> InstanceKey {
        (self.app_name.clone(), self.id.clone())
    }

    /// The override when one is set, the reported status otherwise.
    ///
    /// Informational only; nothing in this crate enforces it.
    #[must_use]
    pub fn effective_status(&self) -> Status {
        if self.status_override == Status::Unknown {
            self.status
        } else {
            self.status_override
        }
    }
}

/// Decoding shape of `<instance>`.
///
/// Registries differ in element names: older servers send `instanceId` and
/// `overriddenstatus`, newer ones send `overriddenStatus` as well.
#[derive(Deserialize)]
struct InstanceWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "instanceId", default)]
    instance_id: Option<String>,
    #[serde(rename = "hostName", default)]
    host_name: String,
    #[serde(default)]
    app: Option<String>,
    #[serde(rename = "ipAddr", default)]
    ip_addr: String,
    #[serde(rename = "vipAddress", default)]
    vip_address: String,
    #[serde(rename = "secureVipAddress", default)]
    secure_vip_address: String,
    #[serde(default)]
    status: Status,
    #[serde(rename = "overriddenStatus", default)]
    overridden_status: Option<Status>,
    #[serde(rename = "overriddenstatus", default)]
    overridden_status_legacy: Option<Status>,
    #[serde(default)]
    port: Port,
    #[serde(rename = "securePort", default)]
    secure_port: Port,
    #[serde(rename = "homePageUrl", default)]
    home_page_url: String,
    #[serde(rename = "statusPageUrl", default)]
    status_page_url: String,
    #[serde(rename = "healthCheckUrl", default)]
    health_check_url: String,
    #[serde(rename = "leaseInfo", default)]
    lease: Lease,
    #[serde(rename = "dataCenterInfo", default)]
    data_center: DataCenter,
    #[serde(default, deserialize_with = "metadata_map")]
    metadata: BTreeMap<String, String>,
}

impl TryFrom<InstanceWire> for Instance {
    type Error = String;

    fn try_from(wire: InstanceWire) -> Result<Self, Self::Error> {
        let id = wire
            .id
            .or(wire.instance_id)
            .ok_or_else(|| "instance has neither <id> nor <instanceId>".to_owned())?;
        let app_name = wire
            .app
            .ok_or_else(|| format!("instance '{id}' has no <app>"))?;

        Ok(Self {
            id,
            host_name: wire.host_name,
            app_name,
            ip_addr: wire.ip_addr,
            vip_address: wire.vip_address,
            secure_vip_address: wire.secure_vip_address,
            status: wire.status,
            status_override: wire
                .overridden_status
                .or(wire.overridden_status_legacy)
                .unwrap_or_default(),
            port: wire.port,
            secure_port: wire.secure_port,
            home_page_url: wire.home_page_url,
            status_page_url: wire.status_page_url,
            health_check_url: wire.health_check_url,
            lease: wire.lease,
            data_center: wire.data_center,
            metadata: wire.metadata,
        })
    }
}

/// A named group of instances. Instance order is wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "application")]
pub struct App {
    pub name: String,
    #[serde(rename = "instance", default)]
    pub instances: Vec<Instance>,
}

/// Body of `GET /apps`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "applications")]
pub struct AppsResponse {
    #[serde(
        rename = "versions__delta",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub versions_delta: Option<String>,
    #[serde(
        rename = "apps__hashcode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub apps_hashcode: Option<String>,
    #[serde(rename = "application", default)]
    pub apps: Vec<App>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    InstanceRegistered,
    InstanceDeregistered,
    InstanceStatusChanged,
}

/// A change detected between two registry snapshots.
///
/// For a deregistration, `instance` is the last value seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub instance: Instance,
}

// Attributes such as `class="java.util.Collections$EmptyMap"` show up as
// `@`-prefixed keys.
fn metadata_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    let mut map = BTreeMap::<String, String>::deserialize(deserializer)?;
    map.retain(|key, _| !key.starts_with('@'));
    Ok(map)
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod epoch_millis {
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    const NANOS_PER_MILLI: i128 = 1_000_000;

    pub fn serialize<S: Serializer>(
        value: &OffsetDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let millis = value.unix_timestamp_nanos().div_euclid(NANOS_PER_MILLI);
        serializer.serialize_i64(i64::try_from(millis).map_err(S::Error::custom)?)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<OffsetDateTime, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * NANOS_PER_MILLI)
            .map_err(D::Error::custom)
    }
}
