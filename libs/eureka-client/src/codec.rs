//! XML encoding of registry payloads.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub const XML_CONTENT_TYPE: &str = "application/xml";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("XML encoding failed: {0}")]
    Encode(String),

    #[error("XML decoding failed: {0}")]
    Decode(#[from] quick_xml::DeError),

    #[error("response body is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("response body exceeds {limit} bytes (read {actual})")]
    TooLarge { limit: usize, actual: usize },
}

/// Encode `value` as an XML document rooted at its serde name, without an
/// XML declaration or indentation.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the value has no XML representation.
pub fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
    quick_xml::se::to_string(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode an XML document. The root element name is not checked.
///
/// # Errors
///
/// Returns [`CodecError`] on invalid UTF-8, malformed XML or a document that
/// does not match `T`.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, CodecError> {
    let text = std::str::from_utf8(body)?;
    Ok(quick_xml::de::from_str(text)?)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::model::{App, AppsResponse, DataCenterType, Instance, Port, Status};
    use std::time::Duration;
    use time::OffsetDateTime;

    const REAL_SERVER_INSTANCE: &str = r#"
        <instance>
          <instanceId>billing-7f9c:billing:8080</instanceId>
          <hostName>10.0.4.17</hostName>
          <app>BILLING</app>
          <ipAddr>10.0.4.17</ipAddr>
          <status>UP</status>
          <overriddenstatus>UNKNOWN</overriddenstatus>
          <overriddenStatus>OUT_OF_SERVICE</overriddenStatus>
          <port enabled="true">8080</port>
          <securePort enabled="false">443</securePort>
          <countryId>1</countryId>
          <dataCenterInfo class="com.netflix.appinfo.InstanceInfo$DefaultDataCenterInfo">
            <name>MyOwn</name>
          </dataCenterInfo>
          <leaseInfo>
            <renewalIntervalInSecs>30</renewalIntervalInSecs>
            <durationInSecs>90</durationInSecs>
            <registrationTimestamp>1468519783576</registrationTimestamp>
            <lastRenewalTimestamp>1468519783577</lastRenewalTimestamp>
            <evictionTimestamp>0</evictionTimestamp>
            <serviceUpTimestamp>1468519783579</serviceUpTimestamp>
          </leaseInfo>
          <metadata class="java.util.Collections$EmptyMap"/>
          <homePageUrl>http://10.0.4.17:8080/</homePageUrl>
          <statusPageUrl>http://10.0.4.17:8080/info</statusPageUrl>
          <healthCheckUrl>http://10.0.4.17:8080/health</healthCheckUrl>
          <vipAddress>billing</vipAddress>
          <secureVipAddress>billing</secureVipAddress>
          <isCoordinatingDiscoveryServer>false</isCoordinatingDiscoveryServer>
          <lastUpdatedTimestamp>1468519783579</lastUpdatedTimestamp>
          <actionType>ADDED</actionType>
        </instance>"#;

    #[test]
    fn decodes_server_dialect() {
        let instance: Instance = decode(REAL_SERVER_INSTANCE.as_bytes()).unwrap();

        assert_eq!(instance.id, "billing-7f9c:billing:8080");
        assert_eq!(instance.app_name, "BILLING");
        assert_eq!(instance.status, Status::Up);
        assert_eq!(instance.status_override, Status::OutOfService);
        assert_eq!(instance.port, Port::enabled(8080));
        assert_eq!(instance.secure_port, Port::disabled(443));
        assert_eq!(instance.data_center.kind, DataCenterType::MyOwn);
        assert!(instance.data_center.metadata.is_none());
        assert!(instance.metadata.is_empty(), "{:?}", instance.metadata);
        assert_eq!(instance.lease.renewal_interval, Duration::from_secs(30));
        assert_eq!(instance.lease.eviction_time, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(
            instance.lease.registration_time.unix_timestamp_nanos(),
            1_468_519_783_576_000_000
        );
    }

    #[test]
    fn legacy_override_element_is_accepted() {
        let xml = r"<instance><instanceId>i-1</instanceId><app>A</app>
            <status>DOWN</status><overriddenstatus>UP</overriddenstatus></instance>";
        let instance: Instance = decode(xml.as_bytes()).unwrap();
        assert_eq!(instance.status_override, Status::Up);
        assert_eq!(instance.effective_status(), Status::Up);
    }

    #[test]
    fn instance_without_app_is_rejected() {
        let err = decode::<Instance>(b"<instance><id>i-1</id></instance>").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)), "{err}");
        assert!(err.to_string().contains("<app>"), "{err}");
    }

    #[test]
    fn unknown_status_is_rejected() {
        let xml = b"<instance><id>i-1</id><app>A</app><status>SLEEPING</status></instance>";
        let err = decode::<Instance>(xml).unwrap_err();
        assert!(err.to_string().contains("SLEEPING"), "{err}");
    }

    #[test]
    fn empty_registry() {
        let apps: AppsResponse = decode(
            b"<applications><versions__delta>1</versions__delta>\
              <apps__hashcode></apps__hashcode></applications>",
        )
        .unwrap();
        assert!(apps.apps.is_empty());
        assert_eq!(apps.versions_delta.as_deref(), Some("1"));
    }

    #[test]
    fn app_keeps_wire_order() {
        let xml = b"<application><name>BILLING</name>\
            <instance><id>b</id><app>BILLING</app><status>UP</status></instance>\
            <instance><id>a</id><app>BILLING</app><status>DOWN</status></instance>\
            </application>";
        let app: App = decode(xml).unwrap();
        let ids: Vec<_> = app.instances.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let err = decode::<App>(&[0x3c, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, CodecError::Utf8(_)));
    }
}
