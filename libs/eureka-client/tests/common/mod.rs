#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use eureka::{
    AmazonMetadata, App, Client, ClientConfig, DataCenter, DataCenterType, Instance, Lease, Port,
    RetryConfig, RetryDelay, Status,
};
use httpmock::{Mock, MockServer};
use time::OffsetDateTime;

pub const INSTANCE_XML: &str = include_str!("../fixtures/instance.xml");

/// The fixture as sent on the wire: no indentation, no line breaks.
pub fn compact(xml: &str) -> String {
    xml.lines().map(str::trim).collect()
}

fn millis(ms: i128) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(ms * 1_000_000).unwrap()
}

/// The value described by `fixtures/instance.xml`.
pub fn fixture_instance() -> Instance {
    Instance {
        id: "id".into(),
        host_name: "host".into(),
        app_name: "myapp".into(),
        ip_addr: "1.2.3.4".into(),
        vip_address: "vip.address".into(),
        secure_vip_address: "secure.vip.address".into(),
        status: Status::Up,
        status_override: Status::Unknown,
        port: Port::enabled(80),
        secure_port: Port::enabled(443),
        home_page_url: "home.page.url".into(),
        status_page_url: "status.page.url".into(),
        health_check_url: "health.check.url".into(),
        lease: Lease {
            renewal_interval: Duration::from_secs(30),
            duration: Duration::from_secs(90),
            registration_time: millis(1_468_519_783_576),
            last_renewal_time: millis(1_468_519_783_577),
            eviction_time: millis(1_468_519_783_578),
            service_up_time: millis(1_468_519_783_579),
        },
        data_center: DataCenter {
            kind: DataCenterType::MyOwn,
            metadata: Some(AmazonMetadata {
                host_name: "dchost".into(),
                public_host_name: "dc.public.host".into(),
                local_host_name: "dc.local.host".into(),
                public_ipv4: "1.2.3.5".into(),
                local_ipv4: "1.2.3.6".into(),
                availability_zone: "az".into(),
                instance_id: "instance.id".into(),
                instance_type: "instance.type".into(),
                ami_id: "ami.id".into(),
                ami_launch_index: "ami.launch.index".into(),
                ami_manifest_path: "ami.manifest.path".into(),
            }),
        },
        metadata: BTreeMap::from([
            ("a".to_owned(), "one".to_owned()),
            ("b".to_owned(), "two".to_owned()),
        ]),
    }
}

pub fn instance(app: &str, id: &str, status: Status) -> Instance {
    Instance {
        id: id.into(),
        app_name: app.into(),
        host_name: format!("{id}.local"),
        status,
        ..fixture_instance()
    }
}

pub fn app(name: &str, instances: Vec<Instance>) -> App {
    App {
        name: name.into(),
        instances,
    }
}

/// `GET /apps` response body for `apps`.
pub fn apps_body(apps: Vec<App>) -> String {
    eureka::codec::encode(&eureka::AppsResponse {
        versions_delta: Some("1".into()),
        apps_hashcode: Some("UP_1_".into()),
        apps,
    })
    .unwrap()
}

pub fn client(server: &MockServer, max_attempts: usize) -> Client {
    Client::new(ClientConfig {
        retry: RetryConfig::new(max_attempts, RetryDelay::None),
        request_timeout: Duration::from_secs(5),
        ..ClientConfig::new([server.url("/eureka")])
    })
    .unwrap()
}

/// Poll `condition` until it holds or `within` elapses.
pub async fn eventually<F, Fut>(within: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition().await
}

/// Wait until `mock` has answered at least `calls` requests in total.
pub async fn calls_reach(mock: &Mock<'_>, calls: usize) -> bool {
    eventually(Duration::from_secs(5), move || async move { mock.calls() >= calls }).await
}
