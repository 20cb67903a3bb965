#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end client-credentials flow: mock UAA token endpoint, `Token`,
//! bearer-authenticated `HttpClient`, mock registry.

use std::sync::Arc;
use std::time::Duration;

use eureka_auth::{
    ClientCredentials, HttpClientBuilderExt, SecretString, StaticToken, Token, TokenProvider,
};
use httpmock::prelude::*;
use url::Url;

fn token_json(token: &str, expires_in: u64) -> String {
    format!(r#"{{"access_token":"{token}","expires_in":{expires_in},"token_type":"bearer"}}"#)
}

fn uaa_credentials(uaa: &MockServer) -> ClientCredentials {
    ClientCredentials {
        http: Some(eureka_http::HttpClientConfig::for_testing()),
        retry_delay: Duration::from_millis(100),
        ..ClientCredentials::new(
            Url::parse(&uaa.url("/oauth/token")).unwrap(),
            "p-service-registry-client",
            SecretString::new("int-test-secret"),
        )
    }
}

fn registry_client(provider: Arc<dyn TokenProvider>) -> eureka_http::HttpClient {
    eureka_http::HttpClientBuilder::new()
        .allow_insecure_http()
        .with_bearer_auth(provider)
        .build()
        .unwrap()
}

#[tokio::test]
async fn registry_call_with_bearer_token() {
    let uaa = MockServer::start();
    let token_mock = uaa.mock(|when, then| {
        when.method(POST)
            .path("/oauth/token")
            .body_includes("grant_type=client_credentials");
        then.status(200)
            .header("content-type", "application/json")
            .body(token_json("integration-tok", 3600));
    });

    let registry = MockServer::start();
    let register = registry.mock(|when, then| {
        when.method(POST)
            .path("/eureka/apps/BILLING")
            .header("authorization", "Bearer integration-tok")
            .header("content-type", "application/xml");
        then.status(204);
    });

    let token = Token::fetch(uaa_credentials(&uaa)).await.unwrap();
    let client = registry_client(Arc::new(token));

    let resp = client
        .post(&registry.url("/eureka/apps/BILLING"))
        .header("content-type", "application/xml")
        .body_bytes("<instance><app>BILLING</app></instance>")
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    assert_eq!(resp.status(), http::StatusCode::NO_CONTENT);
    token_mock.assert_calls(1);
    register.assert_calls(1);
}

#[tokio::test]
async fn refreshed_token_is_used_by_later_requests() {
    let uaa = MockServer::start();
    let mut first = uaa.mock(|when, then| {
        when.method(POST).path("/oauth/token");
        then.status(200)
            .header("content-type", "application/json")
            .body(token_json("short-tok", 2));
    });

    let registry = MockServer::start();
    let old = registry.mock(|when, then| {
        when.method(GET)
            .path("/eureka/apps")
            .header("authorization", "Bearer short-tok");
        then.status(200).body("<applications/>");
    });
    let rotated = registry.mock(|when, then| {
        when.method(GET)
            .path("/eureka/apps")
            .header("authorization", "Bearer rotated-tok");
        then.status(200).body("<applications/>");
    });

    let token = Token::fetch(uaa_credentials(&uaa)).await.unwrap();
    let client = registry_client(Arc::new(token.clone()));
    client.get(&registry.url("/eureka/apps")).send().await.unwrap();

    first.delete();
    uaa.mock(|when, then| {
        when.method(POST).path("/oauth/token");
        then.status(200)
            .header("content-type", "application/json")
            .body(token_json("rotated-tok", 3600));
    });

    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if token.access_token().is_ok_and(|t| t.expose() == "rotated-tok") {
            break;
        }
    }
    client.get(&registry.url("/eureka/apps")).send().await.unwrap();

    old.assert_calls(1);
    rotated.assert_calls(1);
}

#[tokio::test]
async fn static_token_needs_no_token_endpoint() {
    let registry = MockServer::start();
    let heartbeat = registry.mock(|when, then| {
        when.method(PUT)
            .path("/eureka/apps/BILLING/billing-1")
            .header("authorization", "Bearer out-of-band");
        then.status(200);
    });

    let client = registry_client(Arc::new(StaticToken::new("out-of-band")));
    let resp = client
        .put(&registry.url("/eureka/apps/BILLING/billing-1"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), http::StatusCode::OK);
    heartbeat.assert_calls(1);
}
