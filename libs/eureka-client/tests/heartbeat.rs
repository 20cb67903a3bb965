#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::time::Duration;

use common::{calls_reach, client, fixture_instance};
use httpmock::prelude::*;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn first_heartbeat_is_immediate() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(PUT).path("/eureka/apps/myapp/id");
        then.status(200);
    });

    let task = client(&server, 1).spawn_heartbeat(fixture_instance(), Duration::from_secs(3600));
    assert!(calls_reach(&mock, 1).await);

    task.stop().await;
    mock.assert_calls(1);
}

#[tokio::test]
async fn heartbeats_repeat_and_survive_failures() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(PUT).path("/eureka/apps/myapp/id");
        then.status(500);
    });

    let task = client(&server, 1).spawn_heartbeat(fixture_instance(), Duration::from_millis(10));
    assert!(calls_reach(&mock, 5).await);

    task.stop().await;
}

#[tokio::test]
async fn stop_is_final_and_idempotent() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(PUT).path("/eureka/apps/myapp/id");
        then.status(200);
    });

    let task = client(&server, 1).spawn_heartbeat(fixture_instance(), Duration::from_millis(10));
    assert!(calls_reach(&mock, 2).await);

    let handle = task.handle();
    tokio::join!(task.stop(), handle.stop());
    assert!(handle.is_stopped());

    let calls = mock.calls();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(mock.calls(), calls);

    tokio::time::timeout(WAIT, task.stop()).await.unwrap();
}

#[tokio::test]
async fn dropping_task_cancels_it() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(PUT).path("/eureka/apps/myapp/id");
        then.status(200);
    });

    let task = client(&server, 1).spawn_heartbeat(fixture_instance(), Duration::from_millis(10));
    let handle = task.handle();
    assert!(calls_reach(&mock, 1).await);

    drop(task);
    assert!(handle.is_stopped());
    handle.stop().await;

    let calls = mock.calls();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(mock.calls(), calls);
}
