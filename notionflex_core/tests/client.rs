use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notionflex_core::api::{Method, NotionError, RetryPolicy, NO_RESPONSE_MESSAGE};
use notionflex_core::ApiConfig;
use serde_json::json;
use tokio::time::Instant;

mod common;
use common::fake_transport::{self as fake, FakeTransport};

#[tokio::test]
async fn credentialed_calls_carry_bearer_and_version_headers() {
    fake::init_logging();
    let transport = FakeTransport::new(|_| Ok(fake::bot_user("Acme")));
    let client = fake::client(transport.clone(), &fake::fast_config());

    let response = client
        .current_user("secret_abc")
        .await
        .expect("current_user should succeed");

    assert_eq!(response.data["bot"]["workspace_name"], "Acme");
    let sent = transport.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, Method::Get);
    assert_eq!(sent[0].path, "users/me");
    assert_eq!(fake::bearer(&sent[0]), Some("secret_abc"));
    assert_eq!(sent[0].header("Notion-Version"), Some("2022-06-28"));
}

#[tokio::test]
async fn blank_credential_short_circuits_before_the_network() {
    let transport = FakeTransport::new(|_| Ok(json!({})));
    let client = fake::client(transport.clone(), &fake::fast_config());

    let err = client
        .current_user("   ")
        .await
        .expect_err("a blank credential must be rejected");

    assert!(matches!(err, NotionError::Configuration(_)));
    assert!(
        transport.requests().is_empty(),
        "no request should reach the transport"
    );
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    let calls = Arc::new(AtomicUsize::new(0));
    let transport = FakeTransport::new({
        let calls = calls.clone();
        move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(fake::no_response("users/me"))
            } else {
                Ok(fake::bot_user("Acme"))
            }
        }
    });
    let observed = Arc::new(Mutex::new(Vec::new()));
    let config = fake::fast_config().with_retry(RetryPolicy::default());
    let client = fake::client(transport.clone(), &config).with_retry_observer({
        let observed = observed.clone();
        Arc::new(move |err: &NotionError, remaining: u32| {
            assert!(matches!(err, NotionError::Network(_)));
            observed.lock().unwrap().push(remaining);
        })
    });

    let start = Instant::now();
    client
        .current_user("secret_abc")
        .await
        .expect("third attempt should succeed");

    assert_eq!(transport.count(Method::Get, "users/me"), 3);
    assert_eq!(*observed.lock().unwrap(), vec![3, 2]);
    assert_eq!(start.elapsed(), Duration::from_millis(1000 + 1500));
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_retried_like_any_other_failure() {
    let transport = FakeTransport::new(|_| Err(fake::status(400, "body failed validation")));
    let config = fake::fast_config().with_retry(RetryPolicy::default());
    let client = fake::client(transport.clone(), &config);

    let err = client
        .search("secret_abc", json!({"query": ""}))
        .await
        .expect_err("a permanent 400 must eventually surface");

    assert_eq!(transport.count(Method::Post, "search"), 4);
    let record = err.record();
    assert_eq!(record.status, 400);
    assert_eq!(record.message, "body failed validation");
}

#[tokio::test]
async fn missing_response_is_reported_as_a_network_error() {
    let transport = FakeTransport::new(|_| Err(fake::no_response("pages/p1")));
    let client = fake::client(transport, &fake::fast_config());

    let err = client.get_page("secret_abc", "p1").await.unwrap_err();

    assert!(matches!(err, NotionError::Network(_)));
    assert_eq!(err.record().message, NO_RESPONSE_MESSAGE);
}

#[tokio::test(start_paused = true)]
async fn every_attempt_waits_for_the_shared_rate_limiter() {
    let transport = FakeTransport::new(|_| Ok(json!({"object": "block", "id": "b"})));
    let client = fake::client(transport.clone(), &ApiConfig::default());

    let start = Instant::now();
    let mut finished = Vec::new();
    for i in 0..5 {
        client
            .delete_block("secret_abc", &format!("b{i}"))
            .await
            .expect("delete should succeed");
        finished.push(start.elapsed());
    }

    let window = Duration::from_millis(1000);
    assert_eq!(finished.iter().filter(|&&t| t < window).count(), 3);
    assert_eq!(finished.iter().filter(|&&t| t >= window).count(), 2);
}

#[tokio::test]
async fn search_all_follows_cursors_and_sends_them_back() {
    let transport = FakeTransport::new(|request| {
        let body = request.body.clone().unwrap_or_default();
        match body.get("start_cursor").and_then(|c| c.as_str()) {
            None => Ok(fake::list(vec![fake::page_object("p1", "One")], Some("c2"))),
            Some("c2") => Ok(fake::list(vec![fake::page_object("p2", "Two")], None)),
            Some(other) => panic!("unexpected cursor {other}"),
        }
    });
    let client = fake::client(transport.clone(), &fake::fast_config());

    let items = client
        .search_all("secret_abc", json!({"query": "notes"}))
        .await
        .expect("search should succeed");

    let ids: Vec<_> = items.iter().map(|i| i["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["p1", "p2"]);
    let sent = transport.requests();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].body.as_ref().unwrap()["query"], "notes");
    assert_eq!(sent[1].body.as_ref().unwrap()["page_size"], 100);
}

#[tokio::test]
async fn update_page_patches_the_page() {
    let transport = FakeTransport::new(|request| {
        let body = request.body.clone().unwrap_or_default();
        Ok(json!({ "object": "page", "id": "p1", "archived": body["archived"] }))
    });
    let client = fake::client(transport.clone(), &fake::fast_config());

    let response = client
        .update_page("secret_abc", "p1", json!({ "archived": true }))
        .await
        .expect("update should succeed");

    assert_eq!(response.data["archived"], true);
    assert_eq!(transport.count(Method::Patch, "pages/p1"), 1);
    let sent = &transport.requests()[0];
    assert_eq!(sent.body.as_ref().unwrap()["archived"], true);
    assert_eq!(fake::bearer(sent), Some("secret_abc"));
}
