//! Integration tests for the HTTP API: decisions, list management, resets.

mod common;

use bruteguard::security::buckets::{Ceilings, KeyType};
use common::TestServer;
use reqwest::StatusCode;
use serde_json::json;

fn generous() -> Ceilings {
    Ceilings {
        ip: 100,
        login: 100,
        password: 100,
    }
}

#[tokio::test]
async fn test_login_ceiling_throttles_third_attempt() {
    let server = TestServer::spawn(Ceilings {
        ip: 3,
        login: 2,
        password: 2,
    })
    .await
    .expect("Failed to spawn test server");
    let client = server.client();

    assert!(client.auth("1.2.3.4", "bob", "pw").await.unwrap());
    assert!(client.auth("1.2.3.4", "bob", "pw").await.unwrap());
    assert!(!client.auth("1.2.3.4", "bob", "pw").await.unwrap());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_blacklist_denies_first_attempt() {
    let server = TestServer::spawn(generous()).await.unwrap();
    let client = server.client();

    let (status, body) = client.add_range("blacklist", "203.0.113.0", 24).await.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "added");

    assert!(!client.auth("203.0.113.77", "mallory", "pw").await.unwrap());
    assert!(server.buckets().is_empty());
}

#[tokio::test]
async fn test_whitelist_lifecycle() {
    let server = TestServer::spawn(Ceilings {
        ip: 2,
        login: 100,
        password: 100,
    })
    .await
    .unwrap();
    let client = server.client();

    client.auth("10.0.0.9", "alice", "pw").await.unwrap();
    assert!(!client.auth("10.0.0.9", "alice", "pw").await.unwrap());

    let (status, _) = client.add_range("whitelist", "10.0.0.0", 24).await.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert!(client.auth("10.0.0.9", "alice", "pw").await.unwrap());

    let (status, listing) = client.get_json("/whitelist").await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        listing,
        json!([{
            "ip": "10.0.0.0",
            "mask": 24,
            "from": "10.0.0.0",
            "to": "10.0.0.255",
            "cidr": "10.0.0.0/24"
        }])
    );

    let (status, body) = client.delete("/whitelist/10.0.0.0").await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "removed");
    assert!(!client.auth("10.0.0.9", "alice", "pw").await.unwrap());

    let (status, body) = client.delete("/whitelist/10.0.0.0").await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "range_not_found");
}

#[tokio::test]
async fn test_overlap_is_conflict_and_changes_nothing() {
    let server = TestServer::spawn(generous()).await.unwrap();
    let client = server.client();

    client.add_range("blacklist", "10.0.0.0", 8).await.unwrap();
    let (status, body) = client.add_range("whitelist", "10.1.1.1", 32).await.unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "overlaps_blacklist");

    let (_, white) = client.get_json("/whitelist").await.unwrap();
    assert_eq!(white, json!([]));
    let (_, black) = client.get_json("/blacklist").await.unwrap();
    assert_eq!(black.as_array().map(Vec::len), Some(1));

    client.add_range("whitelist", "192.168.0.0", 16).await.unwrap();
    let (status, body) = client.add_range("blacklist", "192.168.4.0", 24).await.unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "overlaps_whitelist");
}

#[tokio::test]
async fn test_invalid_input_is_bad_request() {
    let server = TestServer::spawn(generous()).await.unwrap();
    let client = server.client();

    let (status, body) = client
        .post("/whitelist", json!({ "ip": "300.1.1.1", "mask": 8 }))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_address");

    let (status, body) = client
        .post("/blacklist", json!({ "ip": "1.1.1.1", "mask": "33" }))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_mask");

    let (status, body) = client
        .post("/auth", json!({ "ip": "1.1.1.1", "login": "", "password": "pw" }))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "empty_key");

    let (status, _) = client
        .post("/auth", json!({ "ip": "localhost", "login": "x", "password": "pw" }))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(server.buckets().is_empty());
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let server = TestServer::spawn(generous()).await.unwrap();
    let client = server.client();

    let (status, body) = client
        .post("/auth", json!({ "ip": "1.2.3.4", "login": "bob" }))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
    assert!(body["error"]["message"].as_str().is_some());

    let (status, body) = client
        .post("/whitelist", json!({ "ip": "10.0.0.0", "mask": -8 }))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
    assert!(server.buckets().is_empty());
}

#[tokio::test]
async fn test_bucket_reset() {
    let server = TestServer::spawn(Ceilings {
        ip: 100,
        login: 2,
        password: 100,
    })
    .await
    .unwrap();
    let client = server.client();

    let (status, body) = client.reset("login", "carol").await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "bucket_not_found");

    client.auth("5.6.7.8", "carol", "pw").await.unwrap();
    assert!(!client.auth("5.6.7.8", "carol", "pw").await.unwrap());

    let (status, body) = client.reset("LOGIN", "carol").await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "reset");
    assert_eq!(server.buckets().attempts(KeyType::Login, "carol"), Some(0));
    assert!(client.auth("5.6.7.8", "carol", "pw").await.unwrap());

    let (status, body) = client.reset("email", "carol").await.unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_kind");
}

#[tokio::test]
async fn test_health_and_metrics() {
    let server = TestServer::spawn(generous()).await.unwrap();
    let client = server.client();

    let (status, body) = client.get_json("/health").await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());

    client.auth("9.9.9.9", "dave", "pw").await.unwrap();
    let (status, text) = client.get_text("/metrics").await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("bruteguard_auth_decisions_total"));
    assert!(text.contains("bruteguard_request_duration_seconds"));
}
