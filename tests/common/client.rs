//! Test HTTP client.
//!
//! Thin wrapper over `reqwest` that returns status and decoded JSON together.

use reqwest::StatusCode;
use serde_json::{Value, json};

/// A test client bound to one server.
pub struct TestClient {
    http: reqwest::Client,
    base: String,
}

impl TestClient {
    /// Create a client for the server at `address` (`host:port`).
    pub fn new(address: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("http://{address}"),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// POST a JSON body.
    pub async fn post(&self, path: &str, body: Value) -> anyhow::Result<(StatusCode, Value)> {
        let resp = self.http.post(self.url(path)).json(&body).send().await?;
        let status = resp.status();
        Ok((status, resp.json().await?))
    }

    pub async fn delete(&self, path: &str) -> anyhow::Result<(StatusCode, Value)> {
        let resp = self.http.delete(self.url(path)).send().await?;
        let status = resp.status();
        Ok((status, resp.json().await?))
    }

    pub async fn get_json(&self, path: &str) -> anyhow::Result<(StatusCode, Value)> {
        let resp = self.http.get(self.url(path)).send().await?;
        let status = resp.status();
        Ok((status, resp.json().await?))
    }

    pub async fn get_text(&self, path: &str) -> anyhow::Result<(StatusCode, String)> {
        let resp = self.http.get(self.url(path)).send().await?;
        let status = resp.status();
        Ok((status, resp.text().await?))
    }

    /// Submit one authentication attempt and return the decision.
    pub async fn auth(&self, ip: &str, login: &str, password: &str) -> anyhow::Result<bool> {
        let (status, body) = self
            .post(
                "/auth",
                json!({ "ip": ip, "login": login, "password": password }),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::OK, "auth failed: {status} {body}");
        body["ok"]
            .as_bool()
            .ok_or_else(|| anyhow::anyhow!("missing ok field: {body}"))
    }

    /// Add a range to `list` (`whitelist` or `blacklist`).
    pub async fn add_range(&self, list: &str, ip: &str, mask: u8) -> anyhow::Result<(StatusCode, Value)> {
        self.post(&format!("/{list}"), json!({ "ip": ip, "mask": mask }))
            .await
    }

    pub async fn reset(&self, kind: &str, key: &str) -> anyhow::Result<(StatusCode, Value)> {
        self.post("/buckets/reset", json!({ "kind": kind, "key": key }))
            .await
    }
}
